pub use self::signature::Signature;
mod signature;

pub use self::owned_signature::OwnedSignature;
mod owned_signature;

pub use self::signature_error::SignatureError;
mod signature_error;

pub(crate) use self::iter::SignatureIter;
mod iter;

pub(crate) use self::validation::validate;
mod validation;

#[cfg(test)]
mod tests;

/// Maximum number of nested containers in a signature.
pub(crate) const MAX_CONTAINER_DEPTH: usize = 32;

/// Maximum size of the validation stack. Arrays and structs may each nest up
/// to [`MAX_CONTAINER_DEPTH`] levels.
pub(crate) const MAX_DEPTH: usize = MAX_CONTAINER_DEPTH * 2;
