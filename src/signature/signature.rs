use std::fmt;
use std::str::from_utf8_unchecked;

use crate::buf::ReadBuf;
use crate::error::Result;
use crate::proto::Type;
use crate::OwnedSignature;

use super::{validate, SignatureError, SignatureIter};

/// A validated D-Bus type signature.
///
/// A signature is a sequence of complete type codes describing a message
/// body or a variant payload.
///
/// # Examples
///
/// ```
/// use wirebus::Signature;
///
/// const SIG: &Signature = Signature::new_const(b"a{sv}");
///
/// assert!(Signature::new(b"aai").is_ok());
/// assert!(Signature::new(b"a").is_err());
/// ```
#[derive(Hash, PartialEq, Eq)]
#[repr(transparent)]
pub struct Signature([u8]);

impl Signature {
    /// The empty signature.
    pub const EMPTY: &'static Signature = Signature::new_const(b"");

    /// A single byte.
    pub const BYTE: &'static Signature = Signature::new_const(b"y");

    /// A boolean, stored as a 32-bit word on the wire.
    pub const BOOLEAN: &'static Signature = Signature::new_const(b"b");

    /// Signed 16-bit integer.
    pub const INT16: &'static Signature = Signature::new_const(b"n");

    /// Unsigned 16-bit integer.
    pub const UINT16: &'static Signature = Signature::new_const(b"q");

    /// Signed 32-bit integer.
    pub const INT32: &'static Signature = Signature::new_const(b"i");

    /// Unsigned 32-bit integer.
    pub const UINT32: &'static Signature = Signature::new_const(b"u");

    /// Signed 64-bit integer.
    pub const INT64: &'static Signature = Signature::new_const(b"x");

    /// Unsigned 64-bit integer.
    pub const UINT64: &'static Signature = Signature::new_const(b"t");

    /// IEEE 754 double-precision floating point.
    pub const DOUBLE: &'static Signature = Signature::new_const(b"d");

    /// UTF-8 string.
    pub const STRING: &'static Signature = Signature::new_const(b"s");

    /// Name of an object instance.
    pub const OBJECT_PATH: &'static Signature = Signature::new_const(b"o");

    /// A type signature.
    pub const SIGNATURE: &'static Signature = Signature::new_const(b"g");

    /// A variant, a self-describing value prefixed by its signature.
    pub const VARIANT: &'static Signature = Signature::new_const(b"v");

    /// Unsigned 32-bit index into the out-of-band array of file descriptors
    /// accompanying a message.
    pub const UNIX_FD: &'static Signature = Signature::new_const(b"h");

    /// Construct a new empty signature.
    pub const fn empty() -> &'static Self {
        Self::EMPTY
    }

    /// Test if the signature is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The length of the signature in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Construct a new signature with validation inside of a constant
    /// context, panicking if the signature is invalid.
    ///
    /// ```compile_fail
    /// use wirebus::Signature;
    ///
    /// const BAD: &Signature = Signature::new_const(b"(a)");
    /// ```
    #[inline]
    #[track_caller]
    pub const fn new_const(signature: &[u8]) -> &Signature {
        if validate(signature).is_err() {
            panic!("Invalid D-Bus signature")
        };

        // SAFETY: The signature was just validated.
        unsafe { Self::new_unchecked(signature) }
    }

    /// Try to construct a new signature with validation.
    #[inline]
    pub const fn new(signature: &[u8]) -> Result<&Signature, SignatureError> {
        if let Err(error) = validate(signature) {
            return Err(error);
        };

        // SAFETY: The signature was just validated.
        unsafe { Ok(Self::new_unchecked(signature)) }
    }

    /// Construct a new signature without validation.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the bytes are ASCII and either a valid
    /// signature or a view produced by walking one, such as the `{kv}`
    /// element type of an array.
    pub(crate) const unsafe fn new_unchecked(signature: &[u8]) -> &Self {
        &*(signature as *const _ as *const Signature)
    }

    /// Get the signature as a string.
    pub fn as_str(&self) -> &str {
        // SAFETY: Validation ensures that the signature is ASCII.
        unsafe { from_utf8_unchecked(&self.0) }
    }

    /// Get the signature as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Iterate over the complete types of the signature.
    pub(crate) fn iter(&self) -> SignatureIter<'_> {
        SignatureIter::new(self)
    }

    /// The type code of the first complete type, if any.
    pub(crate) fn first_type(&self) -> Option<Type> {
        self.0.first().map(|&b| Type(b))
    }

    /// Test if the signature consists of exactly one complete type, as
    /// required for a variant payload.
    pub(crate) fn is_single_complete_type(&self) -> bool {
        let mut iter = self.iter();
        iter.next().is_some() && iter.next().is_none()
    }

    /// Skip over one encoded value for every complete type in the signature.
    pub(crate) fn skip(&self, read: &mut ReadBuf<'_>) -> Result<()> {
        for token in self.iter() {
            skip_one(token.code(), token.inner(), read)?;
        }

        Ok(())
    }
}

fn skip_one(code: Type, inner: &Signature, read: &mut ReadBuf<'_>) -> Result<()> {
    if let Some(size) = code.fixed_size() {
        read.align_to(code.alignment())?;
        read.advance(size)?;
        return Ok(());
    }

    match code {
        Type::STRING | Type::OBJECT_PATH => {
            let len = read.load::<u32>()? as usize;
            read.advance(len.saturating_add(1))?;
        }
        Type::SIGNATURE => {
            let len = read.load::<u8>()? as usize;
            read.advance(len.saturating_add(1))?;
        }
        Type::VARIANT => {
            let signature = read.read::<Signature>()?;
            signature.skip(read)?;
        }
        Type::ARRAY => {
            let len = read.load::<u32>()? as usize;
            read.align_to(inner.first_type().map_or(1, Type::alignment))?;
            read.advance(len)?;
        }
        Type::OPEN_PAREN | Type::OPEN_BRACE => {
            read.align_to(8)?;
            inner.skip(read)?;
        }
        _ => unreachable!("invalid type code in validated signature"),
    }

    Ok(())
}

impl fmt::Debug for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signature").field(&self.as_str()).finish()
    }
}

impl fmt::Display for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<Signature> for Signature {
    #[inline]
    fn as_ref(&self) -> &Signature {
        self
    }
}

impl ToOwned for Signature {
    type Owned = OwnedSignature;

    #[inline]
    fn to_owned(&self) -> Self::Owned {
        // SAFETY: `self` upholds the signature invariants by construction.
        unsafe { OwnedSignature::from_vec(self.0.to_vec()) }
    }
}

impl PartialEq<OwnedSignature> for Signature {
    #[inline]
    fn eq(&self, other: &OwnedSignature) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl PartialEq<OwnedSignature> for &Signature {
    #[inline]
    fn eq(&self, other: &OwnedSignature) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl PartialEq<[u8]> for Signature {
    #[inline]
    fn eq(&self, other: &[u8]) -> bool {
        self.0 == *other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for Signature {
    #[inline]
    fn eq(&self, other: &[u8; N]) -> bool {
        self.0 == other[..]
    }
}

impl<const N: usize> PartialEq<[u8; N]> for &Signature {
    #[inline]
    fn eq(&self, other: &[u8; N]) -> bool {
        self.0 == other[..]
    }
}
