//! Types for dealing with message buffers.

pub use self::owned_buf::OwnedBuf;
pub(crate) use self::owned_buf::Alloc;
mod owned_buf;

pub use self::read_buf::{ArrayReader, ReadBuf};
mod read_buf;

pub(crate) use self::helpers::{ArrayWriter, StructWriter};
mod helpers;

pub use self::body_buf::{BodyBuf, ValueWriter};
mod body_buf;

pub(crate) use self::send_buf::MessageBuf;
mod send_buf;

pub(crate) use self::recv_buf::{MessageRef, RecvBuf};
mod recv_buf;

pub(crate) use self::pool::BufPool;
mod pool;

#[cfg(test)]
mod tests;

/// The maximum length of an array in bytes.
pub(crate) const MAX_ARRAY_LENGTH: u32 = 1u32 << 26;
/// The maximum length of a body in bytes.
pub(crate) const MAX_BODY_LENGTH: u32 = 1u32 << 27;
