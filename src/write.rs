use crate::buf::OwnedBuf;
use crate::{ObjectPath, Signature};

mod sealed {
    use crate::{ObjectPath, Signature};

    pub trait Sealed {}
    impl Sealed for [u8] {}
    impl Sealed for str {}
    impl Sealed for Signature {}
    impl Sealed for ObjectPath {}
}

/// An unsized element that can be written into a message buffer with its
/// length prefix.
pub trait Write: self::sealed::Sealed {
    /// The signature of the element.
    #[doc(hidden)]
    const SIGNATURE: &'static Signature;

    /// Write the element to the given buffer.
    #[doc(hidden)]
    fn write_to(&self, buf: &mut OwnedBuf);
}

impl Write for str {
    const SIGNATURE: &'static Signature = Signature::STRING;

    #[inline]
    fn write_to(&self, buf: &mut OwnedBuf) {
        buf.store(self.len() as u32);
        buf.extend_from_slice_nul(self.as_bytes());
    }
}

impl Write for [u8] {
    const SIGNATURE: &'static Signature = Signature::new_const(b"ay");

    #[inline]
    fn write_to(&self, buf: &mut OwnedBuf) {
        buf.store(self.len() as u32);
        buf.extend_from_slice(self);
    }
}

impl Write for Signature {
    const SIGNATURE: &'static Signature = Signature::SIGNATURE;

    #[inline]
    fn write_to(&self, buf: &mut OwnedBuf) {
        buf.store(self.len() as u8);
        buf.extend_from_slice_nul(self.as_bytes());
    }
}

impl Write for ObjectPath {
    const SIGNATURE: &'static Signature = Signature::OBJECT_PATH;

    #[inline]
    fn write_to(&self, buf: &mut OwnedBuf) {
        buf.store(self.as_bytes().len() as u32);
        buf.extend_from_slice_nul(self.as_bytes());
    }
}
