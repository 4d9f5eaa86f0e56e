use crate::buf::OwnedBuf;
use crate::Signature;

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for i16 {}
    impl Sealed for u16 {}
    impl Sealed for i32 {}
    impl Sealed for u32 {}
    impl Sealed for i64 {}
    impl Sealed for u64 {}
    impl Sealed for f64 {}
    impl Sealed for bool {}
}

/// A fixed-width value that can be stored into a message body at its natural
/// alignment.
pub trait Storable: self::sealed::Sealed {
    /// The signature of the value.
    #[doc(hidden)]
    const SIGNATURE: &'static Signature;

    /// Store the value to the given buffer.
    #[doc(hidden)]
    fn store_to(self, buf: &mut OwnedBuf);
}

macro_rules! impl_storable {
    ($($ty:ty => $signature:ident),* $(,)?) => {
        $(
            impl Storable for $ty {
                const SIGNATURE: &'static Signature = Signature::$signature;

                #[inline]
                fn store_to(self, buf: &mut OwnedBuf) {
                    buf.store(self);
                }
            }
        )*
    }
}

impl_storable! {
    u8 => BYTE,
    i16 => INT16,
    u16 => UINT16,
    i32 => INT32,
    u32 => UINT32,
    i64 => INT64,
    u64 => UINT64,
    f64 => DOUBLE,
}

impl Storable for bool {
    const SIGNATURE: &'static Signature = Signature::BOOLEAN;

    /// Booleans are stored as a 32-bit word, 0 or 1.
    #[inline]
    fn store_to(self, buf: &mut OwnedBuf) {
        buf.store(u32::from(self));
    }
}
