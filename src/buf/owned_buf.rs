use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::slice::from_raw_parts;

use crate::proto::Endianness;
use crate::utils::padding_to;
use crate::{Frame, Write};

/// The position of a reserved, aligned slot in an [`OwnedBuf`] which can be
/// written to at a later point, such as the length of an array.
#[must_use = "reserved slots must be written back"]
pub(crate) struct Alloc<T>(usize, PhantomData<T>);

impl<T> Alloc<T> {
    #[inline]
    pub(crate) fn new(at: usize) -> Self {
        Self(at, PhantomData)
    }
}

/// A growable buffer for writing D-Bus encoded data.
///
/// Padding is inserted relative to the start of the buffer, so a buffer
/// always represents a region which starts on an 8-byte boundary of the
/// message being assembled. The type is public because the [`Write`] and
/// [`Storable`] traits mention it; it is driven through [`BodyBuf`].
///
/// [`Storable`]: crate::Storable
/// [`BodyBuf`]: crate::BodyBuf
pub struct OwnedBuf {
    data: Vec<u8>,
    endianness: Endianness,
}

impl OwnedBuf {
    pub(crate) fn new() -> Self {
        Self::with_endianness(Endianness::NATIVE)
    }

    pub(crate) fn with_endianness(endianness: Endianness) -> Self {
        Self {
            data: Vec::new(),
            endianness,
        }
    }

    #[inline]
    pub(crate) fn endianness(&self) -> Endianness {
        self.endianness
    }

    #[inline]
    pub(crate) fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub(crate) fn get(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
    }

    /// Pad the buffer with zero bytes up to `align`, which must be a power
    /// of two.
    pub(crate) fn align_mut(&mut self, align: usize) {
        let padding = padding_to(align, self.data.len());

        for _ in 0..padding {
            self.data.push(0);
        }
    }

    /// Store a fixed-width value at its natural alignment.
    pub(crate) fn store<T>(&mut self, frame: T)
    where
        T: Frame,
    {
        self.align_mut(align_of::<T>());
        self.store_unaligned(frame);
    }

    /// Store a fixed-width value at the current position without aligning.
    pub(crate) fn store_unaligned<T>(&mut self, mut frame: T)
    where
        T: Frame,
    {
        frame.adjust(self.endianness);

        // SAFETY: `Frame` types have no padding and inhabit all bit
        // patterns.
        let bytes = unsafe { from_raw_parts(&frame as *const T as *const u8, size_of::<T>()) };
        self.data.extend_from_slice(bytes);
    }

    /// Reserve an aligned, zeroed slot for a value of type `T` to be written
    /// back later with [`store_at`].
    ///
    /// [`store_at`]: Self::store_at
    pub(crate) fn alloc<T>(&mut self) -> Alloc<T>
    where
        T: Frame,
    {
        self.align_mut(align_of::<T>());
        let at = self.data.len();
        self.data.extend(std::iter::repeat(0).take(size_of::<T>()));
        Alloc::new(at)
    }

    /// Write a value at a previously reserved slot.
    pub(crate) fn store_at<T>(&mut self, at: Alloc<T>, mut frame: T)
    where
        T: Frame,
    {
        let Alloc(at, _) = at;
        assert!(at + size_of::<T>() <= self.data.len(), "write underflow");

        frame.adjust(self.endianness);

        // SAFETY: `Frame` types have no padding and inhabit all bit
        // patterns.
        let bytes = unsafe { from_raw_parts(&frame as *const T as *const u8, size_of::<T>()) };
        self.data[at..at + size_of::<T>()].copy_from_slice(bytes);
    }

    /// Write a length-prefixed value such as a string or signature.
    pub(crate) fn write<T>(&mut self, value: &T)
    where
        T: ?Sized + Write,
    {
        value.write_to(self);
    }

    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Extend the buffer with a slice ending with a NUL byte.
    pub(crate) fn extend_from_slice_nul(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.data.push(0);
    }
}

impl Default for OwnedBuf {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
