use std::fmt;
use std::mem::{align_of, size_of};
use std::os::fd::{OwnedFd, RawFd};
use std::ptr;

use crate::error::ErrorKind;
use crate::utils::padding_to;
use crate::{Endianness, Error, Fds, Frame, Read, Result, Signature};

use super::MAX_ARRAY_LENGTH;

/// A typed reader over a D-Bus encoded byte region.
///
/// The reader carries the endianness of the frame it was cut from and
/// resolves Unix fd indexes against the fd collection which accompanied the
/// frame. Padding is computed from the offset within the region; every
/// region handed out by this crate starts on an 8-byte boundary of its
/// message, so offsets within the region are congruent with offsets within
/// the message for every D-Bus alignment.
///
/// # Examples
///
/// ```
/// use wirebus::{ReadBuf, Result};
///
/// fn read(buf: &mut ReadBuf<'_>) -> Result<()> {
///     assert_eq!(buf.load::<u32>()?, 7u32);
///     assert_eq!(buf.load::<u8>()?, b'f');
///     assert_eq!(buf.load::<u8>()?, b'o');
///     assert_eq!(buf.get(), &[b'o', b' ', b'b', b'a', b'r', 0]);
///     Ok(())
/// }
/// # read(&mut ReadBuf::from_slice_le(b"\x07\x00\x00\x00foo bar\x00"))?;
/// # Ok::<_, wirebus::Error>(())
/// ```
pub struct ReadBuf<'a> {
    data: &'a [u8],
    read: usize,
    endianness: Endianness,
    fds: Fds,
}

impl<'a> ReadBuf<'a> {
    /// Construct a little-endian read buffer from a slice.
    #[doc(hidden)]
    pub fn from_slice_le(data: &'a [u8]) -> Self {
        Self::from_slice(data, Endianness::LITTLE)
    }

    /// Construct a read buffer from a slice.
    pub(crate) fn from_slice(data: &'a [u8], endianness: Endianness) -> Self {
        Self {
            data,
            read: 0,
            endianness,
            fds: Fds::empty(),
        }
    }

    /// Construct a read buffer with an attached fd collection.
    pub(crate) fn with_fds(data: &'a [u8], endianness: Endianness, fds: Fds) -> Self {
        Self {
            data,
            read: 0,
            endianness,
            fds,
        }
    }

    /// Get the endianness of the buffer.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// The fd collection attached to the frame this buffer was cut from.
    pub fn fds(&self) -> &Fds {
        &self.fds
    }

    /// The remaining unread bytes.
    pub fn get(&self) -> &'a [u8] {
        &self.data[self.read..]
    }

    /// The number of remaining unread bytes.
    pub fn len(&self) -> usize {
        self.data.len() - self.read
    }

    /// Test if the buffer is exhausted.
    pub fn is_empty(&self) -> bool {
        self.read == self.data.len()
    }

    /// The current offset from the start of the region.
    pub(crate) fn offset(&self) -> usize {
        self.read
    }

    /// Load a fixed-width value at its natural alignment.
    ///
    /// The returned value has been endian-adjusted as per [`endianness()`].
    ///
    /// [`endianness()`]: Self::endianness
    ///
    /// # Errors
    ///
    /// Errors if the underlying buffer does not have enough data left.
    pub fn load<T>(&mut self) -> Result<T>
    where
        T: Frame,
    {
        let padding = padding_to(align_of::<T>(), self.read);

        if self.read + padding + size_of::<T>() > self.data.len() {
            return Err(Error::new(ErrorKind::Truncated));
        }

        self.read += padding;

        // SAFETY: Bounds were just checked; `Frame` types inhabit any bit
        // pattern and are read unaligned.
        let mut frame = unsafe {
            ptr::read_unaligned(self.data.as_ptr().add(self.read).cast::<T>())
        };

        self.read += size_of::<T>();
        frame.adjust(self.endianness);
        Ok(frame)
    }

    /// Load a boolean, stored on the wire as a 32-bit word.
    ///
    /// By convention any nonzero value is accepted as `true`.
    pub fn load_bool(&mut self) -> Result<bool> {
        Ok(self.load::<u32>()? != 0)
    }

    /// Read a length-prefixed value such as a string or signature.
    ///
    /// The returned reference borrows from the underlying frame.
    pub fn read<T>(&mut self) -> Result<&'a T>
    where
        T: ?Sized + Read,
    {
        T::read_from(self)
    }

    /// Read a variant signature, positioning the reader at the payload.
    pub fn read_variant(&mut self) -> Result<&'a Signature> {
        self.read::<Signature>()
    }

    /// Align the cursor to read the fields of a struct or dict entry.
    pub fn read_struct(&mut self) -> Result<()> {
        self.align_to(8)
    }

    /// Read an array length prefix and return a reader over its elements.
    ///
    /// `element_align` is the natural alignment of the element type.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirebus::{ReadBuf, Result};
    ///
    /// fn read(buf: &mut ReadBuf<'_>) -> Result<()> {
    ///     let mut array = buf.read_array(4)?;
    ///     let mut values = Vec::new();
    ///
    ///     while array.has_next()? {
    ///         values.push(array.buf().load::<u32>()?);
    ///     }
    ///
    ///     assert_eq!(values, [1, 2]);
    ///     Ok(())
    /// }
    /// # read(&mut ReadBuf::from_slice_le(b"\x08\x00\x00\x00\x01\x00\x00\x00\x02\x00\x00\x00"))?;
    /// # Ok::<_, wirebus::Error>(())
    /// ```
    pub fn read_array(&mut self, element_align: usize) -> Result<ArrayReader<'_, 'a>> {
        let len = self.load::<u32>()?;

        if len > MAX_ARRAY_LENGTH {
            return Err(Error::new(ErrorKind::ArrayTooLong(len)));
        }

        self.align_to(element_align)?;
        let end = self.read + len as usize;

        if end > self.data.len() {
            return Err(Error::new(ErrorKind::Truncated));
        }

        Ok(ArrayReader {
            end,
            align: element_align,
            buf: self,
        })
    }

    /// Read a Unix fd index and take ownership of the referenced descriptor.
    ///
    /// The slot in the frame's fd collection is emptied, so the descriptor
    /// will not be closed when the frame is released.
    pub fn take_fd(&mut self) -> Result<OwnedFd> {
        let index = self.load::<u32>()?;

        self.fds
            .take(index)
            .ok_or_else(|| Error::new(ErrorKind::BadFdIndex(index)))
    }

    /// Read a Unix fd index and borrow the referenced descriptor.
    ///
    /// The descriptor is closed when the frame is released.
    pub fn borrow_fd(&mut self) -> Result<RawFd> {
        let index = self.load::<u32>()?;

        self.fds
            .get_raw(index)
            .ok_or_else(|| Error::new(ErrorKind::BadFdIndex(index)))
    }

    /// Skip one encoded value for every complete type in `signature`.
    pub fn skip(&mut self, signature: &Signature) -> Result<()> {
        signature.skip(self)
    }

    /// Align the cursor to `align`, which must be a power of two.
    ///
    /// Padding bytes are skipped without being inspected.
    pub(crate) fn align_to(&mut self, align: usize) -> Result<()> {
        let padding = padding_to(align, self.read);

        if self.read + padding > self.data.len() {
            return Err(Error::new(ErrorKind::Truncated));
        }

        self.read += padding;
        Ok(())
    }

    /// Advance the cursor by `n` bytes.
    pub(crate) fn advance(&mut self, n: usize) -> Result<()> {
        if self.read + n > self.data.len() {
            return Err(Error::new(ErrorKind::Truncated));
        }

        self.read += n;
        Ok(())
    }

    /// Load a slice of length `len`.
    pub(crate) fn load_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.read + len > self.data.len() {
            return Err(Error::new(ErrorKind::Truncated));
        }

        let slice = &self.data[self.read..self.read + len];
        self.read += len;
        Ok(slice)
    }

    /// Load a slice of length `len` followed by a NUL byte, excluding the
    /// NUL byte from the returned slice.
    pub(crate) fn load_slice_nul(&mut self, len: usize) -> Result<&'a [u8]> {
        let Some(total) = len.checked_add(1) else {
            return Err(Error::new(ErrorKind::Truncated));
        };

        if self.read + total > self.data.len() {
            return Err(Error::new(ErrorKind::Truncated));
        }

        let slice = &self.data[self.read..self.read + len];

        if self.data[self.read + len] != 0 {
            return Err(Error::new(ErrorKind::NotNullTerminated));
        }

        self.read += total;
        Ok(slice)
    }
}

impl Clone for ReadBuf<'_> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            data: self.data,
            read: self.read,
            endianness: self.endianness,
            fds: self.fds.clone(),
        }
    }
}

impl fmt::Debug for ReadBuf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadBuf")
            .field("len", &self.len())
            .field("endianness", &self.endianness)
            .finish()
    }
}

/// Reader over the elements of an array, as returned by
/// [`ReadBuf::read_array`].
///
/// Carries the absolute offset at which the array ends and the element
/// alignment which the cursor is padded to before each element.
pub struct ArrayReader<'r, 'a> {
    buf: &'r mut ReadBuf<'a>,
    end: usize,
    align: usize,
}

impl<'r, 'a> ArrayReader<'r, 'a> {
    /// Align the cursor to the element type and test if another element is
    /// available.
    pub fn has_next(&mut self) -> Result<bool> {
        if self.buf.read >= self.end {
            return Ok(false);
        }

        self.buf.align_to(self.align)?;
        Ok(self.buf.read < self.end)
    }

    /// Access the underlying reader to decode the next element.
    pub fn buf(&mut self) -> &mut ReadBuf<'a> {
        self.buf
    }

    /// Skip the remainder of the array.
    pub fn skip_rest(self) -> Result<()> {
        let n = self.end - self.buf.read;
        self.buf.advance(n)
    }
}
