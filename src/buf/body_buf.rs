use std::fmt;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};

use crate::error::Result;
use crate::fd::dup_cloexec;
use crate::proto::Type;
use crate::signature::SignatureError;
use crate::{Endianness, OwnedSignature, ReadBuf, Signature, Storable, Write};

use super::helpers::ArrayWriter;
use super::owned_buf::OwnedBuf;

/// A buffer for building a message body.
///
/// The signature of the body is accumulated as values are written, so a body
/// built with this type always matches its declared signature. Containers
/// are written through closures which receive a [`ValueWriter`] scoped to
/// the container.
///
/// # Examples
///
/// ```
/// use wirebus::{BodyBuf, Signature};
///
/// let mut body = BodyBuf::new();
///
/// body.store(10u16);
/// body.store(10u32);
///
/// assert_eq!(body.signature(), Signature::new(b"qu")?);
/// # Ok::<_, wirebus::Error>(())
/// ```
pub struct BodyBuf {
    signature: OwnedSignature,
    buf: OwnedBuf,
    fds: Vec<OwnedFd>,
}

impl BodyBuf {
    /// Construct a new empty body buffer in the native endianness.
    pub fn new() -> Self {
        Self::with_endianness(Endianness::NATIVE)
    }

    /// Construct a new body buffer with the specified endianness.
    pub fn with_endianness(endianness: Endianness) -> Self {
        Self {
            signature: OwnedSignature::new(),
            buf: OwnedBuf::with_endianness(endianness),
            fds: Vec::new(),
        }
    }

    /// Get the signature of the body.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Get the endianness of the buffer.
    pub fn endianness(&self) -> Endianness {
        self.buf.endianness()
    }

    /// Get the encoded body.
    pub fn get(&self) -> &[u8] {
        self.buf.get()
    }

    /// The number of file descriptors attached to the body.
    pub fn unix_fds(&self) -> u32 {
        self.fds.len() as u32
    }

    /// Clear the buffer, its signature and any attached file descriptors.
    pub fn clear(&mut self) {
        self.signature.clear();
        self.buf.clear();
        self.fds.clear();
    }

    /// Construct a reader over the body, as the receiving peer would see it.
    pub fn read(&self) -> ReadBuf<'_> {
        ReadBuf::from_slice(self.buf.get(), self.buf.endianness())
    }

    /// Store a fixed-width value and record its signature.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirebus::{BodyBuf, Signature};
    ///
    /// let mut body = BodyBuf::new();
    /// body.store(42u32);
    /// body.store(true);
    ///
    /// assert_eq!(body.signature(), Signature::new(b"ub")?);
    /// # Ok::<_, wirebus::Error>(())
    /// ```
    pub fn store<T>(&mut self, value: T)
    where
        T: Storable,
    {
        self.signature.extend_from_signature(T::SIGNATURE);
        value.store_to(&mut self.buf);
    }

    /// Write a length-prefixed value and record its signature.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirebus::{BodyBuf, Signature};
    ///
    /// let mut body = BodyBuf::new();
    /// body.write("Hello World!");
    ///
    /// assert_eq!(body.signature(), Signature::STRING);
    /// ```
    pub fn write<T>(&mut self, value: &T)
    where
        T: ?Sized + Write,
    {
        self.signature.extend_from_signature(T::SIGNATURE);
        self.buf.write(value);
    }

    /// Attach a file descriptor to the body and store its index.
    ///
    /// The descriptor is duplicated; the caller keeps its own copy. The
    /// duplicate is owned by the message until transmission completes.
    pub fn store_fd(&mut self, fd: BorrowedFd<'_>) -> Result<()> {
        let duped = dup_cloexec(fd.as_raw_fd())?;
        let index = self.fds.len() as u32;
        self.fds.push(duped);
        self.signature.extend_from_signature(Signature::UNIX_FD);
        self.buf.store(index);
        Ok(())
    }

    /// Write an array of the given element type.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirebus::{BodyBuf, Signature};
    ///
    /// let mut body = BodyBuf::new();
    ///
    /// body.write_array(Signature::STRING, |array| {
    ///     array.write("foo");
    ///     array.write("bar");
    ///     Ok(())
    /// })?;
    ///
    /// assert_eq!(body.signature(), Signature::new(b"as")?);
    /// # Ok::<_, wirebus::Error>(())
    /// ```
    pub fn write_array<F>(&mut self, element: &Signature, f: F) -> Result<()>
    where
        F: FnOnce(&mut ValueWriter<'_>) -> Result<()>,
    {
        if !element.is_single_complete_type() {
            return Err(SignatureError::NotSingleCompleteType.into());
        }

        self.signature.push(b'a');
        self.signature.extend_from_signature(element);

        let align = element.first_type().map_or(1, Type::alignment);
        write_array_in(&mut self.buf, &mut self.fds, align, f)
    }

    /// Write a dictionary, an array of `{key value}` entries.
    ///
    /// The closure writes each entry with [`ValueWriter::write_struct`].
    ///
    /// # Examples
    ///
    /// ```
    /// use wirebus::{BodyBuf, Signature};
    ///
    /// let mut body = BodyBuf::new();
    ///
    /// body.write_dict(Signature::STRING, Signature::UINT32, |dict| {
    ///     dict.write_struct(|entry| {
    ///         entry.write("a");
    ///         entry.store(1u32);
    ///         Ok(())
    ///     })
    /// })?;
    ///
    /// assert_eq!(body.signature(), Signature::new(b"a{su}")?);
    /// # Ok::<_, wirebus::Error>(())
    /// ```
    pub fn write_dict<F>(&mut self, key: &Signature, value: &Signature, f: F) -> Result<()>
    where
        F: FnOnce(&mut ValueWriter<'_>) -> Result<()>,
    {
        if !key.first_type().is_some_and(Type::is_basic) || !key.is_single_complete_type() {
            return Err(SignatureError::DictKeyMustBeBasicType.into());
        }

        if !value.is_single_complete_type() {
            return Err(SignatureError::NotSingleCompleteType.into());
        }

        self.signature.push(b'a');
        self.signature.push(b'{');
        self.signature.extend_from_signature(key);
        self.signature.extend_from_signature(value);
        self.signature.push(b'}');

        write_array_in(&mut self.buf, &mut self.fds, 8, f)
    }

    /// Write a struct with the given field types.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirebus::{BodyBuf, Signature};
    ///
    /// let mut body = BodyBuf::new();
    ///
    /// body.write_struct(Signature::new(b"us")?, |fields| {
    ///     fields.store(42u32);
    ///     fields.write("answer");
    ///     Ok(())
    /// })?;
    ///
    /// assert_eq!(body.signature(), Signature::new(b"(us)")?);
    /// # Ok::<_, wirebus::Error>(())
    /// ```
    pub fn write_struct<F>(&mut self, fields: &Signature, f: F) -> Result<()>
    where
        F: FnOnce(&mut ValueWriter<'_>) -> Result<()>,
    {
        if fields.is_empty() {
            return Err(SignatureError::StructHasNoFields.into());
        }

        self.signature.push(b'(');
        self.signature.extend_from_signature(fields);
        self.signature.push(b')');

        self.buf.align_mut(8);
        let mut writer = ValueWriter {
            buf: &mut self.buf,
            fds: &mut self.fds,
        };
        f(&mut writer)
    }

    /// Write a variant carrying a value of the given signature.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirebus::{BodyBuf, Signature};
    ///
    /// let mut body = BodyBuf::new();
    ///
    /// body.write_variant(Signature::STRING, |value| {
    ///     value.write("dynamic");
    ///     Ok(())
    /// })?;
    ///
    /// assert_eq!(body.signature(), Signature::VARIANT);
    /// # Ok::<_, wirebus::Error>(())
    /// ```
    pub fn write_variant<F>(&mut self, signature: &Signature, f: F) -> Result<()>
    where
        F: FnOnce(&mut ValueWriter<'_>) -> Result<()>,
    {
        if !signature.is_single_complete_type() {
            return Err(SignatureError::NotSingleCompleteType.into());
        }

        self.signature.extend_from_signature(Signature::VARIANT);
        self.buf.write(signature);

        let mut writer = ValueWriter {
            buf: &mut self.buf,
            fds: &mut self.fds,
        };
        f(&mut writer)
    }

    pub(crate) fn take_fds(&mut self) -> Vec<OwnedFd> {
        std::mem::take(&mut self.fds)
    }
}

impl Default for BodyBuf {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BodyBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyBuf")
            .field("signature", &self.signature)
            .field("len", &self.buf.len())
            .field("unix_fds", &self.fds.len())
            .finish()
    }
}

fn write_array_in<F>(
    buf: &mut OwnedBuf,
    fds: &mut Vec<OwnedFd>,
    element_align: usize,
    f: F,
) -> Result<()>
where
    F: FnOnce(&mut ValueWriter<'_>) -> Result<()>,
{
    let mut array = ArrayWriter::new(buf, element_align);

    let mut writer = ValueWriter {
        buf: array.buf(),
        fds,
    };

    f(&mut writer)?;
    array.finish();
    Ok(())
}

/// Writes the values inside a container, without signature tracking.
///
/// The signature of a container's contents is fixed by its declaration, so
/// values written through this type must follow the declared element or
/// field types.
pub struct ValueWriter<'a> {
    buf: &'a mut OwnedBuf,
    fds: &'a mut Vec<OwnedFd>,
}

impl ValueWriter<'_> {
    /// Store a fixed-width value.
    pub fn store<T>(&mut self, value: T)
    where
        T: Storable,
    {
        value.store_to(self.buf);
    }

    /// Write a length-prefixed value.
    pub fn write<T>(&mut self, value: &T)
    where
        T: ?Sized + Write,
    {
        self.buf.write(value);
    }

    /// Attach a file descriptor and store its index.
    pub fn store_fd(&mut self, fd: BorrowedFd<'_>) -> Result<()> {
        let duped = dup_cloexec(fd.as_raw_fd())?;
        let index = self.fds.len() as u32;
        self.fds.push(duped);
        self.buf.store(index);
        Ok(())
    }

    /// Write a nested array.
    pub fn write_array<F>(&mut self, element: &Signature, f: F) -> Result<()>
    where
        F: FnOnce(&mut ValueWriter<'_>) -> Result<()>,
    {
        if !element.is_single_complete_type() {
            return Err(SignatureError::NotSingleCompleteType.into());
        }

        let align = element.first_type().map_or(1, Type::alignment);
        write_array_in(self.buf, self.fds, align, f)
    }

    /// Write a nested dictionary.
    pub fn write_dict<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut ValueWriter<'_>) -> Result<()>,
    {
        write_array_in(self.buf, self.fds, 8, f)
    }

    /// Write a struct or dict entry, aligning to an 8-byte boundary.
    pub fn write_struct<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut ValueWriter<'_>) -> Result<()>,
    {
        self.buf.align_mut(8);

        let mut writer = ValueWriter {
            buf: &mut *self.buf,
            fds: &mut *self.fds,
        };
        f(&mut writer)
    }

    /// Write a nested variant.
    pub fn write_variant<F>(&mut self, signature: &Signature, f: F) -> Result<()>
    where
        F: FnOnce(&mut ValueWriter<'_>) -> Result<()>,
    {
        if !signature.is_single_complete_type() {
            return Err(SignatureError::NotSingleCompleteType.into());
        }

        self.buf.write(signature);

        let mut writer = ValueWriter {
            buf: &mut *self.buf,
            fds: &mut *self.fds,
        };
        f(&mut writer)
    }
}
