use std::fmt;
use std::str::from_utf8_unchecked;

use crate::OwnedObjectPath;

use super::{validate, ObjectPathError};

/// A validated object path.
///
/// * The path must begin with an ASCII `/` and consist of elements separated
///   by slash characters.
/// * Each element must only contain the ASCII characters `[A-Z][a-z][0-9]_`
///   and may not be empty.
/// * A trailing `/` is not allowed unless the path is the root path `/`.
#[derive(Hash, PartialEq, Eq)]
#[repr(transparent)]
pub struct ObjectPath([u8]);

impl ObjectPath {
    /// The special `"/"` object path.
    pub const ROOT: &'static Self = Self::new_const(b"/");

    /// Construct a new object path, panicking if the argument is not valid.
    #[track_caller]
    pub const fn new_const(path: &[u8]) -> &Self {
        if !validate(path) {
            panic!("Invalid D-Bus object path");
        }

        // SAFETY: The path was just validated.
        unsafe { Self::new_unchecked(path) }
    }

    /// Construct a new validated object path.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirebus::ObjectPath;
    ///
    /// assert!(ObjectPath::new("/org/freedesktop/DBus").is_ok());
    /// assert!(ObjectPath::new("/org/").is_err());
    /// ```
    pub fn new<P>(path: &P) -> Result<&Self, ObjectPathError>
    where
        P: ?Sized + AsRef<[u8]>,
    {
        let path = path.as_ref();

        if !validate(path) {
            return Err(ObjectPathError);
        }

        // SAFETY: The path was just validated.
        unsafe { Ok(Self::new_unchecked(path)) }
    }

    /// Construct a new unchecked object path.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the path is valid.
    pub(crate) const unsafe fn new_unchecked(path: &[u8]) -> &Self {
        &*(path as *const _ as *const ObjectPath)
    }

    /// Get the object path as a string.
    pub fn as_str(&self) -> &str {
        // SAFETY: Validation ensures the path is ASCII.
        unsafe { from_utf8_unchecked(&self.0) }
    }

    /// Get the object path as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Test if this path starts with another path.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirebus::ObjectPath;
    ///
    /// const FOO: &ObjectPath = ObjectPath::new_const(b"/foo");
    /// const FOO_BAR: &ObjectPath = ObjectPath::new_const(b"/foo/bar");
    ///
    /// assert!(FOO_BAR.starts_with(FOO));
    /// ```
    #[must_use]
    pub fn starts_with(&self, other: &ObjectPath) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl fmt::Debug for ObjectPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectPath").field(&self.as_str()).finish()
    }
}

impl fmt::Display for ObjectPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<ObjectPath> for ObjectPath {
    #[inline]
    fn as_ref(&self) -> &ObjectPath {
        self
    }
}

impl ToOwned for ObjectPath {
    type Owned = OwnedObjectPath;

    #[inline]
    fn to_owned(&self) -> Self::Owned {
        // SAFETY: `self` is valid by construction.
        unsafe { OwnedObjectPath::from_vec(self.0.to_vec()) }
    }
}

impl PartialEq<str> for ObjectPath {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl PartialEq<str> for &ObjectPath {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl<'a> TryFrom<&'a str> for &'a ObjectPath {
    type Error = ObjectPathError;

    #[inline]
    fn try_from(path: &'a str) -> Result<Self, Self::Error> {
        ObjectPath::new(path)
    }
}
