use std::fmt;

/// Helper to debug a byte sequence which is mostly expected to contain ASCII.
#[repr(transparent)]
pub(crate) struct LossyStr([u8]);

impl LossyStr {
    #[inline]
    pub(crate) fn new(bytes: &[u8]) -> &LossyStr {
        // SAFETY: The byte slice is repr transparent over this type.
        unsafe { &*(bytes as *const _ as *const LossyStr) }
    }
}

impl fmt::Debug for LossyStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;

        for chunk in self.0.utf8_chunks() {
            for c in chunk.valid().chars() {
                match c {
                    '\\' => write!(f, "\\\\")?,
                    '"' => write!(f, "\\\"")?,
                    c if c.is_ascii_control() => write!(f, "{}", c.escape_default())?,
                    c => write!(f, "{c}")?,
                }
            }

            if !chunk.invalid().is_empty() {
                write!(f, "\u{fffd}")?;
            }
        }

        write!(f, "\"")
    }
}
