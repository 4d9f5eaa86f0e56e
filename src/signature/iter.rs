use crate::proto::Type;
use crate::Signature;

/// One complete type yielded by [`SignatureIter`].
///
/// Carries the leading type code, the full single-type slice, and the inner
/// signature: empty for basic types and variants, the element type for
/// arrays, and the contents between the delimiters for structs and dict
/// entries. Note that the element type of an array may be a dict entry such
/// as `{sv}`, which is not a standalone-valid signature but can be walked
/// further with this iterator.
#[derive(Clone, Copy)]
pub(crate) struct SignatureToken<'a> {
    code: Type,
    full: &'a Signature,
    inner: &'a Signature,
}

impl<'a> SignatureToken<'a> {
    /// The leading type code of this complete type.
    pub(crate) fn code(&self) -> Type {
        self.code
    }

    /// The full single-type signature slice.
    pub(crate) fn full(&self) -> &'a Signature {
        self.full
    }

    /// The inner signature view.
    pub(crate) fn inner(&self) -> &'a Signature {
        self.inner
    }
}

/// An iterator over the complete types of a signature.
///
/// The input is assumed to uphold the invariants checked by signature
/// validation; the iterator is restartable and carries no state beyond the
/// remaining slice.
pub(crate) struct SignatureIter<'a> {
    rest: &'a [u8],
}

impl<'a> SignatureIter<'a> {
    #[inline]
    pub(crate) fn new(signature: &'a Signature) -> Self {
        Self {
            rest: signature.as_bytes(),
        }
    }
}

impl<'a> Iterator for SignatureIter<'a> {
    type Item = SignatureToken<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let code = Type(self.rest[0]);
        let end = complete_type_end(self.rest, 0);
        let (full, rest) = self.rest.split_at(end);
        self.rest = rest;

        let inner = match code {
            Type::ARRAY => &full[1..],
            Type::OPEN_PAREN | Type::OPEN_BRACE => &full[1..full.len() - 1],
            _ => &[],
        };

        // SAFETY: Both slices are views into a validated signature.
        unsafe {
            Some(SignatureToken {
                code,
                full: Signature::new_unchecked(full),
                inner: Signature::new_unchecked(inner),
            })
        }
    }
}

/// The end index of the single complete type starting at `at`.
fn complete_type_end(bytes: &[u8], at: usize) -> usize {
    match Type(bytes[at]) {
        Type::ARRAY => complete_type_end(bytes, at + 1),
        Type::OPEN_PAREN | Type::OPEN_BRACE => {
            let mut depth = 0usize;
            let mut n = at;

            loop {
                match Type(bytes[n]) {
                    Type::OPEN_PAREN | Type::OPEN_BRACE => depth += 1,
                    Type::CLOSE_PAREN | Type::CLOSE_BRACE => {
                        depth -= 1;

                        if depth == 0 {
                            return n + 1;
                        }
                    }
                    _ => {}
                }

                n += 1;
            }
        }
        _ => at + 1,
    }
}
