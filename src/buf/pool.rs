use std::sync::Mutex;

use super::MessageBuf;

/// How many reusable buffers the pool holds on to.
const CAP: usize = 8;

/// A bounded stack of reusable [`MessageBuf`]s.
///
/// Renting pops a reset buffer or allocates a fresh one; returning resets
/// the buffer and keeps it if the pool has room, dropping it otherwise.
pub(crate) struct BufPool {
    inner: Mutex<Vec<MessageBuf>>,
}

impl BufPool {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Rent an empty buffer.
    pub(crate) fn rent(&self) -> MessageBuf {
        self.inner
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(MessageBuf::new)
    }

    /// Return a buffer to the pool.
    ///
    /// The buffer is reset, closing any file descriptors still attached.
    pub(crate) fn put(&self, mut buf: MessageBuf) {
        buf.reset();

        let mut inner = self.inner.lock().unwrap();

        if inner.len() < CAP {
            inner.push(buf);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}
