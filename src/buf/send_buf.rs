use std::num::NonZeroU32;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use crate::error::ErrorKind;
use crate::message::{Outbound, OutboundKind};
use crate::proto::{self, Field, MessageType};
use crate::{BodyBuf, Error, Result, Signature};

use super::helpers::ArrayWriter;
use super::owned_buf::{Alloc, OwnedBuf};
use super::MAX_BODY_LENGTH;

/// A buffer holding one encoded outbound message frame.
///
/// The frame is encoded with a placeholder serial; the connection patches
/// the real serial in with [`set_serial`] once it has been allocated. The
/// buffer is exclusively owned while being written and while queued on the
/// transport, and returns to the [`BufPool`] after transmission.
///
/// [`set_serial`]: Self::set_serial
/// [`BufPool`]: super::BufPool
pub(crate) struct MessageBuf {
    buf: OwnedBuf,
    fds: Vec<OwnedFd>,
    serial: Option<Alloc<u32>>,
}

impl MessageBuf {
    pub(crate) fn new() -> Self {
        Self {
            buf: OwnedBuf::new(),
            fds: Vec::new(),
            serial: None,
        }
    }

    /// Encode a whole frame for the given outbound message and body.
    ///
    /// The body's file descriptors are moved into this buffer; they are
    /// closed when the buffer is reset after transmission.
    pub(crate) fn encode(&mut self, message: &Outbound<'_>, body: &mut BodyBuf) -> Result<()> {
        self.reset();

        let Ok(body_length) = u32::try_from(body.get().len()) else {
            return Err(Error::new(ErrorKind::BodyTooLong(u32::MAX)));
        };

        if body_length > MAX_BODY_LENGTH {
            return Err(Error::new(ErrorKind::BodyTooLong(body_length)));
        }

        let message_type = match message.kind {
            OutboundKind::MethodCall { .. } => MessageType::METHOD_CALL,
            OutboundKind::MethodReturn { .. } => MessageType::METHOD_RETURN,
            OutboundKind::Error { .. } => MessageType::ERROR,
            OutboundKind::Signal { .. } => MessageType::SIGNAL,
        };

        // Frames are normally emitted in the native endianness; a body built
        // with an explicit endianness carries the whole frame with it.
        let endianness = body.endianness();
        self.buf.set_endianness(endianness);
        self.buf.store(endianness.0);
        self.buf.store(message_type.0);
        self.buf.store(message.flags.0);
        self.buf.store(proto::VERSION);
        self.buf.store(body_length);
        self.serial = Some(self.buf.alloc::<u32>());

        let mut array = ArrayWriter::new(&mut self.buf, 8);

        match message.kind {
            OutboundKind::MethodCall { path, member } => {
                let mut st = array.write_struct();
                st.store(Field::PATH.0);
                st.write(Signature::OBJECT_PATH);
                st.write(path);

                let mut st = array.write_struct();
                st.store(Field::MEMBER.0);
                st.write(Signature::STRING);
                st.write(member);
            }
            OutboundKind::MethodReturn { reply_serial } => {
                let mut st = array.write_struct();
                st.store(Field::REPLY_SERIAL.0);
                st.write(Signature::UINT32);
                st.buf().store(reply_serial.get());
            }
            OutboundKind::Error {
                error_name,
                reply_serial,
            } => {
                let mut st = array.write_struct();
                st.store(Field::ERROR_NAME.0);
                st.write(Signature::STRING);
                st.write(error_name);

                let mut st = array.write_struct();
                st.store(Field::REPLY_SERIAL.0);
                st.write(Signature::UINT32);
                st.buf().store(reply_serial.get());
            }
            OutboundKind::Signal { path, member } => {
                let mut st = array.write_struct();
                st.store(Field::PATH.0);
                st.write(Signature::OBJECT_PATH);
                st.write(path);

                let mut st = array.write_struct();
                st.store(Field::MEMBER.0);
                st.write(Signature::STRING);
                st.write(member);
            }
        }

        if let Some(interface) = message.interface {
            let mut st = array.write_struct();
            st.store(Field::INTERFACE.0);
            st.write(Signature::STRING);
            st.write(interface);
        }

        if let Some(destination) = message.destination {
            let mut st = array.write_struct();
            st.store(Field::DESTINATION.0);
            st.write(Signature::STRING);
            st.write(destination);
        }

        if !body.signature().is_empty() {
            let mut st = array.write_struct();
            st.store(Field::SIGNATURE.0);
            st.write(Signature::SIGNATURE);
            st.write(body.signature());
        }

        if body.unix_fds() > 0 {
            let mut st = array.write_struct();
            st.store(Field::UNIX_FDS.0);
            st.write(Signature::UINT32);
            st.buf().store(body.unix_fds());
        }

        array.finish();

        // The header array is padded so that the body starts on an 8-byte
        // boundary; the padding is excluded from the array length.
        self.buf.align_mut(8);
        self.buf.extend_from_slice(body.get());
        self.fds = body.take_fds();
        Ok(())
    }

    /// Patch the serial allocated by the connection into the prologue.
    ///
    /// The slot is reserved by [`encode`] and consumed here, so a frame is
    /// stamped with exactly one serial.
    ///
    /// [`encode`]: Self::encode
    pub(crate) fn set_serial(&mut self, serial: NonZeroU32) {
        let at = self.serial.take().expect("no serial slot reserved");
        self.buf.store_at(at, serial.get());
    }

    /// The encoded frame.
    pub(crate) fn get(&self) -> &[u8] {
        self.buf.get()
    }

    /// The raw descriptors to attach to the first chunk of the frame.
    pub(crate) fn raw_fds(&self) -> Vec<RawFd> {
        self.fds.iter().map(|fd| fd.as_raw_fd()).collect()
    }

    /// Reset the buffer, closing any file descriptors still attached.
    pub(crate) fn reset(&mut self) {
        self.buf.clear();
        self.fds.clear();
        self.serial = None;
    }
}
