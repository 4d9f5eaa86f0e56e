use std::io;
use std::num::NonZeroU32;
use std::os::fd::OwnedFd;

use crate::error::ErrorKind;
use crate::proto::{self, Field, MessageType};
use crate::utils::padding_to;
use crate::{
    Endianness, Error, Fds, Flags, Message, MessageKind, ObjectPath, ReadBuf, Result, Signature,
};

use super::{MAX_ARRAY_LENGTH, MAX_BODY_LENGTH};

/// How much socket data is asked for per read.
const CHUNK: usize = 4096;

/// A reference to one complete frame sitting at the front of a [`RecvBuf`].
///
/// Carries the parsed prologue and the total encoded length of the frame;
/// the pipe is advanced past the frame with [`RecvBuf::advance`] once the
/// dispatch is done with it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MessageRef {
    pub(crate) endianness: Endianness,
    pub(crate) message_type: MessageType,
    pub(crate) flags: Flags,
    pub(crate) serial: u32,
    pub(crate) headers: u32,
    pub(crate) total: usize,
}

/// The receive pipe of a transport.
///
/// Socket reads append bytes at the back and any file descriptors received
/// alongside them to an ordered queue; whole frames are peeled off the front
/// with [`try_read_message`], parsed in place with [`read_message`] and
/// released with [`advance`].
///
/// [`try_read_message`]: Self::try_read_message
/// [`read_message`]: Self::read_message
/// [`advance`]: Self::advance
pub(crate) struct RecvBuf {
    buf: Vec<u8>,
    read: usize,
    fds: Vec<OwnedFd>,
}

impl RecvBuf {
    pub(crate) fn new() -> Self {
        Self {
            buf: Vec::new(),
            read: 0,
            fds: Vec::new(),
        }
    }

    /// Append data to the pipe through the given reader, which receives a
    /// spare chunk of buffer and the fd queue.
    ///
    /// Returns the number of bytes read; zero means end of stream.
    pub(crate) fn fill_from<F>(&mut self, f: F) -> io::Result<usize>
    where
        F: FnOnce(&mut [u8], &mut Vec<OwnedFd>) -> io::Result<usize>,
    {
        self.compact();

        let old = self.buf.len();
        self.buf.resize(old + CHUNK, 0);

        match f(&mut self.buf[old..], &mut self.fds) {
            Ok(n) => {
                self.buf.truncate(old + n);
                Ok(n)
            }
            Err(error) => {
                self.buf.truncate(old);
                Err(error)
            }
        }
    }

    /// Test if a whole frame is buffered, without consuming it.
    ///
    /// Peeks the fixed prologue, rejects malformed prologues and computes
    /// the total frame length as `16 + align8(headers) + body`. Returns
    /// `None` if the pipe does not hold the whole frame yet. The call is
    /// idempotent; the pipe only moves past the frame on [`advance`].
    ///
    /// [`advance`]: Self::advance
    pub(crate) fn try_read_message(&self) -> Result<Option<MessageRef>> {
        let avail = &self.buf[self.read..];

        if avail.len() < proto::MIN_MESSAGE {
            return Ok(None);
        }

        let endianness = Endianness(avail[0]);

        if !endianness.is_valid() {
            return Err(Error::new(ErrorKind::InvalidProtocol));
        }

        let message_type = MessageType(avail[1]);

        if !message_type.is_valid() {
            return Err(Error::new(ErrorKind::InvalidProtocol));
        }

        let flags = Flags(avail[2]);

        if avail[3] != proto::VERSION {
            return Err(Error::new(ErrorKind::InvalidProtocol));
        }

        let body_length = load_u32(&avail[4..8], endianness);
        let serial = load_u32(&avail[8..12], endianness);
        let headers = load_u32(&avail[12..16], endianness);

        if body_length > MAX_BODY_LENGTH {
            return Err(Error::new(ErrorKind::BodyTooLong(body_length)));
        }

        if headers > MAX_ARRAY_LENGTH {
            return Err(Error::new(ErrorKind::ArrayTooLong(headers)));
        }

        let headers_len = headers as usize;
        let total = proto::MIN_MESSAGE
            + headers_len
            + padding_to(8, headers_len)
            + body_length as usize;

        if avail.len() < total {
            return Ok(None);
        }

        Ok(Some(MessageRef {
            endianness,
            message_type,
            flags,
            serial,
            headers,
            total,
        }))
    }

    /// Parse the frame referenced by `message_ref` into a borrowed
    /// [`Message`] view.
    ///
    /// The header array is walked exactly once; unknown header field codes
    /// are skipped over by their signature. If the frame declares
    /// accompanying file descriptors they are moved out of the pipe's fd
    /// queue into the message; fewer queued descriptors than declared is a
    /// hard error.
    pub(crate) fn read_message(&mut self, message_ref: &MessageRef) -> Result<Message<'_>> {
        let MessageRef {
            endianness,
            message_type,
            flags,
            serial,
            headers,
            total,
        } = *message_ref;

        let frame = &self.buf[self.read..self.read + total];
        let mut buf = ReadBuf::from_slice(frame, endianness);
        buf.advance(proto::MIN_MESSAGE)?;

        let headers_end = proto::MIN_MESSAGE + headers as usize;

        let mut path = None;
        let mut interface = None;
        let mut member = None;
        let mut error_name = None;
        let mut reply_serial = None;
        let mut destination = None;
        let mut sender = None;
        let mut signature = Signature::EMPTY;
        let mut unix_fds = 0u32;

        while buf.offset() < headers_end {
            buf.read_struct()?;
            let field = Field(buf.load::<u8>()?);
            let sig = buf.read::<Signature>()?;

            match (field, sig.as_bytes()) {
                (Field::PATH, b"o") => {
                    path = Some(buf.read::<ObjectPath>()?);
                }
                (Field::INTERFACE, b"s") => {
                    interface = Some(buf.read::<str>()?);
                }
                (Field::MEMBER, b"s") => {
                    member = Some(buf.read::<str>()?);
                }
                (Field::ERROR_NAME, b"s") => {
                    error_name = Some(buf.read::<str>()?);
                }
                (Field::REPLY_SERIAL, b"u") => {
                    let number = buf.load::<u32>()?;
                    let number =
                        NonZeroU32::new(number).ok_or(Error::new(ErrorKind::ZeroSerial))?;
                    reply_serial = Some(number);
                }
                (Field::DESTINATION, b"s") => {
                    destination = Some(buf.read::<str>()?);
                }
                (Field::SENDER, b"s") => {
                    sender = Some(buf.read::<str>()?);
                }
                (Field::SIGNATURE, b"g") => {
                    signature = buf.read::<Signature>()?;
                }
                (Field::UNIX_FDS, b"u") => {
                    unix_fds = buf.load::<u32>()?;
                }
                (_, _) => {
                    sig.skip(&mut buf)?;
                }
            }
        }

        // Body begins at the next 8-byte boundary after the header array.
        buf.align_to(8)?;

        let serial = NonZeroU32::new(serial).ok_or(Error::new(ErrorKind::ZeroSerial))?;

        let fds = if unix_fds > 0 {
            if (unix_fds as usize) > self.fds.len() {
                return Err(Error::new(ErrorKind::MissingFds {
                    expected: unix_fds,
                    found: self.fds.len(),
                }));
            }

            Fds::from_vec(self.fds.drain(..unix_fds as usize).collect())
        } else {
            Fds::empty()
        };

        let kind = match message_type {
            MessageType::METHOD_CALL => {
                let path = path.ok_or(Error::new(ErrorKind::MissingPath))?;
                let member = member.ok_or(Error::new(ErrorKind::MissingMember))?;
                MessageKind::MethodCall { path, member }
            }
            MessageType::METHOD_RETURN => {
                let reply_serial = reply_serial.ok_or(Error::new(ErrorKind::MissingReplySerial))?;
                MessageKind::MethodReturn { reply_serial }
            }
            MessageType::ERROR => {
                let error_name = error_name.ok_or(Error::new(ErrorKind::MissingErrorName))?;
                let reply_serial = reply_serial.ok_or(Error::new(ErrorKind::MissingReplySerial))?;
                MessageKind::Error {
                    error_name,
                    reply_serial,
                }
            }
            MessageType::SIGNAL => {
                let path = path.ok_or(Error::new(ErrorKind::MissingPath))?;
                let member = member.ok_or(Error::new(ErrorKind::MissingMember))?;

                if interface.is_none() {
                    return Err(Error::new(ErrorKind::MissingInterface));
                }

                MessageKind::Signal { path, member }
            }
            _ => return Err(Error::new(ErrorKind::InvalidProtocol)),
        };

        let body_start = buf.offset();
        let body = ReadBuf::with_fds(&frame[body_start..], endianness, fds);

        Ok(Message {
            kind,
            serial,
            flags,
            interface,
            destination,
            sender,
            signature,
            reply_serial,
            body,
        })
    }

    /// Release the frame at the front of the pipe.
    pub(crate) fn advance(&mut self, total: usize) {
        self.read += total;
        self.compact();
    }

    fn compact(&mut self) {
        if self.read == self.buf.len() {
            self.buf.clear();
            self.read = 0;
        } else if self.read >= CHUNK * 4 {
            self.buf.drain(..self.read);
            self.read = 0;
        }
    }
}

fn load_u32(bytes: &[u8], endianness: Endianness) -> u32 {
    let bytes = [bytes[0], bytes[1], bytes[2], bytes[3]];

    match endianness {
        Endianness::BIG => u32::from_be_bytes(bytes),
        _ => u32::from_le_bytes(bytes),
    }
}
