use std::num::NonZeroU32;

use crate::{
    Endianness, Fds, Flags, ObjectPath, OwnedObjectPath, OwnedSignature, ReadBuf, Signature,
};

/// The kind of an [`OwnedMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedMessageKind {
    /// A method call.
    MethodCall {
        /// The path of the call.
        path: OwnedObjectPath,
        /// The member being called.
        member: Box<str>,
    },
    /// A reply to a method call.
    MethodReturn {
        /// The serial of the call this message replies to.
        reply_serial: NonZeroU32,
    },
    /// An error reply.
    Error {
        /// The name of the error.
        error_name: Box<str>,
        /// The serial of the call this error replies to.
        reply_serial: NonZeroU32,
    },
    /// A signal emission.
    Signal {
        /// The path the signal is emitted from.
        path: OwnedObjectPath,
        /// The member of the signal.
        member: Box<str>,
    },
}

/// An owned message, detached from the receive pipe it was parsed out of.
///
/// Produced by [`Message::to_owned`] and handed to observers and pending
/// calls by the connection. The body bytes are copied; the fd collection is
/// shared with every other handler the frame was dispatched to.
///
/// [`Message::to_owned`]: crate::Message::to_owned
#[derive(Debug, Clone)]
pub struct OwnedMessage {
    pub(crate) kind: OwnedMessageKind,
    pub(crate) serial: NonZeroU32,
    pub(crate) flags: Flags,
    pub(crate) interface: Option<Box<str>>,
    pub(crate) destination: Option<Box<str>>,
    pub(crate) sender: Option<Box<str>>,
    pub(crate) signature: OwnedSignature,
    pub(crate) reply_serial: Option<NonZeroU32>,
    pub(crate) endianness: Endianness,
    pub(crate) body: Box<[u8]>,
    pub(crate) fds: Fds,
}

impl OwnedMessage {
    /// Get the kind of the message.
    pub fn kind(&self) -> &OwnedMessageKind {
        &self.kind
    }

    /// Get the serial of the message.
    pub fn serial(&self) -> NonZeroU32 {
        self.serial
    }

    /// Get the flags of the message.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Get the interface of the message.
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Get the destination of the message.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Get the sender of the message.
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Get the signature of the body.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The path of a method call or signal.
    pub fn path(&self) -> Option<&ObjectPath> {
        match &self.kind {
            OwnedMessageKind::MethodCall { path, .. } => Some(path),
            OwnedMessageKind::Signal { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The member of a method call or signal.
    pub fn member(&self) -> Option<&str> {
        match &self.kind {
            OwnedMessageKind::MethodCall { member, .. } => Some(member),
            OwnedMessageKind::Signal { member, .. } => Some(member),
            _ => None,
        }
    }

    /// The error name of an error reply.
    pub fn error_name(&self) -> Option<&str> {
        match &self.kind {
            OwnedMessageKind::Error { error_name, .. } => Some(error_name),
            _ => None,
        }
    }

    /// The serial this message replies to, if the header was present.
    pub fn reply_serial(&self) -> Option<NonZeroU32> {
        self.reply_serial
    }

    /// The file descriptors which accompanied the message.
    pub fn fds(&self) -> &Fds {
        &self.fds
    }

    /// Get a reader positioned at the first argument of the body.
    pub fn body(&self) -> ReadBuf<'_> {
        ReadBuf::with_fds(&self.body, self.endianness, self.fds.clone())
    }
}

impl PartialEq for OwnedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.serial == other.serial
            && self.flags == other.flags
            && self.interface == other.interface
            && self.destination == other.destination
            && self.sender == other.sender
            && self.signature == other.signature
            && self.endianness == other.endianness
            && self.body == other.body
    }
}

impl Eq for OwnedMessage {}
