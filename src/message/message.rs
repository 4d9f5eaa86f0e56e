use std::num::NonZeroU32;

use crate::proto::MessageType;
use crate::{Fds, Flags, MessageKind, ObjectPath, OwnedMessage, ReadBuf, Signature};

/// A borrowed view over one message frame.
///
/// The view borrows from the receive pipe of the transport and is only valid
/// for the duration of a dispatch; code that needs to retain the message
/// uses [`Message::to_owned`].
#[derive(Debug, Clone)]
pub struct Message<'a> {
    /// The kind of the message.
    pub(crate) kind: MessageKind<'a>,
    /// Serial of the message.
    pub(crate) serial: NonZeroU32,
    /// Flags in the message.
    pub(crate) flags: Flags,
    /// The interface of the message.
    pub(crate) interface: Option<&'a str>,
    /// The destination of the message.
    pub(crate) destination: Option<&'a str>,
    /// The sender of the message.
    pub(crate) sender: Option<&'a str>,
    /// The signature of the body.
    pub(crate) signature: &'a Signature,
    /// The raw reply-serial header, regardless of message kind.
    pub(crate) reply_serial: Option<NonZeroU32>,
    /// The body of the message, positioned at the first argument.
    pub(crate) body: ReadBuf<'a>,
}

impl<'a> Message<'a> {
    /// Get the kind of the message.
    pub fn kind(&self) -> MessageKind<'a> {
        self.kind
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
    pub fn interface(&self) -> Option<&'a str> {
        self.interface
    }

    /// Get the destination of the message.
    pub fn destination(&self) -> Option<&'a str> {
        self.destination
    }

    /// Get the sender of the message.
    pub fn sender(&self) -> Option<&'a str> {
        self.sender
    }

    /// Get the signature of the body.
    pub fn signature(&self) -> &'a Signature {
        self.signature
    }

    /// The path of a method call or signal.
    pub fn path(&self) -> Option<&'a ObjectPath> {
        match self.kind {
            MessageKind::MethodCall { path, .. } => Some(path),
            MessageKind::Signal { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The member of a method call or signal.
    pub fn member(&self) -> Option<&'a str> {
        match self.kind {
            MessageKind::MethodCall { member, .. } => Some(member),
            MessageKind::Signal { member, .. } => Some(member),
            _ => None,
        }
    }

    /// The error name of an error reply.
    pub fn error_name(&self) -> Option<&'a str> {
        match self.kind {
            MessageKind::Error { error_name, .. } => Some(error_name),
            _ => None,
        }
    }

    /// The serial this message replies to, if the header was present.
    pub fn reply_serial(&self) -> Option<NonZeroU32> {
        self.reply_serial
    }

    /// The file descriptors which accompanied the message.
    pub fn fds(&self) -> &Fds {
        self.body.fds()
    }

    /// Get a reader positioned at the first argument of the body.
    pub fn body(&self) -> ReadBuf<'a> {
        self.body.clone()
    }

    /// Convert into an [`OwnedMessage`], copying the borrowed data.
    ///
    /// The fd collection is shared with the original frame, not copied.
    pub fn to_owned(&self) -> OwnedMessage {
        OwnedMessage {
            kind: self.kind.to_owned(),
            serial: self.serial,
            flags: self.flags,
            interface: self.interface.map(Box::from),
            destination: self.destination.map(Box::from),
            sender: self.sender.map(Box::from),
            signature: self.signature.to_owned(),
            reply_serial: self.reply_serial,
            endianness: self.body.endianness(),
            body: self.body.get().into(),
            fds: self.body.fds().clone(),
        }
    }

    pub(crate) fn message_type(&self) -> MessageType {
        match self.kind {
            MessageKind::MethodCall { .. } => MessageType::METHOD_CALL,
            MessageKind::MethodReturn { .. } => MessageType::METHOD_RETURN,
            MessageKind::Error { .. } => MessageType::ERROR,
            MessageKind::Signal { .. } => MessageType::SIGNAL,
        }
    }
}

impl PartialEq for Message<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.serial == other.serial
            && self.flags == other.flags
            && self.interface == other.interface
            && self.destination == other.destination
            && self.sender == other.sender
            && self.signature == other.signature
            && self.body.get() == other.body.get()
            && self.body.endianness() == other.body.endianness()
    }
}
