use std::num::NonZeroU32;

use crate::{ObjectPath, OwnedMessageKind};

/// The kind of a [`Message`], distinguished by the message type code and the
/// headers the type requires.
///
/// [`Message`]: crate::Message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind<'a> {
    /// A method call, requiring a path and a member.
    MethodCall {
        /// The path of the call.
        path: &'a ObjectPath,
        /// The member being called.
        member: &'a str,
    },
    /// A reply to a method call.
    MethodReturn {
        /// The serial of the call this message replies to.
        reply_serial: NonZeroU32,
    },
    /// An error reply.
    Error {
        /// The name of the error.
        error_name: &'a str,
        /// The serial of the call this error replies to.
        reply_serial: NonZeroU32,
    },
    /// A signal emission, requiring a path, an interface and a member.
    Signal {
        /// The path the signal is emitted from.
        path: &'a ObjectPath,
        /// The member of the signal.
        member: &'a str,
    },
}

impl MessageKind<'_> {
    /// Convert into an [`OwnedMessageKind`].
    pub fn to_owned(self) -> OwnedMessageKind {
        match self {
            MessageKind::MethodCall { path, member } => OwnedMessageKind::MethodCall {
                path: path.to_owned(),
                member: member.into(),
            },
            MessageKind::MethodReturn { reply_serial } => {
                OwnedMessageKind::MethodReturn { reply_serial }
            }
            MessageKind::Error {
                error_name,
                reply_serial,
            } => OwnedMessageKind::Error {
                error_name: error_name.into(),
                reply_serial,
            },
            MessageKind::Signal { path, member } => OwnedMessageKind::Signal {
                path: path.to_owned(),
                member: member.into(),
            },
        }
    }
}
