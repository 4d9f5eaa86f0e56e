pub use self::message::Message;
mod message;

pub use self::message_kind::MessageKind;
mod message_kind;

pub use self::owned_message::{OwnedMessage, OwnedMessageKind};
mod owned_message;

pub use self::outbound::{Call, Signal};
pub(crate) use self::outbound::{Outbound, OutboundKind};
mod outbound;
