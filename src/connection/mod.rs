pub use self::connection::Connection;
pub(crate) use self::connection::{ReplyHandler, Shared};
mod connection;

pub use self::builder::ConnectionBuilder;
mod builder;

pub use self::observer::Observer;
pub(crate) use self::observer::{MatchEntry, ObserverSlot, Subscription};
mod observer;

pub(crate) mod transport;
