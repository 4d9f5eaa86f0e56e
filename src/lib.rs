//! Transport-agnostic client for the D-Bus wire protocol.
//!
//! This crate implements the hard parts of a D-Bus client: the
//! alignment-sensitive, endian-parametric wire codec, the signature engine
//! which drives it, the framed transport with SASL authentication and
//! Unix-fd passing, and a connection core which routes replies to pending
//! calls and signals to subscribed observers.
//!
//! # Examples
//!
//! ```no_run
//! use wirebus::{BodyBuf, Call, Connection, MatchRule, MessageType};
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() -> wirebus::Result<()> {
//! let connection = Connection::session_bus().await?;
//!
//! let reply = connection
//!     .call(
//!         Call::new("/org/freedesktop/DBus", "ListNames")?
//!             .with_interface("org.freedesktop.DBus")
//!             .with_destination("org.freedesktop.DBus"),
//!         BodyBuf::new(),
//!     )
//!     .await?;
//!
//! let mut body = reply.body();
//! let mut names = body.read_array(4)?;
//!
//! while names.has_next()? {
//!     println!("{}", names.buf().read::<str>()?);
//! }
//!
//! let rule = MatchRule::new()
//!     .with_message_type(MessageType::SIGNAL)
//!     .with_interface("org.freedesktop.DBus")
//!     .with_member("NameOwnerChanged");
//!
//! let mut observer = connection.add_match(rule).await?;
//!
//! while let Some(signal) = observer.recv().await {
//!     println!("{:?}", signal.member());
//! }
//! # Ok(()) }
//! ```

#![allow(clippy::module_inception)]
#![cfg(unix)]

#[macro_use]
mod stack;

#[doc(inline)]
pub use self::error::{Error, Result};
mod error;

#[doc(inline)]
pub use self::proto::{Endianness, Flags, MessageType};
pub(crate) mod proto;

mod frame;
pub(crate) use self::frame::Frame;

#[doc(inline)]
pub use self::signature::{OwnedSignature, Signature, SignatureError};
mod signature;

#[doc(inline)]
pub use self::object_path::{ObjectPath, ObjectPathError, OwnedObjectPath};
mod object_path;

pub use self::buf::{ArrayReader, BodyBuf, ReadBuf, ValueWriter};
pub mod buf;

#[doc(inline)]
pub use self::fd::Fds;
mod fd;

#[doc(inline)]
pub use self::address::{Address, AddressError, Addresses, Transport};
mod address;

pub mod sasl;

#[doc(inline)]
pub use self::message::{Call, Message, MessageKind, OwnedMessage, OwnedMessageKind, Signal};
pub(crate) mod message;

#[doc(inline)]
pub use self::match_rule::MatchRule;
mod match_rule;

#[doc(inline)]
pub use self::connection::{Connection, ConnectionBuilder, Observer};
mod connection;

pub mod org_freedesktop_dbus;

mod read;
pub use self::read::Read;

mod write;
pub use self::write::Write;

mod storable;
pub use self::storable::Storable;

mod lossy_str;

mod utils;
