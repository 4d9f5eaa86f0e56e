use std::num::NonZeroU32;

use crate::{Flags, ObjectPath, ObjectPathError};

/// A method call to be sent over a connection.
///
/// # Examples
///
/// ```
/// use wirebus::Call;
///
/// let call = Call::new("/org/freedesktop/DBus", "ListNames")?
///     .with_interface("org.freedesktop.DBus")
///     .with_destination("org.freedesktop.DBus");
/// # Ok::<_, wirebus::ObjectPathError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Call<'a> {
    pub(crate) path: &'a ObjectPath,
    pub(crate) member: &'a str,
    pub(crate) interface: Option<&'a str>,
    pub(crate) destination: Option<&'a str>,
    pub(crate) flags: Flags,
}

impl<'a> Call<'a> {
    /// Construct a method call towards the given path and member.
    pub fn new(path: &'a str, member: &'a str) -> Result<Self, ObjectPathError> {
        Ok(Self::with_path(ObjectPath::new(path)?, member))
    }

    /// Construct a method call from an already validated path.
    pub fn with_path(path: &'a ObjectPath, member: &'a str) -> Self {
        Self {
            path,
            member,
            interface: None,
            destination: None,
            flags: Flags::EMPTY,
        }
    }

    /// Set the interface the member is looked up on.
    pub fn with_interface(self, interface: &'a str) -> Self {
        Self {
            interface: Some(interface),
            ..self
        }
    }

    /// Set the destination of the call.
    pub fn with_destination(self, destination: &'a str) -> Self {
        Self {
            destination: Some(destination),
            ..self
        }
    }

    /// Set the flags of the call.
    pub fn with_flags(self, flags: Flags) -> Self {
        Self { flags, ..self }
    }
}

/// A signal to be emitted over a connection.
#[derive(Debug, Clone)]
pub struct Signal<'a> {
    pub(crate) path: &'a ObjectPath,
    pub(crate) interface: &'a str,
    pub(crate) member: &'a str,
    pub(crate) destination: Option<&'a str>,
    pub(crate) flags: Flags,
}

impl<'a> Signal<'a> {
    /// Construct a signal emitted from the given path, interface and member.
    pub fn new(path: &'a str, interface: &'a str, member: &'a str) -> Result<Self, ObjectPathError> {
        Ok(Self::with_path(ObjectPath::new(path)?, interface, member))
    }

    /// Construct a signal from an already validated path.
    pub fn with_path(path: &'a ObjectPath, interface: &'a str, member: &'a str) -> Self {
        Self {
            path,
            interface,
            member,
            destination: None,
            flags: Flags::EMPTY,
        }
    }

    /// Set the destination of the signal.
    pub fn with_destination(self, destination: &'a str) -> Self {
        Self {
            destination: Some(destination),
            ..self
        }
    }

    /// Set the flags of the signal.
    pub fn with_flags(self, flags: Flags) -> Self {
        Self { flags, ..self }
    }
}

/// The kind of an outbound message.
#[derive(Debug, Clone, Copy)]
pub(crate) enum OutboundKind<'a> {
    MethodCall {
        path: &'a ObjectPath,
        member: &'a str,
    },
    MethodReturn {
        reply_serial: NonZeroU32,
    },
    Error {
        error_name: &'a str,
        reply_serial: NonZeroU32,
    },
    Signal {
        path: &'a ObjectPath,
        member: &'a str,
    },
}

/// A fully described outbound message, ready to be encoded.
#[derive(Debug, Clone)]
pub(crate) struct Outbound<'a> {
    pub(crate) kind: OutboundKind<'a>,
    pub(crate) interface: Option<&'a str>,
    pub(crate) destination: Option<&'a str>,
    pub(crate) flags: Flags,
}

impl<'a> From<&Call<'a>> for Outbound<'a> {
    fn from(call: &Call<'a>) -> Self {
        Self {
            kind: OutboundKind::MethodCall {
                path: call.path,
                member: call.member,
            },
            interface: call.interface,
            destination: call.destination,
            flags: call.flags,
        }
    }
}

impl<'a> From<&Signal<'a>> for Outbound<'a> {
    fn from(signal: &Signal<'a>) -> Self {
        Self {
            kind: OutboundKind::Signal {
                path: signal.path,
                member: signal.member,
            },
            interface: Some(signal.interface),
            destination: signal.destination,
            flags: signal.flags,
        }
    }
}
