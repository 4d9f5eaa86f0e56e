use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;
use std::sync::Arc;

use crate::AddressError;
use crate::ObjectPathError;
use crate::SignatureError;

/// Result alias using an [`Error`] as the error type by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised by this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Self { kind }
    }

    #[inline]
    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Test if this error indicates that the connection is disconnected.
    ///
    /// Any operation on a disconnected connection fails with an error for
    /// which this returns `true`; the underlying cause, if any, is available
    /// through [`std::error::Error::source`].
    pub fn is_disconnected(&self) -> bool {
        matches!(self.kind, ErrorKind::Disconnected(..))
    }

    /// Test if this error indicates that the reader ran out of data.
    pub fn is_truncated(&self) -> bool {
        matches!(self.kind, ErrorKind::Truncated)
    }

    /// The error name and message of a well-formed `Error` reply from the
    /// peer, such as `org.freedesktop.DBus.Error.UnknownMethod`.
    pub fn as_dbus_error(&self) -> Option<(&str, Option<&str>)> {
        match &self.kind {
            ErrorKind::Dbus { name, message } => Some((name, message.as_deref())),
            _ => None,
        }
    }

    /// Construct the error used to complete an operation on a torn-down
    /// connection, carrying the first closing error as the reason.
    pub(crate) fn disconnected(reason: Option<Arc<Error>>) -> Error {
        Self::new(ErrorKind::Disconnected(reason))
    }
}

impl From<SignatureError> for Error {
    #[inline]
    fn from(error: SignatureError) -> Self {
        Self::new(ErrorKind::Signature(error))
    }
}

impl From<ObjectPathError> for Error {
    #[inline]
    fn from(error: ObjectPathError) -> Self {
        Self::new(ErrorKind::ObjectPath(error))
    }
}

impl From<AddressError> for Error {
    #[inline]
    fn from(error: AddressError) -> Self {
        Self::new(ErrorKind::Address(error))
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::WouldBlock => Self::new(ErrorKind::WouldBlock),
            _ => Self::new(ErrorKind::Io(error)),
        }
    }
}

impl From<Utf8Error> for Error {
    #[inline]
    fn from(error: Utf8Error) -> Self {
        Self::new(ErrorKind::Utf8Error(error))
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::Io(error) => error.fmt(f),
            ErrorKind::Signature(error) => error.fmt(f),
            ErrorKind::ObjectPath(error) => error.fmt(f),
            ErrorKind::Address(error) => error.fmt(f),
            ErrorKind::Utf8Error(error) => error.fmt(f),
            ErrorKind::WouldBlock => write!(f, "Would block"),
            ErrorKind::Truncated => write!(f, "Reader ran out of data"),
            ErrorKind::MissingBus => write!(f, "Missing session bus address"),
            ErrorKind::AuthRejected => write!(f, "Authentication rejected by server"),
            ErrorKind::AuthUnexpected => write!(f, "Unexpected SASL response line"),
            ErrorKind::AuthLineTooLong => write!(f, "SASL line exceeds 512 bytes"),
            ErrorKind::GuidMismatch => {
                write!(f, "Server GUID does not match the GUID in the address")
            }
            ErrorKind::InvalidProtocol => write!(f, "Malformed message frame"),
            ErrorKind::MissingPath => write!(f, "Missing required PATH header"),
            ErrorKind::MissingMember => write!(f, "Missing required MEMBER header"),
            ErrorKind::MissingInterface => write!(f, "Missing required INTERFACE header"),
            ErrorKind::MissingReplySerial => write!(f, "Missing required REPLY_SERIAL header"),
            ErrorKind::MissingErrorName => write!(f, "Missing required ERROR_NAME header"),
            ErrorKind::ZeroSerial => write!(f, "Zero serial in message header"),
            ErrorKind::NotNullTerminated => write!(f, "String is not null terminated"),
            ErrorKind::ArrayTooLong(length) => {
                write!(f, "Array of length {length} is too long (max is 67108864)")
            }
            ErrorKind::BodyTooLong(length) => {
                write!(f, "Body of length {length} is too long (max is 134217728)")
            }
            ErrorKind::MissingFds { expected, found } => {
                write!(
                    f,
                    "Message declares {expected} file descriptors but {found} arrived"
                )
            }
            ErrorKind::BadFdIndex(index) => {
                write!(f, "File descriptor index {index} out of range")
            }
            ErrorKind::UnexpectedReply => {
                write!(f, "Reply serial matched by a non-reply message")
            }
            ErrorKind::Disconnected(None) => write!(f, "Connection is disconnected"),
            ErrorKind::Disconnected(Some(..)) => {
                write!(f, "Connection is disconnected due to an error")
            }
            ErrorKind::Canceled => write!(f, "Connect was canceled"),
            ErrorKind::Dbus { name, message } => match message {
                Some(message) => write!(f, "{name}: {message}"),
                None => write!(f, "{name}"),
            },
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            ErrorKind::Signature(error) => Some(error),
            ErrorKind::ObjectPath(error) => Some(error),
            ErrorKind::Address(error) => Some(error),
            ErrorKind::Utf8Error(error) => Some(error),
            ErrorKind::Disconnected(Some(error)) => Some(error.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    Io(io::Error),
    Signature(SignatureError),
    ObjectPath(ObjectPathError),
    Address(AddressError),
    Utf8Error(Utf8Error),
    WouldBlock,
    Truncated,
    MissingBus,
    AuthRejected,
    AuthUnexpected,
    AuthLineTooLong,
    GuidMismatch,
    InvalidProtocol,
    MissingPath,
    MissingMember,
    MissingInterface,
    MissingReplySerial,
    MissingErrorName,
    ZeroSerial,
    NotNullTerminated,
    BodyTooLong(u32),
    ArrayTooLong(u32),
    MissingFds { expected: u32, found: usize },
    BadFdIndex(u32),
    UnexpectedReply,
    Disconnected(Option<Arc<Error>>),
    Canceled,
    Dbus {
        name: Box<str>,
        message: Option<Box<str>>,
    },
}
