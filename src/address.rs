//! Parsing of D-Bus server address strings.
//!
//! An address is a `;`-separated list of entries, each of the form
//! `transport:key=value,key=value`. Values are percent-encoded. The entries
//! are tried in order by the connecting client.

use std::error;
use std::fmt;

/// An error raised when parsing a D-Bus address.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum AddressError {
    /// The address list or one of its entries was empty.
    Empty,
    /// The entry does not carry a transport prefix.
    MissingTransport,
    /// The transport is not supported by this crate.
    UnknownTransport(Box<str>),
    /// An entry property was not a `key=value` pair.
    MissingValue,
    /// A percent escape was not two hexadecimal digits.
    BadEscape,
    /// A required key was absent for the transport.
    MissingKey(&'static str),
    /// Mutually exclusive keys were both present.
    ConflictingKeys,
    /// The `port` property was not a 16-bit number.
    BadPort,
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::Empty => write!(f, "Empty address"),
            AddressError::MissingTransport => write!(f, "Address entry without a transport"),
            AddressError::UnknownTransport(transport) => {
                write!(f, "Unsupported transport `{transport}`")
            }
            AddressError::MissingValue => write!(f, "Address property without a value"),
            AddressError::BadEscape => write!(f, "Invalid percent escape in address"),
            AddressError::MissingKey(key) => write!(f, "Missing required key `{key}`"),
            AddressError::ConflictingKeys => write!(f, "Conflicting keys in address entry"),
            AddressError::BadPort => write!(f, "Invalid port in address entry"),
        }
    }
}

impl error::Error for AddressError {}

/// The transport of a parsed [`Address`] entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// A Unix domain stream socket.
    ///
    /// For `abstract=` addresses the path carries the leading NUL byte which
    /// places it in the Linux abstract namespace.
    Unix {
        /// The socket path.
        path: Vec<u8>,
    },
    /// A TCP stream socket.
    Tcp {
        /// The host to connect to.
        host: String,
        /// The port to connect to.
        port: u16,
    },
}

/// One parsed entry of a D-Bus address list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    transport: Transport,
    guid: Option<String>,
}

impl Address {
    /// The transport of the entry.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// The server GUID carried by the entry, compared against the GUID the
    /// server reports during authentication.
    pub fn guid(&self) -> Option<&str> {
        self.guid.as_deref()
    }
}

/// An iterator over the entries of an address list.
///
/// # Examples
///
/// ```
/// use wirebus::{Addresses, Transport};
///
/// let mut addresses = Addresses::new("unix:path=/run/user/1000/bus;tcp:host=localhost,port=7777");
///
/// let first = addresses.next().unwrap()?;
/// assert_eq!(
///     first.transport(),
///     &Transport::Unix { path: b"/run/user/1000/bus".to_vec() },
/// );
///
/// let second = addresses.next().unwrap()?;
/// assert_eq!(
///     second.transport(),
///     &Transport::Tcp { host: "localhost".into(), port: 7777 },
/// );
///
/// assert!(addresses.next().is_none());
/// # Ok::<_, wirebus::AddressError>(())
/// ```
pub struct Addresses<'a> {
    rest: Option<&'a str>,
}

impl<'a> Addresses<'a> {
    /// Construct an iterator over the given address list.
    pub fn new(addresses: &'a str) -> Self {
        Self {
            rest: Some(addresses),
        }
    }
}

impl Iterator for Addresses<'_> {
    type Item = Result<Address, AddressError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest?;

        let (entry, rest) = match rest.split_once(';') {
            Some((entry, rest)) => (entry, Some(rest)),
            None => (rest, None),
        };

        self.rest = rest;
        Some(parse_entry(entry))
    }
}

fn parse_entry(entry: &str) -> Result<Address, AddressError> {
    if entry.is_empty() {
        return Err(AddressError::Empty);
    }

    let Some((transport, properties)) = entry.split_once(':') else {
        return Err(AddressError::MissingTransport);
    };

    let mut path = None;
    let mut abstract_path = None;
    let mut host = None;
    let mut port = None;
    let mut guid = None;

    for property in properties.split(',') {
        if property.is_empty() {
            continue;
        }

        let Some((key, value)) = property.split_once('=') else {
            return Err(AddressError::MissingValue);
        };

        let value = unescape(value)?;

        match key {
            "path" => path = Some(value),
            "abstract" => abstract_path = Some(value),
            "host" => host = Some(value),
            "port" => port = Some(value),
            "guid" => guid = Some(value),
            _ => {
                // Unrecognized properties are ignored for forward
                // compatibility.
            }
        }
    }

    let guid = match guid {
        Some(guid) => Some(String::from_utf8(guid).map_err(|_| AddressError::BadEscape)?),
        None => None,
    };

    let transport = match transport {
        "unix" => match (path, abstract_path) {
            (Some(path), None) => Transport::Unix { path },
            (None, Some(name)) => {
                let mut path = Vec::with_capacity(name.len() + 1);
                path.push(0);
                path.extend_from_slice(&name);
                Transport::Unix { path }
            }
            (Some(..), Some(..)) => return Err(AddressError::ConflictingKeys),
            (None, None) => return Err(AddressError::MissingKey("path")),
        },
        "tcp" => {
            let Some(host) = host else {
                return Err(AddressError::MissingKey("host"));
            };

            let Some(port) = port else {
                return Err(AddressError::MissingKey("port"));
            };

            let host = String::from_utf8(host).map_err(|_| AddressError::BadEscape)?;
            let port = std::str::from_utf8(&port)
                .ok()
                .and_then(|port| port.parse::<u16>().ok())
                .ok_or(AddressError::BadPort)?;

            Transport::Tcp { host, port }
        }
        other => return Err(AddressError::UnknownTransport(other.into())),
    };

    Ok(Address { transport, guid })
}

/// Decode `%XX` percent escapes in an address value.
fn unescape(value: &str) -> Result<Vec<u8>, AddressError> {
    let mut out = Vec::with_capacity(value.len());
    let mut bytes = value.bytes();

    while let Some(b) = bytes.next() {
        if b != b'%' {
            out.push(b);
            continue;
        }

        let (Some(hi), Some(lo)) = (bytes.next(), bytes.next()) else {
            return Err(AddressError::BadEscape);
        };

        let (Some(hi), Some(lo)) = (hex_digit(hi), hex_digit(lo)) else {
            return Err(AddressError::BadEscape);
        };

        out.push(hi << 4 | lo);
    }

    Ok(out)
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(address: &str) -> Address {
        let mut addresses = Addresses::new(address);
        let address = addresses.next().unwrap().unwrap();
        assert!(addresses.next().is_none());
        address
    }

    #[test]
    fn unix_path() {
        let address = one("unix:path=/run/dbus/system_bus_socket");

        assert_eq!(
            address.transport(),
            &Transport::Unix {
                path: b"/run/dbus/system_bus_socket".to_vec(),
            }
        );
        assert_eq!(address.guid(), None);
    }

    #[test]
    fn unix_abstract() {
        let address = one("unix:abstract=/tmp/dbus-HuN2pYwy2D");

        assert_eq!(
            address.transport(),
            &Transport::Unix {
                path: b"\0/tmp/dbus-HuN2pYwy2D".to_vec(),
            }
        );
    }

    #[test]
    fn tcp() {
        let address = one("tcp:host=127.0.0.1,port=12345");

        assert_eq!(
            address.transport(),
            &Transport::Tcp {
                host: "127.0.0.1".into(),
                port: 12345,
            }
        );
    }

    #[test]
    fn guid_property() {
        let address = one("unix:path=/tmp/bus,guid=0123456789abcdef0123456789abcdef");
        assert_eq!(address.guid(), Some("0123456789abcdef0123456789abcdef"));
    }

    #[test]
    fn percent_escapes() {
        let address = one("unix:path=/tmp/with%20space%3bsemicolon");

        assert_eq!(
            address.transport(),
            &Transport::Unix {
                path: b"/tmp/with space;semicolon".to_vec(),
            }
        );
    }

    #[test]
    fn multiple_entries_in_order() {
        let mut addresses =
            Addresses::new("unix:path=/one;unix:abstract=two;tcp:host=localhost,port=1");

        assert!(matches!(
            addresses.next().unwrap().unwrap().transport(),
            Transport::Unix { .. }
        ));
        assert!(matches!(
            addresses.next().unwrap().unwrap().transport(),
            Transport::Unix { .. }
        ));
        assert!(matches!(
            addresses.next().unwrap().unwrap().transport(),
            Transport::Tcp { .. }
        ));
        assert!(addresses.next().is_none());
    }

    #[test]
    fn malformed_entries() {
        assert_eq!(one_err(""), AddressError::Empty);
        assert_eq!(one_err("unix"), AddressError::MissingTransport);
        assert_eq!(one_err("unix:"), AddressError::MissingKey("path"));
        assert_eq!(one_err("unix:path"), AddressError::MissingValue);
        assert_eq!(
            one_err("unix:path=/a,abstract=b"),
            AddressError::ConflictingKeys
        );
        assert_eq!(one_err("tcp:host=x"), AddressError::MissingKey("port"));
        assert_eq!(one_err("tcp:port=1"), AddressError::MissingKey("host"));
        assert_eq!(one_err("tcp:host=x,port=banana"), AddressError::BadPort);
        assert_eq!(one_err("tcp:host=x,port=65536"), AddressError::BadPort);
        assert_eq!(one_err("unix:path=%zz"), AddressError::BadEscape);
        assert_eq!(one_err("unix:path=%f"), AddressError::BadEscape);
        assert!(matches!(
            one_err("launchd:env=DBUS_LAUNCHD_SESSION_BUS_SOCKET"),
            AddressError::UnknownTransport(..)
        ));
    }

    fn one_err(address: &str) -> AddressError {
        Addresses::new(address).next().unwrap().unwrap_err()
    }
}
