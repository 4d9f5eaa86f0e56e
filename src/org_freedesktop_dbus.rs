//! Names associated with the `org.freedesktop.DBus` interface of a message
//! bus.

use crate::ObjectPath;

/// Well known destination name of the bus daemon.
pub const DESTINATION: &str = "org.freedesktop.DBus";

/// Well known interface name of the bus daemon.
pub const INTERFACE: &str = "org.freedesktop.DBus";

/// Well known object path of the bus daemon.
pub const PATH: &ObjectPath = ObjectPath::new_const(b"/org/freedesktop/DBus");

/// The method which registers a connection and assigns its unique name.
pub const HELLO: &str = "Hello";

/// The method which subscribes a match rule.
pub const ADD_MATCH: &str = "AddMatch";

/// The method which removes a previously subscribed match rule.
pub const REMOVE_MATCH: &str = "RemoveMatch";

/// Error returned when a method does not exist on the destination.
pub const ERROR_UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";

/// Error returned when the destination name has no owner.
pub const ERROR_NAME_HAS_NO_OWNER: &str = "org.freedesktop.DBus.Error.NameHasNoOwner";

/// Generic failure error name.
pub const ERROR_FAILED: &str = "org.freedesktop.DBus.Error.Failed";
