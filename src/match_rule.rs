//! Match rules for subscribing to messages.

use std::fmt;

use crate::proto::MessageType;
use crate::{Message, ObjectPath, OwnedObjectPath};

/// A match rule, filtering messages by their headers and first argument.
///
/// A rule serializes to the canonical server-side string form passed to
/// `AddMatch` and compiles to an in-process predicate which the connection
/// evaluates against every inbound message.
///
/// # Examples
///
/// ```
/// use wirebus::{MatchRule, MessageType};
///
/// let rule = MatchRule::new()
///     .with_message_type(MessageType::SIGNAL)
///     .with_interface("org.freedesktop.DBus")
///     .with_member("NameOwnerChanged");
///
/// assert_eq!(
///     rule.to_rule_string(),
///     "type='signal',interface='org.freedesktop.DBus',member='NameOwnerChanged'",
/// );
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MatchRule {
    message_type: Option<MessageType>,
    sender: Option<Box<str>>,
    interface: Option<Box<str>>,
    member: Option<Box<str>>,
    path: Option<OwnedObjectPath>,
    path_namespace: Option<OwnedObjectPath>,
    destination: Option<Box<str>>,
    arg0: Option<Box<str>>,
    arg0_path: Option<Box<str>>,
    arg0_namespace: Option<Box<str>>,
}

impl MatchRule {
    /// Construct an empty rule which matches every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match on the message type.
    pub fn with_message_type(self, message_type: MessageType) -> Self {
        Self {
            message_type: Some(message_type),
            ..self
        }
    }

    /// Match on the sender of the message.
    pub fn with_sender(self, sender: &str) -> Self {
        Self {
            sender: Some(sender.into()),
            ..self
        }
    }

    /// Match on the interface of the message.
    pub fn with_interface(self, interface: &str) -> Self {
        Self {
            interface: Some(interface.into()),
            ..self
        }
    }

    /// Match on the member of the message.
    pub fn with_member(self, member: &str) -> Self {
        Self {
            member: Some(member.into()),
            ..self
        }
    }

    /// Match on the exact path of the message.
    pub fn with_path(self, path: &ObjectPath) -> Self {
        Self {
            path: Some(path.to_owned()),
            ..self
        }
    }

    /// Match messages whose path equals the given path or is nested below
    /// it.
    pub fn with_path_namespace(self, path_namespace: &ObjectPath) -> Self {
        Self {
            path_namespace: Some(path_namespace.to_owned()),
            ..self
        }
    }

    /// Match on the destination of the message.
    pub fn with_destination(self, destination: &str) -> Self {
        Self {
            destination: Some(destination.into()),
            ..self
        }
    }

    /// Match messages whose first argument is the given string.
    pub fn with_arg0(self, arg0: &str) -> Self {
        Self {
            arg0: Some(arg0.into()),
            ..self
        }
    }

    /// Match messages whose first argument is an object path related to the
    /// given path by prefixing, in either direction.
    pub fn with_arg0_path(self, arg0_path: &str) -> Self {
        Self {
            arg0_path: Some(arg0_path.into()),
            ..self
        }
    }

    /// Match messages whose first argument is a name inside the given
    /// dot-separated namespace.
    pub fn with_arg0_namespace(self, arg0_namespace: &str) -> Self {
        Self {
            arg0_namespace: Some(arg0_namespace.into()),
            ..self
        }
    }

    /// Serialize the rule to the canonical server-side string form.
    pub fn to_rule_string(&self) -> String {
        let mut out = String::new();

        if let Some(message_type) = self.message_type {
            let name = match message_type {
                MessageType::METHOD_CALL => "method_call",
                MessageType::METHOD_RETURN => "method_return",
                MessageType::ERROR => "error",
                _ => "signal",
            };

            append(&mut out, "type", name);
        }

        if let Some(sender) = &self.sender {
            append(&mut out, "sender", sender);
        }

        if let Some(interface) = &self.interface {
            append(&mut out, "interface", interface);
        }

        if let Some(member) = &self.member {
            append(&mut out, "member", member);
        }

        if let Some(path) = &self.path {
            append(&mut out, "path", path.as_str());
        }

        if let Some(path_namespace) = &self.path_namespace {
            append(&mut out, "path_namespace", path_namespace.as_str());
        }

        if let Some(destination) = &self.destination {
            append(&mut out, "destination", destination);
        }

        if let Some(arg0) = &self.arg0 {
            append(&mut out, "arg0", arg0);
        }

        if let Some(arg0_path) = &self.arg0_path {
            append(&mut out, "arg0path", arg0_path);
        }

        if let Some(arg0_namespace) = &self.arg0_namespace {
            append(&mut out, "arg0namespace", arg0_namespace);
        }

        out
    }

    /// Evaluate the rule against a message.
    pub fn matches(&self, message: &Message<'_>) -> bool {
        if let Some(message_type) = self.message_type {
            if message.message_type() != message_type {
                return false;
            }
        }

        if let Some(sender) = &self.sender {
            if message.sender() != Some(sender.as_ref()) {
                return false;
            }
        }

        if let Some(interface) = &self.interface {
            if message.interface() != Some(interface.as_ref()) {
                return false;
            }
        }

        if let Some(member) = &self.member {
            if message.member() != Some(member.as_ref()) {
                return false;
            }
        }

        if let Some(path) = &self.path {
            if message.path() != Some(path.as_ref()) {
                return false;
            }
        }

        if let Some(path_namespace) = &self.path_namespace {
            let Some(path) = message.path() else {
                return false;
            };

            if !path_in_namespace(path.as_str(), path_namespace.as_str()) {
                return false;
            }
        }

        if let Some(destination) = &self.destination {
            if message.destination() != Some(destination.as_ref()) {
                return false;
            }
        }

        if self.arg0.is_some() || self.arg0_path.is_some() || self.arg0_namespace.is_some() {
            return self.matches_arg0(message);
        }

        true
    }

    /// Evaluate the arg0 forms against the first body argument, which must
    /// be a string or an object path.
    fn matches_arg0(&self, message: &Message<'_>) -> bool {
        let mut body = message.body();

        match message.signature().first_type() {
            Some(crate::proto::Type::STRING) => {
                let Ok(value) = body.read::<str>() else {
                    return false;
                };

                if let Some(arg0) = &self.arg0 {
                    if value != &**arg0 {
                        return false;
                    }
                }

                if let Some(arg0_namespace) = &self.arg0_namespace {
                    if !name_in_namespace(value, arg0_namespace) {
                        return false;
                    }
                }

                self.arg0_path.is_none()
            }
            Some(crate::proto::Type::OBJECT_PATH) => {
                let Ok(value) = body.read::<ObjectPath>() else {
                    return false;
                };

                if let Some(arg0_path) = &self.arg0_path {
                    if !paths_related(value.as_str(), arg0_path) {
                        return false;
                    }
                }

                self.arg0.is_none() && self.arg0_namespace.is_none()
            }
            _ => false,
        }
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rule_string())
    }
}

/// Append `key='value'` with the match-rule quoting convention: values are
/// single quoted, and an apostrophe is emitted as `'\''`.
fn append(out: &mut String, key: &str, value: &str) {
    if !out.is_empty() {
        out.push(',');
    }

    out.push_str(key);
    out.push_str("='");

    for c in value.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }

    out.push('\'');
}

/// A path is in a namespace if it equals it or continues it across a `/`
/// boundary.
fn path_in_namespace(path: &str, namespace: &str) -> bool {
    if namespace == "/" {
        return true;
    }

    match path.strip_prefix(namespace) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// A name is in a namespace if it equals it or continues it across a `.`
/// boundary.
fn name_in_namespace(name: &str, namespace: &str) -> bool {
    match name.strip_prefix(namespace) {
        Some("") => true,
        Some(rest) => rest.starts_with('.'),
        None => false,
    }
}

/// Object paths are related if they are equal, or if either side ends in
/// `/` and is a prefix of the other.
fn paths_related(value: &str, rule: &str) -> bool {
    if value == rule {
        return true;
    }

    if rule.ends_with('/') && value.starts_with(rule) {
        return true;
    }

    value.ends_with('/') && rule.starts_with(value)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use crate::proto::MessageType;
    use crate::{BodyBuf, Flags, Message, MessageKind, ObjectPath, ReadBuf, Signature};

    use super::*;

    fn signal<'a>(
        path: &'a ObjectPath,
        interface: &'a str,
        member: &'a str,
        signature: &'a Signature,
        body: &'a BodyBuf,
    ) -> Message<'a> {
        Message {
            kind: MessageKind::Signal { path, member },
            serial: NonZeroU32::new(1).unwrap(),
            flags: Flags::EMPTY,
            interface: Some(interface),
            destination: None,
            sender: Some(":1.42"),
            signature,
            reply_serial: None,
            body: ReadBuf::from_slice(body.get(), body.endianness()),
        }
    }

    #[test]
    fn rule_string_escaping() {
        let rule = MatchRule::new()
            .with_message_type(MessageType::SIGNAL)
            .with_arg0("it's");

        assert_eq!(rule.to_rule_string(), "type='signal',arg0='it'\\''s'");
    }

    #[test]
    fn header_matching() {
        let body = BodyBuf::new();
        let path = ObjectPath::new_const(b"/org/freedesktop/DBus");
        let message = signal(
            path,
            "org.freedesktop.DBus",
            "NameOwnerChanged",
            Signature::EMPTY,
            &body,
        );

        assert!(MatchRule::new().matches(&message));
        assert!(MatchRule::new()
            .with_message_type(MessageType::SIGNAL)
            .with_interface("org.freedesktop.DBus")
            .with_member("NameOwnerChanged")
            .matches(&message));
        assert!(MatchRule::new().with_sender(":1.42").matches(&message));
        assert!(MatchRule::new().with_path(path).matches(&message));

        assert!(!MatchRule::new()
            .with_message_type(MessageType::METHOD_CALL)
            .matches(&message));
        assert!(!MatchRule::new().with_member("NameLost").matches(&message));
        assert!(!MatchRule::new()
            .with_path(ObjectPath::new_const(b"/org"))
            .matches(&message));
        assert!(!MatchRule::new().with_destination(":1.9").matches(&message));
    }

    #[test]
    fn path_namespace_matching() {
        let body = BodyBuf::new();
        let namespace = ObjectPath::new_const(b"/a/b");

        for (path, expected) in [
            (&b"/a/b"[..], true),
            (b"/a/b/c", true),
            (b"/a/b/c/d", true),
            (b"/a/bc", false),
            (b"/a", false),
        ] {
            let path = ObjectPath::new(path).unwrap();
            let message = signal(path, "test.Iface", "M", Signature::EMPTY, &body);

            assert_eq!(
                MatchRule::new()
                    .with_path_namespace(namespace)
                    .matches(&message),
                expected,
                "{path:?}"
            );
        }

        let message = signal(
            ObjectPath::new_const(b"/anything"),
            "test.Iface",
            "M",
            Signature::EMPTY,
            &body,
        );
        assert!(MatchRule::new()
            .with_path_namespace(ObjectPath::ROOT)
            .matches(&message));
    }

    #[test]
    fn arg0_matching() {
        let mut body = BodyBuf::new();
        body.write("com.example.Name");

        let path = ObjectPath::new_const(b"/");
        let message = signal(path, "test.Iface", "M", Signature::STRING, &body);

        assert!(MatchRule::new()
            .with_arg0("com.example.Name")
            .matches(&message));
        assert!(!MatchRule::new().with_arg0("com.example").matches(&message));

        // A rule with an arg0 form never matches a message without a
        // leading string or object path argument.
        let empty = BodyBuf::new();
        let message = signal(path, "test.Iface", "M", Signature::EMPTY, &empty);
        assert!(!MatchRule::new().with_arg0("x").matches(&message));

        let mut ints = BodyBuf::new();
        ints.store(1u32);
        let message = signal(path, "test.Iface", "M", Signature::UINT32, &ints);
        assert!(!MatchRule::new().with_arg0("x").matches(&message));
    }

    #[test]
    fn arg0_namespace_matching() {
        let path = ObjectPath::new_const(b"/");

        for (value, expected) in [("com.x", true), ("com.x.y", true), ("com.xy", false)] {
            let mut body = BodyBuf::new();
            body.write(value);
            let message = signal(path, "test.Iface", "M", Signature::STRING, &body);

            assert_eq!(
                MatchRule::new()
                    .with_arg0_namespace("com.x")
                    .matches(&message),
                expected,
                "{value}"
            );
        }
    }

    #[test]
    fn arg0_path_matching() {
        let path = ObjectPath::new_const(b"/");

        // Object paths on the wire cannot end in `/` (except the root), so
        // the prefix-in-either-direction rule is exercised on the string
        // forms directly.
        assert!(paths_related("/a/b/", "/a/b/"));
        assert!(paths_related("/a/b/c", "/a/b/"));
        assert!(!paths_related("/a/b", "/a/b/"));
        assert!(paths_related("/a/b/", "/a/b/c"));
        assert!(paths_related("/a/b", "/a/b"));
        assert!(!paths_related("/a/bc", "/a/b/"));

        let mut body = BodyBuf::new();
        body.write(ObjectPath::new_const(b"/a/b/c"));
        let message = signal(path, "test.Iface", "M", Signature::OBJECT_PATH, &body);

        assert!(MatchRule::new().with_arg0_path("/a/b/").matches(&message));
        assert!(!MatchRule::new().with_arg0_path("/a/x/").matches(&message));

        // arg0 forms for the wrong argument type never match.
        assert!(!MatchRule::new().with_arg0("/a/b/c").matches(&message));
    }
}
