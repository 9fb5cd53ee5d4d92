//! resolved field values for a single attempt, plus their canonical fingerprint
use std::fmt::{self, Display, Formatter};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// where a resolved field is placed in the outgoing request
///
/// derived once at parse time from a `header:` / `cookie:` name prefix;
/// request construction routes on this tag and never re-examines the name
#[derive(Serialize, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[non_exhaustive]
pub enum FieldTarget {
    /// request body for body-bearing methods, query string otherwise
    #[default]
    Body,

    /// an http header, keyed by the prefix-stripped name
    Header,

    /// a cookie, keyed by the prefix-stripped name
    Cookie,
}

/// a single resolved `name=value` entry within a [`Payload`]
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct PayloadField {
    /// the field's full declared name, prefix included; used for reporting
    /// and fingerprinting
    pub name: String,

    /// where the field is placed in the request
    pub target: FieldTarget,

    /// the prefix-stripped key used on the wire
    pub key: String,

    /// the candidate value for this attempt
    pub value: String,

    /// true for counter-fed fields, whose value tracks the attempt id
    pub counter: bool,
}

impl PayloadField {
    /// create a new `PayloadField`, deriving `target` and `key` from the
    /// given full name
    #[must_use]
    pub fn new(name: &str, value: &str) -> Self {
        let (target, key) = match name.split_once(':') {
            Some(("header", stripped)) => (FieldTarget::Header, stripped),
            Some(("cookie", stripped)) => (FieldTarget::Cookie, stripped),
            _ => (FieldTarget::Body, name),
        };

        Self {
            name: name.to_string(),
            target,
            key: key.to_string(),
            value: value.to_string(),
            counter: false,
        }
    }

    /// mark this field as counter-fed
    #[must_use]
    pub fn counter(mut self) -> Self {
        self.counter = true;
        self
    }
}

/// the full field-name-to-value mapping sent in one attempt
///
/// field order is the resolution order: constants, then zip assignments, then
/// product assignments, then counter-fed fields
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Payload {
    fields: Vec<PayloadField>,
}

impl Payload {
    /// create a new `Payload` from resolved fields
    #[must_use]
    pub fn new(fields: Vec<PayloadField>) -> Self {
        Self { fields }
    }

    /// get a reference to the resolved fields, in resolution order
    #[must_use]
    pub fn fields(&self) -> &[PayloadField] {
        &self.fields
    }

    /// iterate over the fields routed to the given target
    pub fn fields_for(&self, target: FieldTarget) -> impl Iterator<Item = &PayloadField> {
        self.fields.iter().filter(move |field| field.target == target)
    }

    /// canonical serialization of this payload, used as the retry-tracking key
    ///
    /// full names are sorted so the fingerprint is independent of declaration
    /// order; counter-fed fields are excluded because their value tracks the
    /// attempt id rather than the combination being tried
    ///
    /// # Examples
    ///
    /// ```
    /// # use siegeline::payload::{Payload, PayloadField};
    /// let first = Payload::new(vec![
    ///     PayloadField::new("user", "admin"),
    ///     PayloadField::new("pass", "hunter2"),
    /// ]);
    /// let second = Payload::new(vec![
    ///     PayloadField::new("pass", "hunter2"),
    ///     PayloadField::new("user", "admin"),
    /// ]);
    ///
    /// assert_eq!(first.fingerprint(), second.fingerprint());
    /// ```
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut pairs: Vec<String> = self
            .fields
            .iter()
            .filter(|field| !field.counter)
            .map(|field| format!("{}={}", field.name, field.value))
            .collect();

        pairs.sort_unstable();

        pairs.join("\u{1f}")
    }
}

/// serializes as a flat `name: value` map, which is the shape the result
/// sink records and the operator expects to read back
impl Serialize for Payload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;

        for field in &self.fields {
            map.serialize_entry(&field.name, &field.value)?;
        }

        map.end()
    }
}

impl Display for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;

        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", field.name, field.value)?;
        }

        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_field_resolves_targets_from_prefixes() {
        let body = PayloadField::new("username", "admin");
        assert_eq!(body.target, FieldTarget::Body);
        assert_eq!(body.key, "username");

        let header = PayloadField::new("header:X-Api-Key", "abc123");
        assert_eq!(header.target, FieldTarget::Header);
        assert_eq!(header.key, "X-Api-Key");
        assert_eq!(header.name, "header:X-Api-Key");

        let cookie = PayloadField::new("cookie:session_id", "deadbeef");
        assert_eq!(cookie.target, FieldTarget::Cookie);
        assert_eq!(cookie.key, "session_id");
    }

    #[test]
    fn unknown_prefixes_are_left_alone() {
        // only header:/cookie: are routing prefixes; anything else is a body
        // field whose name simply contains a colon
        let field = PayloadField::new("x:weird", "value");
        assert_eq!(field.target, FieldTarget::Body);
        assert_eq!(field.key, "x:weird");
    }

    #[test]
    fn fingerprint_is_declaration_order_independent() {
        let first = Payload::new(vec![
            PayloadField::new("user", "a"),
            PayloadField::new("header:X-Key", "k"),
        ]);
        let second = Payload::new(vec![
            PayloadField::new("header:X-Key", "k"),
            PayloadField::new("user", "a"),
        ]);

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_counter_fields() {
        let first = Payload::new(vec![
            PayloadField::new("user", "a"),
            PayloadField::new("header:X-Request-Id", "1").counter(),
        ]);
        let second = Payload::new(vec![
            PayloadField::new("user", "a"),
            PayloadField::new("header:X-Request-Id", "2").counter(),
        ]);

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_distinguishes_values() {
        let first = Payload::new(vec![PayloadField::new("user", "a")]);
        let second = Payload::new(vec![PayloadField::new("user", "b")]);

        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn payload_serializes_as_a_flat_map() {
        let payload = Payload::new(vec![
            PayloadField::new("user", "admin"),
            PayloadField::new("cookie:session", "deadbeef"),
        ]);

        let json = serde_json::to_string(&payload).unwrap();

        assert_eq!(json, r#"{"user":"admin","cookie:session":"deadbeef"}"#);
    }
}
