//! Counter key generation.

/// Separator between the type and subject parts of a counter key.
///
/// Type names may not contain it, so the first occurrence always ends the
/// type part and keys for distinct (subject, type) pairs never collide.
pub const KEY_SEPARATOR: char = ':';

/// A key that uniquely identifies one quota in the counter store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// The normalised notification type
    pub type_name: String,
    /// The recipient the quota belongs to
    pub subject: String,
}

impl CounterKey {
    /// Create a counter key from a subject and notification type.
    pub fn new(subject: &str, type_name: &str) -> Self {
        Self {
            type_name: type_name.to_lowercase(),
            subject: subject.to_string(),
        }
    }

    /// Store key with the given namespace prefix.
    ///
    /// Format: "{prefix}{type}:{subject}"
    pub fn to_store_key(&self, prefix: &str) -> String {
        format!(
            "{}{}{}{}",
            prefix, self.type_name, KEY_SEPARATOR, self.subject
        )
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.type_name, KEY_SEPARATOR, self.subject)
    }
}
