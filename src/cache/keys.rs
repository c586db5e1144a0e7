//! Query key definitions.
//!
//! A [`QueryKey`] is an ordered tuple of primitive parts. The first part names the
//! resource family the query belongs to, so `["users", 2, 5, "", "ALL"]` is one page of
//! the `users` family. Family membership is what mutations invalidate by.

use std::fmt;

/// One primitive component of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Null => f.write_str("null"),
            KeyPart::Bool(value) => write!(f, "{value}"),
            KeyPart::Int(value) => write!(f, "{value}"),
            KeyPart::Str(value) => write!(f, "{value:?}"),
        }
    }
}

/// Identifies the result set of one query.
///
/// Two keys are equal iff every component compares equal, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    parts: Vec<KeyPart>,
}

impl QueryKey {
    /// Start a key for the given resource family.
    pub fn resource(name: impl Into<String>) -> Self {
        Self {
            parts: vec![KeyPart::Str(name.into())],
        }
    }

    /// Build a key from raw parts.
    pub fn from_parts(parts: Vec<KeyPart>) -> Self {
        Self { parts }
    }

    /// Append a component.
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.parts.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// The resource family name, if the first component is a string.
    pub fn resource_name(&self) -> Option<&str> {
        match self.parts.first() {
            Some(KeyPart::Str(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Whether this key belongs to the given resource family.
    pub fn is_resource(&self, name: &str) -> bool {
        self.resource_name() == Some(name)
    }

    /// Whether `prefix` matches the leading components of this key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.parts.starts_with(&prefix.parts)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, part) in self.parts.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str("]")
    }
}

/// Predicate matching every key of a resource family.
pub fn resource_family(name: &str) -> impl Fn(&QueryKey) -> bool + '_ {
    move |key| key.is_resource(name)
}
