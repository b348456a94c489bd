//! Field-scoped validation messages.
//!
//! Both option validation and the verification policy report problems as a
//! list of `(field, message)` pairs. Problems that belong to no single field
//! are recorded against [`BASE`].

use serde::{Serialize, Serializer, ser::SerializeMap};

/// Field name for errors that are not tied to a single field.
pub const BASE: &str = "base";

/// One validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field the message applies to, or [`BASE`].
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl FieldError {
    /// The message prefixed with its field name, except for [`BASE`] errors.
    #[must_use]
    pub fn full_message(&self) -> String {
        if self.field == BASE {
            self.message.clone()
        } else {
            format!("{} {}", self.field, self.message)
        }
    }
}

/// Ordered collection of [`FieldError`]s.
///
/// Serializes as a map of field name to its messages, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message against `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError { field: field.into(), message: message.into() });
    }

    /// Records a message against [`BASE`].
    pub fn add_base(&mut self, message: impl Into<String>) {
        self.add(BASE, message);
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterates over recorded errors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    /// Messages recorded against `field`.
    #[must_use]
    pub fn on(&self, field: &str) -> Vec<&str> {
        self.errors.iter().filter(|e| e.field == field).map(|e| e.message.as_str()).collect()
    }

    /// Distinct fields with at least one message, in first-seen order.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for error in &self.errors {
            if !fields.contains(&error.field.as_str()) {
                fields.push(&error.field);
            }
        }
        fields
    }

    /// Every message, prefixed with its field name.
    #[must_use]
    pub fn full_messages(&self) -> Vec<String> {
        self.errors.iter().map(FieldError::full_message).collect()
    }

    /// Returns `true` if any message, with or without its field prefix, equals `text`.
    #[must_use]
    pub fn contains_message(&self, text: &str) -> bool {
        self.errors.iter().any(|e| e.message == text || e.full_message() == text)
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl Serialize for ValidationErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.fields();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for field in fields {
            map.serialize_entry(field, &self.on(field))?;
        }
        map.end()
    }
}
