use std::borrow::Cow;
use std::fmt;

/// Rows whose fields can be looked up by name
pub trait Keyed {
    /// Returns the value of a named field, or `None` if it is absent
    fn field(&self, name: &str) -> Option<Cow<'_, str>>;
}

/// A tuple of field values identifying one row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(Vec<String>);

impl IdentityKey {
    pub fn new(parts: Vec<String>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

/// Declares which fields form the identity key of a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    fields: Vec<String>,
    case_insensitive: bool,
}

impl KeySpec {
    /// Creates a key over the given fields, compared exactly
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            case_insensitive: false,
        }
    }

    /// Compares key values ignoring case and surrounding whitespace
    pub fn case_insensitive(mut self, enabled: bool) -> Self {
        self.case_insensitive = enabled;
        self
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// Derives the identity key of a row
    ///
    /// Absent fields contribute an empty component.
    pub fn key_for<R: Keyed + ?Sized>(&self, row: &R) -> IdentityKey {
        let parts = self
            .fields
            .iter()
            .map(|name| {
                let value = row.field(name).unwrap_or(Cow::Borrowed(""));
                if self.case_insensitive {
                    value.trim().to_lowercase()
                } else {
                    value.into_owned()
                }
            })
            .collect();

        IdentityKey(parts)
    }
}
