//! Label model shared by rule and alert records.
//!
//! Labels are the filtering key for tenant scoping: a record is visible to a
//! tenant when its label set contains the configured tenant label name with
//! the caller's tenant value. Label sets are kept in upstream order; name
//! uniqueness is a producer-side convention and is not enforced here.

use serde::{Deserialize, Serialize};

/// A single name/value label pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered sequence of labels, serialized transparently as a JSON array
/// of `{name, value}` objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(Vec<Label>);

impl LabelSet {
    pub fn new(labels: Vec<Label>) -> Self {
        Self(labels)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set contains a pair equal to `(name, value)`.
    ///
    /// Scans in order and short-circuits on the first match.
    pub fn has(&self, name: &str, value: &str) -> bool {
        self.0.iter().any(|l| l.name == name && l.value == value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.0.iter()
    }
}

impl From<Vec<Label>> for LabelSet {
    fn from(labels: Vec<Label>) -> Self {
        Self(labels)
    }
}

impl FromIterator<Label> for LabelSet {
    fn from_iter<I: IntoIterator<Item = Label>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
