//! Subject: the product being analyzed.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{PcfError, Result};

/// Identity of a subject within a batch (its row position in the input table)
///
/// Prevents accidental mixing of row indices with other counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(usize);

impl SubjectId {
    pub const fn new(row: usize) -> Self {
        Self(row)
    }

    pub const fn row(self) -> usize {
        self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.0)
    }
}

/// Product name with optional free-text description
///
/// Immutable once constructed; the name is guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    name: String,
    description: String,
}

impl Subject {
    /// Create a subject, rejecting blank names
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(PcfError::InvalidSubject(
                "subject name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name,
            description: description.into().trim().to_string(),
        })
    }

    /// Create a subject without a description
    pub fn named(name: impl Into<String>) -> Result<Self> {
        Self::new(name, "")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn has_description(&self) -> bool {
        !self.description.is_empty()
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_trims_fields() {
        let subject = Subject::new("  Steel Chair ", " 4 legs\n").unwrap();
        assert_eq!(subject.name(), "Steel Chair");
        assert_eq!(subject.description(), "4 legs");
        assert!(subject.has_description());
    }

    #[test]
    fn test_subject_rejects_blank_name() {
        assert!(matches!(
            Subject::named("   "),
            Err(PcfError::InvalidSubject(_))
        ));
    }

    #[test]
    fn test_subject_id_display() {
        assert_eq!(SubjectId::new(7).to_string(), "row 7");
        assert_eq!(SubjectId::new(7).row(), 7);
    }
}
