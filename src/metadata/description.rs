use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VCard;
use crate::paths;

/// Provenance record attached to an entry (or to the archive, `about == "."`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    /// Location of the described entry.
    pub about: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub creators: Vec<VCard>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub modified: Vec<DateTime<Utc>>,
}

impl Default for Description {
    fn default() -> Self {
        Self {
            about: String::new(),
            description: String::new(),
            creators: Vec::new(),
            created: Utc::now(),
            modified: Vec::new(),
        }
    }
}

impl Description {
    pub fn new(about: impl Into<String>) -> Self {
        Self {
            about: about.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn with_creator(mut self, creator: VCard) -> Self {
        self.creators.push(creator);
        self
    }

    /// Empty unless it has description text AND a first creator with a name.
    ///
    /// Empty descriptions are not attached when adding entries.
    pub fn is_empty(&self) -> bool {
        if self.description.trim().is_empty() {
            return true;
        }
        match self.creators.first() {
            Some(first) => first.is_empty(),
            None => true,
        }
    }

    /// Check if this record describes `location`.
    pub fn describes(&self, location: &str) -> bool {
        paths::locations_equal(&self.about, location)
    }

    /// Most recent modification, if any.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.modified.iter().max().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_is_empty() {
        let creator = VCard::new("Frank", "Bergmann");

        assert!(Description::new(".").is_empty());
        assert!(Description::new(".").with_description("text").is_empty());
        assert!(Description::new(".").with_creator(creator.clone()).is_empty());
        assert!(Description::new(".")
            .with_description("text")
            .with_creator(VCard::default().with_email("a@b.c"))
            .with_creator(creator.clone())
            .is_empty());
        assert!(!Description::new(".")
            .with_description("text")
            .with_creator(creator)
            .is_empty());
    }

    #[test]
    fn test_describes_ignores_dot_slash() {
        let desc = Description::new("./BorisEJB.xml");
        assert!(desc.describes("BorisEJB.xml"));
        assert!(!desc.describes("./other.xml"));
        assert!(Description::new(".").describes("."));
    }

    #[test]
    fn test_last_modified() {
        let mut desc = Description::new(".");
        assert_eq!(desc.last_modified(), None);
        let early = Utc.with_ymd_and_hms(2013, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2014, 1, 1, 0, 0, 0).unwrap();
        desc.modified = vec![late, early];
        assert_eq!(desc.last_modified(), Some(late));
    }
}
