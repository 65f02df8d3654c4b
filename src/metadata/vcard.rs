use serde::{Deserialize, Serialize};

/// A creator record inside a description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VCard {
    pub family_name: String,
    pub given_name: String,
    pub email: String,
    pub organization: String,
}

impl VCard {
    pub fn new(given_name: impl Into<String>, family_name: impl Into<String>) -> Self {
        Self {
            given_name: given_name.into(),
            family_name: family_name.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = organization.into();
        self
    }

    /// A card counts once it names somebody; email and organization alone
    /// are not enough.
    pub fn has_content(&self) -> bool {
        !self.family_name.trim().is_empty() || !self.given_name.trim().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_content()
    }

    /// "Given Family", skipping blank parts.
    pub fn display_name(&self) -> String {
        [self.given_name.trim(), self.family_name.trim()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}
