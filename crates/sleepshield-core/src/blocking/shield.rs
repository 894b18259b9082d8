//! Blocked selection and applied enforcement settings.
//!
//! Tokens are opaque strings handed out by the platform picker; the core
//! never interprets them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// What the user chose to block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySelection {
    #[serde(default)]
    pub applications: BTreeSet<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub web_domains: BTreeSet<String>,
}

impl ActivitySelection {
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty() && self.categories.is_empty() && self.web_domains.is_empty()
    }

    /// Total number of tokens across all kinds.
    pub fn len(&self) -> usize {
        self.applications.len() + self.categories.len() + self.web_domains.len()
    }
}

/// Enforcement currently applied by the shield.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldSettings {
    #[serde(default)]
    pub applications: BTreeSet<String>,
    #[serde(default)]
    pub application_categories: BTreeSet<String>,
    #[serde(default)]
    pub web_domains: BTreeSet<String>,
    #[serde(default)]
    pub web_domain_categories: BTreeSet<String>,
}

impl ShieldSettings {
    /// Settings that enforce `selection`. Categories block both apps and web domains.
    pub fn from_selection(selection: &ActivitySelection) -> Self {
        Self {
            applications: selection.applications.clone(),
            application_categories: selection.categories.clone(),
            web_domains: selection.web_domains.clone(),
            web_domain_categories: selection.categories.clone(),
        }
    }

    /// True when any blocked set is non-empty.
    pub fn is_enforcing(&self) -> bool {
        !self.applications.is_empty()
            || !self.application_categories.is_empty()
            || !self.web_domains.is_empty()
            || !self.web_domain_categories.is_empty()
    }
}
