//! Listing records before and after deduplication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable identifier for a listing, derived from its title, location and URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derive the identifier for a `(title, location, url)` triple.
    ///
    /// Fields are whitespace-normalized before hashing so that re-scraping the
    /// same listing with different indentation still maps to the same id.
    pub fn derive(title: &str, location: &str, url: &str) -> Self {
        let mut hasher = Sha256::new();
        for (i, field) in [title, location, url].iter().enumerate() {
            if i > 0 {
                // Unit separator keeps ("ab", "c") distinct from ("a", "bc")
                hasher.update([0x1f]);
            }
            hasher.update(normalize_field(field).as_bytes());
        }
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_field(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A listing as returned by the extraction collaborator, before deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub title: String,
    pub location: String,
    pub posted_label: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

impl Candidate {
    pub fn new(
        title: impl Into<String>,
        location: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            location: location.into(),
            posted_label: String::new(),
            url: url.into(),
            description: String::new(),
        }
    }

    pub fn with_posted_label(mut self, label: impl Into<String>) -> Self {
        self.posted_label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn identifier(&self) -> JobId {
        JobId::derive(&self.title, &self.location, &self.url)
    }

    /// Freeze this candidate into a stored record.
    pub fn into_record(self, detected_at: DateTime<Utc>) -> JobRecord {
        JobRecord {
            identifier: self.identifier(),
            title: self.title,
            location: self.location,
            posted_label: self.posted_label,
            url: self.url,
            description: self.description,
            detected_at,
        }
    }
}

/// A deduplicated listing. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub identifier: JobId,
    pub title: String,
    pub location: String,
    pub posted_label: String,
    pub url: String,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_is_deterministic() {
        let a = Candidate::new("Warehouse Associate", "Toronto, ON", "https://example.com/j/1");
        let b = Candidate::new("Warehouse Associate", "Toronto, ON", "https://example.com/j/1")
            .with_description("different text")
            .with_posted_label("yesterday");
        assert_eq!(a.identifier(), b.identifier());
    }

    #[test]
    fn test_identifier_ignores_whitespace_noise() {
        let a = JobId::derive("Warehouse  Associate ", "Toronto, ON", "https://example.com");
        let b = JobId::derive("Warehouse Associate", " Toronto,\nON", "https://example.com");
        assert_eq!(a, b);
    }

    #[test]
    fn test_identifier_separates_fields() {
        let a = JobId::derive("ab", "c", "u");
        let b = JobId::derive("a", "bc", "u");
        assert_ne!(a, b);
    }

    #[test]
    fn test_identifier_shape() {
        let id = JobId::derive("t", "l", "u");
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = Candidate::new("t", "l", "u").into_record(Utc::now());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("postedLabel").is_some());
        assert!(json.get("detectedAt").is_some());
        assert_eq!(json["identifier"], record.identifier.as_str());
    }
}
