//! # Contact Data Model
//!
//! Core data structures for contact reconciliation. Records are treated as
//! immutable at comparison time; merge planning produces a new record rather
//! than mutating either input.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a contact record, assigned by the record source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactId(pub String);

impl ContactId {
    /// Create a new contact ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContactId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ContactId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Structured name parts of a contact.
///
/// `display` is the preferred rendering and may be empty, in which case
/// [`PersonName::full_name`] falls back to joining the given and family
/// names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub given: String,
    pub family: String,
    pub display: String,
}

impl PersonName {
    /// Create a name from given and family parts
    pub fn new(given: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            given: given.into(),
            family: family.into(),
            display: String::new(),
        }
    }

    /// The full name used for comparison and display.
    pub fn full_name(&self) -> String {
        let display = self.display.trim();
        if !display.is_empty() {
            return display.to_string();
        }
        let joined = format!("{} {}", self.given.trim(), self.family.trim());
        joined.trim().to_string()
    }

    /// Whether no part of the name carries a value
    pub fn is_blank(&self) -> bool {
        self.full_name().is_empty()
    }
}

/// An employment or affiliation entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    pub title: String,
}

impl Organization {
    /// Create an organization entry by name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: String::new(),
        }
    }

    /// Set the title held at this organization
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// A postal address. Street and city form the equivalence key used when
/// merging; the remaining fields are carried verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub street: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
}

impl PostalAddress {
    /// Create an address from its street and city parts
    pub fn new(street: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            street: street.into(),
            city: city.into(),
            region: String::new(),
            postal_code: String::new(),
            country: String::new(),
        }
    }
}

/// A contact record as handed over by the record source.
///
/// Multi-valued fields preserve source order; normalization for comparison
/// happens on the fly and never rewrites the stored spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: ContactId,
    pub name: PersonName,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub organizations: Vec<Organization>,
    pub addresses: Vec<PostalAddress>,
    pub notes: String,
    pub urls: Vec<String>,
}

impl ContactRecord {
    /// Create a record with the given identity and name; all other fields
    /// start empty.
    pub fn new(id: impl Into<ContactId>, name: PersonName) -> Self {
        Self {
            id: id.into(),
            name,
            emails: Vec::new(),
            phones: Vec::new(),
            organizations: Vec::new(),
            addresses: Vec::new(),
            notes: String::new(),
            urls: Vec::new(),
        }
    }

    /// Add an email address
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.emails.push(email.into());
        self
    }

    /// Add a phone number
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phones.push(phone.into());
        self
    }

    /// Add an organization entry
    pub fn with_organization(mut self, organization: Organization) -> Self {
        self.organizations.push(organization);
        self
    }

    /// Add a postal address
    pub fn with_address(mut self, address: PostalAddress) -> Self {
        self.addresses.push(address);
        self
    }

    /// Set the notes field
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Add a URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    /// Email addresses normalized for comparison, empty entries dropped
    pub fn normalized_emails(&self) -> Vec<String> {
        self.emails
            .iter()
            .map(|email| normalize_email(email))
            .filter(|email| !email.is_empty())
            .collect()
    }

    /// Phone numbers reduced to digits, empty entries dropped
    pub fn normalized_phones(&self) -> Vec<String> {
        self.phones
            .iter()
            .map(|phone| normalize_phone(phone))
            .filter(|phone| !phone.is_empty())
            .collect()
    }

    /// Organization names normalized for comparison, empty entries dropped
    pub fn normalized_companies(&self) -> Vec<String> {
        self.organizations
            .iter()
            .map(|org| normalize_company(&org.name))
            .filter(|name| !name.is_empty())
            .collect()
    }
}

/// Normalize an email address for comparison: trimmed and lower-cased.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalize a phone number for comparison: digits only.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalize a name for comparison: lower-cased alphanumeric words joined by
/// single spaces.
pub fn normalize_name(raw: &str) -> String {
    raw.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a company name for comparison.
pub fn normalize_company(raw: &str) -> String {
    normalize_name(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_prefers_display() {
        let mut name = PersonName::new("John", "Smith");
        assert_eq!(name.full_name(), "John Smith");

        name.display = "Johnny S.".to_string();
        assert_eq!(name.full_name(), "Johnny S.");
    }

    #[test]
    fn test_full_name_handles_partial_parts() {
        let name = PersonName::new("", "Smith");
        assert_eq!(name.full_name(), "Smith");

        let blank = PersonName::default();
        assert!(blank.is_blank());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  John@Example.COM "), "john@example.com");
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+1 (555) 123-4567"), "15551234567");
        assert_eq!(normalize_phone("ext."), "");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  O'Brien,   Mary-Jane "), "o brien mary jane");
        assert_eq!(normalize_name("..."), "");
    }

    #[test]
    fn test_normalized_accessors_drop_empty_entries() {
        let record = ContactRecord::new("c1", PersonName::new("John", "Smith"))
            .with_email("John@X.com")
            .with_email("   ")
            .with_phone("555-1234")
            .with_phone("n/a");

        assert_eq!(record.normalized_emails(), vec!["john@x.com".to_string()]);
        assert_eq!(record.normalized_phones(), vec!["5551234".to_string()]);
    }
}
