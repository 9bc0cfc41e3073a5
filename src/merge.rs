//! # Merge Planner
//!
//! Deterministically combines two matched records into one proposed record,
//! per field group. The plan is pure: it is recomputed for display before a
//! human decision and must be identical to what is later enqueued. The
//! planner never mutates stored records; its output is only consumed to
//! construct a queue item.

use crate::model::{
    normalize_company, normalize_email, normalize_name, normalize_phone, ContactId,
    ContactRecord, Organization, PersonName, PostalAddress,
};
use rustc_hash::FxHashSet;

/// Produce the merged record for `existing` absorbing `incoming`.
///
/// The merged record keeps the existing record's id. Applying the plan again
/// with the same incoming record is a no-op:
/// `plan(&plan(a, b), b) == plan(a, b)`.
pub fn plan(existing: &ContactRecord, incoming: &ContactRecord) -> ContactRecord {
    ContactRecord {
        id: existing.id.clone(),
        name: plan_name(&existing.name, &incoming.name),
        emails: union_by(&existing.emails, &incoming.emails, |email| {
            normalize_email(email)
        }),
        phones: union_by(&existing.phones, &incoming.phones, |phone| {
            normalize_phone(phone)
        }),
        organizations: plan_organizations(existing, incoming),
        addresses: plan_addresses(existing, incoming),
        notes: plan_notes(existing, incoming),
        urls: union_by(&existing.urls, &incoming.urls, |url| {
            url.trim().to_string()
        }),
    }
}

/// Incoming fills only blank parts; existing wins on conflict.
fn plan_name(existing: &PersonName, incoming: &PersonName) -> PersonName {
    PersonName {
        given: fill(&existing.given, &incoming.given),
        family: fill(&existing.family, &incoming.family),
        display: fill(&existing.display, &incoming.display),
    }
}

fn fill(existing: &str, incoming: &str) -> String {
    if existing.trim().is_empty() {
        incoming.trim().to_string()
    } else {
        existing.to_string()
    }
}

/// Union of two value lists keyed by a normalization function.
///
/// Existing entries come first, so their spelling wins; entries whose key
/// normalizes to empty are dropped as carrying no value.
fn union_by(
    existing: &[String],
    incoming: &[String],
    key: impl Fn(&str) -> String,
) -> Vec<String> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut merged = Vec::with_capacity(existing.len() + incoming.len());

    for value in existing.iter().chain(incoming) {
        let normalized = key(value);
        if normalized.is_empty() {
            continue;
        }
        if seen.insert(normalized) {
            merged.push(value.clone());
        }
    }
    merged
}

/// Append incoming organizations unless a name-equal entry already exists.
/// Legitimate multiples (different names) are preserved.
fn plan_organizations(existing: &ContactRecord, incoming: &ContactRecord) -> Vec<Organization> {
    let mut merged = existing.organizations.clone();
    let mut names: FxHashSet<String> = existing
        .organizations
        .iter()
        .map(|org| normalize_company(&org.name))
        .collect();

    for org in &incoming.organizations {
        let name = normalize_company(&org.name);
        if name.is_empty() {
            continue;
        }
        if names.insert(name) {
            merged.push(org.clone());
        }
    }
    merged
}

/// Append incoming addresses unless a street+city-equal entry already
/// exists.
fn plan_addresses(existing: &ContactRecord, incoming: &ContactRecord) -> Vec<PostalAddress> {
    let mut merged = existing.addresses.clone();
    let mut keys: FxHashSet<(String, String)> = existing
        .addresses
        .iter()
        .map(|address| address_key(address))
        .collect();

    for address in &incoming.addresses {
        let key = address_key(address);
        if key.0.is_empty() && key.1.is_empty() {
            continue;
        }
        if keys.insert(key) {
            merged.push(address.clone());
        }
    }
    merged
}

fn address_key(address: &PostalAddress) -> (String, String) {
    (
        normalize_name(&address.street),
        normalize_name(&address.city),
    )
}

/// Concatenate incoming notes under a provenance marker, never overwriting.
/// Notes already present are not appended again.
fn plan_notes(existing: &ContactRecord, incoming: &ContactRecord) -> String {
    let incoming_notes = incoming.notes.trim();
    if incoming_notes.is_empty() || existing.notes.contains(incoming_notes) {
        return existing.notes.clone();
    }
    if existing.notes.trim().is_empty() {
        return incoming_notes.to_string();
    }
    format!(
        "{}\n{}\n{}",
        existing.notes.trim_end(),
        provenance_marker(&incoming.id),
        incoming_notes
    )
}

fn provenance_marker(source: &ContactId) -> String {
    format!("--- merged from {source} ---")
}
