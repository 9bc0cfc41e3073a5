//! # Blocking Module
//!
//! Groups candidate records under cheap derived keys so full pairwise
//! comparison is avoided. Keys narrow candidates; they never decide
//! correctness. Lookup unions all blocks matching a record's own keys, which
//! turns an O(n²) all-pairs comparison into O(n×k) for average block size k.
//!
//! Keys are derived from four independent fields (name, email domain, phone
//! prefix, company), deliberately favoring recall over precision: two
//! records must differ on all four to become mutually invisible.

use crate::model::{
    normalize_company, normalize_email, normalize_name, normalize_phone, ContactId, ContactRecord,
};
use hashbrown::HashMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

const NAME_PREFIX_LEN: usize = 4;
const PHONE_PREFIX_LEN: usize = 6;
const COMPANY_PREFIX_LEN: usize = 5;

/// A short derived string that files a record into a comparison block.
///
/// The single-character namespace keeps keys from different families from
/// colliding (a name prefix never equals an email domain key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockingKey(String);

impl BlockingKey {
    /// The default key assigned to records that yield no derivable key, so
    /// no record is ever permanently unreachable.
    pub fn fallback() -> Self {
        Self("_:unkeyed".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derive every blocking key for a record, deduplicated, in field order.
pub fn blocking_keys(record: &ContactRecord) -> Vec<BlockingKey> {
    let mut seen = FxHashSet::default();
    let mut keys = Vec::new();
    let mut push = |key: String| {
        if seen.insert(key.clone()) {
            keys.push(BlockingKey(key));
        }
    };

    let name = normalize_name(&record.name.full_name());
    if !name.is_empty() {
        let prefix: String = name.chars().take(NAME_PREFIX_LEN).collect();
        push(format!("n:{prefix}"));
    }

    for email in &record.emails {
        let normalized = normalize_email(email);
        if let Some((_, domain)) = normalized.rsplit_once('@') {
            if !domain.is_empty() {
                push(format!("e:{domain}"));
            }
        }
    }

    for phone in &record.phones {
        let digits = normalize_phone(phone);
        if !digits.is_empty() {
            let prefix: String = digits.chars().take(PHONE_PREFIX_LEN).collect();
            push(format!("p:{prefix}"));
        }
    }

    for org in &record.organizations {
        let company = normalize_company(&org.name);
        if !company.is_empty() {
            let prefix: String = company.chars().take(COMPANY_PREFIX_LEN).collect();
            push(format!("c:{prefix}"));
        }
    }

    if keys.is_empty() {
        keys.push(BlockingKey::fallback());
    }
    keys
}

/// A pair of records emitted by the index for comparison.
///
/// Pairs are deduplicated per run and ordered by input position, so each
/// pair is compared exactly once and runs are deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCandidate {
    pub a: ContactId,
    pub b: ContactId,
}

/// Index from blocking key to the records filed under it.
///
/// Input order is preserved and defines candidate ordering everywhere
/// downstream, including the documented best-match tie-break.
#[derive(Debug, Clone, Default)]
pub struct BlockingIndex {
    records: Vec<ContactRecord>,
    buckets: HashMap<BlockingKey, Vec<usize>>,
    positions: HashMap<ContactId, usize>,
}

impl BlockingIndex {
    /// Build the index by filing every record under each of its keys.
    pub fn build(records: &[ContactRecord]) -> Self {
        let mut index = Self {
            records: records.to_vec(),
            buckets: HashMap::new(),
            positions: HashMap::new(),
        };

        for (position, record) in index.records.iter().enumerate() {
            index.positions.insert(record.id.clone(), position);
            for key in blocking_keys(record) {
                index.buckets.entry(key).or_default().push(position);
            }
        }
        index
    }

    /// Number of indexed records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All indexed records in input order
    pub fn records(&self) -> &[ContactRecord] {
        &self.records
    }

    /// Look up an indexed record by id
    pub fn get(&self, id: &ContactId) -> Option<&ContactRecord> {
        self.positions.get(id).map(|&position| &self.records[position])
    }

    /// Union of all blocks matching the query record's own keys,
    /// deduplicated, excluding the query record itself, in input order.
    pub fn candidates(&self, record: &ContactRecord) -> Vec<&ContactRecord> {
        let mut seen = FxHashSet::default();
        let mut positions = Vec::new();

        for key in blocking_keys(record) {
            let Some(bucket) = self.buckets.get(&key) else {
                continue;
            };
            for &position in bucket {
                if self.records[position].id != record.id && seen.insert(position) {
                    positions.push(position);
                }
            }
        }

        positions.sort_unstable();
        positions
            .into_iter()
            .map(|position| &self.records[position])
            .collect()
    }

    /// Every pair of records sharing at least one blocking key, each
    /// unordered pair emitted once, ordered by input position.
    pub fn candidate_pairs(&self) -> Vec<MatchCandidate> {
        let mut seen: FxHashSet<(usize, usize)> = FxHashSet::default();
        let mut pairs = Vec::new();

        for bucket in self.buckets.values() {
            for i in 0..bucket.len() {
                for j in (i + 1)..bucket.len() {
                    let low = bucket[i].min(bucket[j]);
                    let high = bucket[i].max(bucket[j]);
                    if low != high && seen.insert((low, high)) {
                        pairs.push((low, high));
                    }
                }
            }
        }

        pairs.sort_unstable();
        pairs
            .into_iter()
            .map(|(low, high)| MatchCandidate {
                a: self.records[low].id.clone(),
                b: self.records[high].id.clone(),
            })
            .collect()
    }

    /// Resolve a candidate pair back to its records.
    pub fn pair_records(&self, candidate: &MatchCandidate) -> Option<(&ContactRecord, &ContactRecord)> {
        Some((self.get(&candidate.a)?, self.get(&candidate.b)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Organization, PersonName};

    fn record(id: &str, given: &str, family: &str) -> ContactRecord {
        ContactRecord::new(id, PersonName::new(given, family))
    }

    #[test]
    fn test_keys_cover_all_four_families() {
        let contact = record("c1", "John", "Smith")
            .with_email("john@example.com")
            .with_phone("555-123-4567")
            .with_organization(Organization::new("Acme Corp"));

        let keys: Vec<String> = blocking_keys(&contact)
            .iter()
            .map(|key| key.as_str().to_string())
            .collect();
        assert_eq!(keys, vec!["n:john", "e:example.com", "p:555123", "c:acme"]);
    }

    #[test]
    fn test_record_without_keys_gets_fallback() {
        let contact = ContactRecord::new("c1", PersonName::default());
        let keys = blocking_keys(&contact);
        assert_eq!(keys, vec![BlockingKey::fallback()]);
    }

    #[test]
    fn test_fallback_records_remain_reachable() {
        let a = ContactRecord::new("a", PersonName::default());
        let b = ContactRecord::new("b", PersonName::default());
        let index = BlockingIndex::build(&[a, b]);

        let pairs = index.candidate_pairs();
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_disjoint_records_are_never_paired() {
        let a = record("a", "Alice", "Wonder")
            .with_email("alice@foo.com")
            .with_phone("111-222-3333")
            .with_organization(Organization::new("Foo Industries"));
        let b = record("b", "Bob", "Builder")
            .with_email("bob@bar.com")
            .with_phone("999-888-7777")
            .with_organization(Organization::new("Bar Ltd"));

        let index = BlockingIndex::build(&[a, b]);
        assert!(index.candidate_pairs().is_empty());
    }

    #[test]
    fn test_candidates_union_is_deduplicated() {
        // Shares both the email domain and the phone prefix with the query;
        // must still appear once.
        let query = record("q", "John", "Smith")
            .with_email("john@example.com")
            .with_phone("555-123-0000");
        let near = record("x", "Johanna", "Smythe")
            .with_email("johanna@example.com")
            .with_phone("555-123-9999");
        let far = record("y", "Bob", "Builder").with_email("bob@other.org");

        let index = BlockingIndex::build(&[query.clone(), near, far]);
        let candidates = index.candidates(&query);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, ContactId::from("x"));
    }

    #[test]
    fn test_candidate_pairs_are_input_ordered() {
        let records = vec![
            record("r0", "John", "Smith").with_email("a@x.com"),
            record("r1", "John", "Smythe").with_email("b@x.com"),
            record("r2", "Johnny", "Smith").with_email("c@x.com"),
        ];
        let index = BlockingIndex::build(&records);

        let pairs = index.candidate_pairs();
        let ids: Vec<(String, String)> = pairs
            .iter()
            .map(|pair| (pair.a.to_string(), pair.b.to_string()))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("r0".to_string(), "r1".to_string()),
                ("r0".to_string(), "r2".to_string()),
                ("r1".to_string(), "r2".to_string()),
            ]
        );
    }
}
