//! Deterministic dataset generation shared by integration tests and benches.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::{ContactRecord, Organization, PersonName};

const GIVEN_NAMES: &[&str] = &[
    "John", "Mary", "Ahmed", "Yuki", "Elena", "Carlos", "Priya", "Tom", "Ingrid", "Wei",
];
const FAMILY_NAMES: &[&str] = &[
    "Smith", "Garcia", "Chen", "Patel", "Novak", "Okafor", "Berg", "Rossi", "Kim", "Dubois",
];
const COMPANIES: &[&str] = &[
    "Acme Corp",
    "Globex",
    "Initech",
    "Umbrella Ltd",
    "Stark Industries",
];
const DOMAINS: &[&str] = &[
    "example.com",
    "postbox.org",
    "quickmail.net",
    "bluemail.dev",
    "corpmail.io",
    "homebase.info",
    "fastmsg.co",
    "inboxly.app",
];

/// A generated dataset together with how many near-duplicate records were
/// planted in it.
#[derive(Debug, Clone)]
pub struct GeneratedDataset {
    pub records: Vec<ContactRecord>,
    pub planted_duplicates: usize,
}

/// Generate `count` base contacts; each base contact gains a near-duplicate
/// (same email, slightly different name spelling, extra phone) with the
/// given probability. Seeded, so identical inputs produce identical data.
pub fn generate_contacts(count: u32, duplicate_probability: f64, seed: u64) -> GeneratedDataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(count as usize);
    let mut planted_duplicates = 0;

    for i in 1..=count {
        let given = GIVEN_NAMES[rng.random_range(0..GIVEN_NAMES.len())];
        let family = FAMILY_NAMES[rng.random_range(0..FAMILY_NAMES.len())];
        let email = format!(
            "{}.{}.{:05}@{}",
            given.to_lowercase(),
            family.to_lowercase(),
            i,
            DOMAINS[rng.random_range(0..DOMAINS.len())]
        );
        let phone = format!("555-{:03}-{:04}", i % 1000, rng.random_range(1000..9999));

        let mut record = ContactRecord::new(format!("k{i:05}"), PersonName::new(given, family))
            .with_email(&email)
            .with_phone(&phone);
        if rng.random_bool(0.4) {
            record = record
                .with_organization(Organization::new(COMPANIES[rng.random_range(0..COMPANIES.len())]));
        }
        records.push(record.clone());

        if rng.random_bool(duplicate_probability) {
            planted_duplicates += 1;
            // Same email, same phone under different formatting, trimmed
            // given name, plus one extra phone number.
            let short_given: String = given.chars().take(given.len().saturating_sub(1)).collect();
            let duplicate = ContactRecord::new(
                format!("k{i:05}-dup"),
                PersonName::new(short_given, family),
            )
            .with_email(&email)
            .with_phone(phone.replace('-', " "))
            .with_phone(format!("555-{:03}-{:04}", i % 1000, rng.random_range(1000..9999)));
            records.push(duplicate);
        }
    }

    GeneratedDataset {
        records,
        planted_duplicates,
    }
}
