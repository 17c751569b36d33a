//! Password security audit
//!
//! Scores every record from three signals:
//! - Age of the password (days since last change)
//! - Reuse of the same plaintext in another record
//! - Complexity (length and character classes)
//!
//! Reuse is a property of the whole collection, so ratings are only
//! meaningful right after a full `AuditEngine::audit` pass.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;
use zeroize::Zeroizing;

use crate::error::VaultResult;
use crate::record::{AgeBucket, Complexity, Record, Reuse};
use crate::store::RecordStore;

/// Symbols that count as the fourth character class
pub const SYMBOLS: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~ ";

const HALF_YEAR_DAYS: i64 = 182;
const MIN_LENGTH: usize = 8;
const MAX_TABLE_LENGTH: usize = 30;

use Complexity::{Average as A, Excellent as E, Good as G, Superb as S, Unsuitable as U, Weak as W};

/// Complexity by length (8..=30) and number of character classes (1..=4)
const COMPLEXITY_TABLE: [[Complexity; 4]; MAX_TABLE_LENGTH - MIN_LENGTH + 1] = [
    [U, W, W, W], // 8
    [W, W, W, W], // 9
    [W, W, W, A], // 10
    [W, A, A, G], // 11
    [W, A, A, G], // 12
    [A, G, G, E], // 13
    [A, G, G, E], // 14
    [A, E, E, E], // 15
    [G, E, E, S], // 16
    [G, E, S, S], // 17
    [E, S, S, S], // 18
    [E, S, S, S], // 19
    [E, S, S, S], // 20
    [E, S, S, S], // 21
    [S, S, S, S], // 22
    [S, S, S, S], // 23
    [S, S, S, S], // 24
    [S, S, S, S], // 25
    [S, S, S, S], // 26
    [S, S, S, S], // 27
    [S, S, S, S], // 28
    [S, S, S, S], // 29
    [S, S, S, S], // 30
];

/// Display band for a rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityBand {
    Superb,
    Excellent,
    Good,
    Average,
    Weak,
    Critical,
}

impl SecurityBand {
    pub fn from_rating(rating: u8) -> Self {
        match rating {
            15.. => SecurityBand::Superb,
            14 => SecurityBand::Excellent,
            12..=13 => SecurityBand::Good,
            10..=11 => SecurityBand::Average,
            7..=9 => SecurityBand::Weak,
            _ => SecurityBand::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityBand::Superb => "Superb",
            SecurityBand::Excellent => "Excellent",
            SecurityBand::Good => "Good",
            SecurityBand::Average => "Average",
            SecurityBand::Weak => "Weak",
            SecurityBand::Critical => "Critical",
        }
    }
}

/// One line of the audit report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRow {
    pub index: usize,
    pub website: String,
    pub username: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub age: AgeBucket,
    pub reuse: Reuse,
    pub complexity: Complexity,
    pub rating: Option<u8>,
    pub band: Option<SecurityBand>,
}

/// Days in `year`
fn year_length(year: i32) -> i64 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366
    } else {
        365
    }
}

pub struct AuditEngine;

impl AuditEngine {
    /// Bucket the time since `last_modified`, using the length of the
    /// current year for the one- and two-year thresholds
    pub fn audit_age(last_modified: DateTime<Utc>, now: DateTime<Utc>) -> AgeBucket {
        if last_modified > now {
            return AgeBucket::Error;
        }
        let days = (now - last_modified).num_days();
        let year = year_length(now.year());

        if days < HALF_YEAR_DAYS {
            AgeBucket::New
        } else if days < year {
            AgeBucket::Old
        } else if days < year + HALF_YEAR_DAYS {
            AgeBucket::Rotate
        } else if days < 2 * year {
            AgeBucket::Tired
        } else {
            AgeBucket::Historic
        }
    }

    /// Flag every password that appears in more than one record
    pub fn audit_reuse<P: AsRef<str>>(passwords: &[P]) -> Vec<Reuse> {
        let mut flags = vec![Reuse::No; passwords.len()];
        for i in 0..passwords.len() {
            for j in (i + 1)..passwords.len() {
                if passwords[i].as_ref() == passwords[j].as_ref() {
                    flags[i] = Reuse::Yes;
                    flags[j] = Reuse::Yes;
                }
            }
        }
        flags
    }

    pub fn character_classes(password: &str) -> usize {
        let lower = password.chars().any(|c| c.is_ascii_lowercase());
        let upper = password.chars().any(|c| c.is_ascii_uppercase());
        let digit = password.chars().any(|c| c.is_ascii_digit());
        let symbol = password.chars().any(|c| SYMBOLS.contains(c));
        [lower, upper, digit, symbol].iter().filter(|&&b| b).count()
    }

    pub fn audit_complexity(password: &str) -> Complexity {
        let length = password.chars().count();
        if length < MIN_LENGTH {
            return Complexity::Unsuitable;
        }
        if length > MAX_TABLE_LENGTH {
            return Complexity::Superb;
        }
        // Passwords made only of characters outside the four classes
        // score like a single class.
        let classes = Self::character_classes(password).max(1);
        COMPLEXITY_TABLE[length - MIN_LENGTH][classes - 1]
    }

    fn age_points(bucket: AgeBucket) -> Option<i32> {
        match bucket {
            AgeBucket::New => Some(3),
            AgeBucket::Old => Some(1),
            AgeBucket::Rotate => Some(-3),
            AgeBucket::Tired => Some(-5),
            AgeBucket::Historic => Some(-6),
            AgeBucket::Error | AgeBucket::Unset => None,
        }
    }

    fn reuse_points(reuse: Reuse) -> Option<i32> {
        match reuse {
            Reuse::No => Some(6),
            Reuse::Yes => Some(0),
            Reuse::Unset => None,
        }
    }

    fn complexity_points(complexity: Complexity) -> Option<i32> {
        match complexity {
            Complexity::Superb => Some(6),
            Complexity::Excellent => Some(5),
            Complexity::Good => Some(2),
            Complexity::Average => Some(0),
            Complexity::Weak => Some(-3),
            Complexity::Unsuitable => Some(-6),
            Complexity::Unset => None,
        }
    }

    /// Rating 0..=15 from the cached audit fields; `None` when any of them
    /// is unset or the age is in error
    pub fn score(record: &Record) -> Option<u8> {
        let total = Self::age_points(record.pw_age)?
            + Self::reuse_points(record.pw_reuse)?
            + Self::complexity_points(record.pw_complexity)?;
        Some(total.max(0) as u8)
    }

    /// Audit every record in place
    ///
    /// All passwords are decrypted before any record is touched, so a
    /// decryption failure leaves the previous audit state intact.
    pub fn audit(store: &mut RecordStore, now: DateTime<Utc>) -> VaultResult<()> {
        let passwords = (0..store.len())
            .map(|i| {
                let buffer = store.get_password_plaintext(i)?;
                Ok(Zeroizing::new(buffer.as_str()?.to_string()))
            })
            .collect::<VaultResult<Vec<Zeroizing<String>>>>()?;

        let plain: Vec<&str> = passwords.iter().map(|p| p.as_str()).collect();
        let reuse = Self::audit_reuse(&plain);

        for ((record, password), reuse) in store.records_mut().iter_mut().zip(&passwords).zip(reuse) {
            record.pw_age = Self::audit_age(record.last_modified, now);
            record.pw_reuse = reuse;
            record.pw_complexity = Self::audit_complexity(password);
            record.security_rating = Self::score(record);
        }

        let rated = store.records().iter().filter(|r| r.security_rating.is_some()).count();
        info!(records = store.len(), rated, "audit complete");
        Ok(())
    }

    /// Indices of rated records, lowest rating first. Unrated records are left out.
    pub fn rank(records: &[Record]) -> Vec<usize> {
        let mut ranked: Vec<(usize, u8)> = records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.security_rating.map(|rating| (i, rating)))
            .collect();
        ranked.sort_by_key(|&(_, rating)| rating);
        ranked.into_iter().map(|(i, _)| i).collect()
    }

    /// Report rows in ranking order, followed by unrated records
    pub fn report(records: &[Record]) -> Vec<AuditRow> {
        let ranked = Self::rank(records);
        let unrated = (0..records.len()).filter(|i| records[*i].security_rating.is_none());

        ranked
            .into_iter()
            .chain(unrated)
            .map(|index| {
                let r = &records[index];
                AuditRow {
                    index,
                    website: r.website.clone(),
                    username: r.username.clone(),
                    last_modified: r.last_modified,
                    age: r.pw_age,
                    reuse: r.pw_reuse,
                    complexity: r.pw_complexity,
                    rating: r.security_rating,
                    band: r.security_rating.map(SecurityBand::from_rating),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordDraft;
    use crate::store::tests::test_store;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 7, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_age_buckets() {
        let now = now();
        let ago = |days| now - Duration::days(days);
        assert_eq!(AuditEngine::audit_age(now, now), AgeBucket::New);
        assert_eq!(AuditEngine::audit_age(ago(181), now), AgeBucket::New);
        assert_eq!(AuditEngine::audit_age(ago(182), now), AgeBucket::Old);
        assert_eq!(AuditEngine::audit_age(ago(200), now), AgeBucket::Old);
        assert_eq!(AuditEngine::audit_age(ago(364), now), AgeBucket::Old);
        assert_eq!(AuditEngine::audit_age(ago(365), now), AgeBucket::Rotate);
        assert_eq!(AuditEngine::audit_age(ago(546), now), AgeBucket::Rotate);
        assert_eq!(AuditEngine::audit_age(ago(547), now), AgeBucket::Tired);
        assert_eq!(AuditEngine::audit_age(ago(729), now), AgeBucket::Tired);
        assert_eq!(AuditEngine::audit_age(ago(730), now), AgeBucket::Historic);
        assert_eq!(AuditEngine::audit_age(now + Duration::days(1), now), AgeBucket::Error);
    }

    #[test]
    fn test_age_leap_year() {
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        let ago = |days| now - Duration::days(days);
        assert_eq!(AuditEngine::audit_age(ago(365), now), AgeBucket::Old);
        assert_eq!(AuditEngine::audit_age(ago(366), now), AgeBucket::Rotate);
        assert_eq!(AuditEngine::audit_age(ago(547), now), AgeBucket::Rotate);
        assert_eq!(AuditEngine::audit_age(ago(548), now), AgeBucket::Tired);
        assert_eq!(AuditEngine::audit_age(ago(731), now), AgeBucket::Tired);
        assert_eq!(AuditEngine::audit_age(ago(732), now), AgeBucket::Historic);
    }

    #[test]
    fn test_reuse() {
        let flags = AuditEngine::audit_reuse(&["secret", "secret", "other"]);
        assert_eq!(flags, vec![Reuse::Yes, Reuse::Yes, Reuse::No]);
        assert!(AuditEngine::audit_reuse::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_complexity_boundaries() {
        assert_eq!(AuditEngine::audit_complexity("aB3$xyz"), Complexity::Unsuitable);
        assert_eq!(AuditEngine::audit_complexity("aB3$wxyz"), Complexity::Weak);
        assert_eq!(AuditEngine::audit_complexity(&"a".repeat(31)), Complexity::Superb);
        assert_eq!(AuditEngine::audit_complexity("abcdefgh"), Complexity::Unsuitable);
        assert_eq!(AuditEngine::audit_complexity("abcdefghijklm"), Complexity::Average);
        assert_eq!(AuditEngine::audit_complexity("Abcdefgh1!ab"), Complexity::Good);
        assert_eq!(AuditEngine::audit_complexity("Abcdefgh1!abcdef"), Complexity::Superb);
        assert_eq!(AuditEngine::audit_complexity("Abcdefghijklmnopqrstuvwxyz1234"), Complexity::Superb);
    }

    #[test]
    fn test_character_classes() {
        assert_eq!(AuditEngine::character_classes("abc"), 1);
        assert_eq!(AuditEngine::character_classes("aB"), 2);
        assert_eq!(AuditEngine::character_classes("aB1"), 3);
        assert_eq!(AuditEngine::character_classes("aB1 "), 4);
        assert_eq!(AuditEngine::character_classes("äöü"), 0);
    }

    #[test]
    fn test_score_and_clamp() {
        let mut record = RecordDraft::new("a", "pw").into_record("t".into(), now()).unwrap();
        assert_eq!(AuditEngine::score(&record), None);

        record.pw_age = AgeBucket::Historic;
        record.pw_reuse = Reuse::Yes;
        record.pw_complexity = Complexity::Unsuitable;
        assert_eq!(AuditEngine::score(&record), Some(0));

        record.pw_age = AgeBucket::New;
        record.pw_reuse = Reuse::No;
        record.pw_complexity = Complexity::Superb;
        assert_eq!(AuditEngine::score(&record), Some(15));

        record.pw_age = AgeBucket::Error;
        assert_eq!(AuditEngine::score(&record), None);
    }

    #[test]
    fn test_bands() {
        assert_eq!(SecurityBand::from_rating(15), SecurityBand::Superb);
        assert_eq!(SecurityBand::from_rating(14), SecurityBand::Excellent);
        assert_eq!(SecurityBand::from_rating(12), SecurityBand::Good);
        assert_eq!(SecurityBand::from_rating(11), SecurityBand::Average);
        assert_eq!(SecurityBand::from_rating(7), SecurityBand::Weak);
        assert_eq!(SecurityBand::from_rating(6), SecurityBand::Critical);
        assert_eq!(SecurityBand::from_rating(0).as_str(), "Critical");
    }

    #[test]
    fn test_full_audit_and_rank() {
        let mut store = test_store();
        store
            .add_many(
                vec![
                    RecordDraft::new("x.com", "secret"),
                    RecordDraft::new("y.com", "secret"),
                    RecordDraft::new("z.com", "Tr0ub4dor&3-horse-battery"),
                    RecordDraft::new("future.com", "Tr0ub4dor&3-horse-staple")
                        .with_last_modified(now() + Duration::days(1)),
                ],
                now() - Duration::days(10),
            )
            .unwrap();
        // future.com, x.com, y.com, z.com

        AuditEngine::audit(&mut store, now()).unwrap();
        let records = store.records();

        assert_eq!(records[0].pw_age, AgeBucket::Error);
        assert_eq!(records[0].security_rating, None);
        assert_eq!(records[1].pw_reuse, Reuse::Yes);
        assert_eq!(records[2].pw_reuse, Reuse::Yes);
        assert_eq!(records[3].pw_reuse, Reuse::No);
        // new (3) + reused (0) + unsuitable (-6)
        assert_eq!(records[1].security_rating, Some(0));
        // new (3) + unique (6) + superb (6)
        assert_eq!(records[3].security_rating, Some(15));

        assert_eq!(AuditEngine::rank(records), vec![1, 2, 3]);

        let report = AuditEngine::report(records);
        assert_eq!(report.len(), 4);
        assert_eq!(report[3].website, "future.com");
        assert_eq!(report[3].band, None);
        assert_eq!(report[2].band, Some(SecurityBand::Superb));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json[0]["reuse"], "yes");
        assert_eq!(json[2]["complexity"], "s");
    }

    #[test]
    fn test_mutation_invalidates_reuse() {
        let mut store = test_store();
        store.add(RecordDraft::new("a.com", "same-password"), now()).unwrap();
        store.add(RecordDraft::new("b.com", "same-password"), now()).unwrap();
        AuditEngine::audit(&mut store, now()).unwrap();
        assert_eq!(store.records()[0].pw_reuse, Reuse::Yes);

        store.remove(1).unwrap();
        assert_eq!(store.records()[0].pw_reuse, Reuse::Unset);
        assert_eq!(store.records()[0].security_rating, None);

        AuditEngine::audit(&mut store, now()).unwrap();
        assert_eq!(store.records()[0].pw_reuse, Reuse::No);
    }
}
