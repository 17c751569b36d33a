//! Credential records and their row representation

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};

/// Timestamp layout used in rows (minute precision, UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Drop seconds and sub-second precision
pub fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> VaultResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| VaultError::UnsupportedFileFormat(format!("invalid timestamp '{}'", s)))
}

fn bad_field(column: &str, value: &str) -> VaultError {
    VaultError::UnsupportedFileFormat(format!("invalid {} value '{}'", column, value))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwoFactor {
    #[default]
    Unset,
    Enabled,
    Disabled,
}

impl TwoFactor {
    pub fn code(&self) -> &'static str {
        match self {
            TwoFactor::Unset => "",
            TwoFactor::Enabled => "enabled",
            TwoFactor::Disabled => "disabled",
        }
    }

    pub fn from_code(code: &str) -> VaultResult<Self> {
        match code {
            "" => Ok(TwoFactor::Unset),
            "enabled" => Ok(TwoFactor::Enabled),
            "disabled" => Ok(TwoFactor::Disabled),
            other => Err(bad_field("two_factor", other)),
        }
    }
}

/// How long ago the password was last changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeBucket {
    #[default]
    #[serde(rename = "")]
    Unset,
    /// Under half a year
    #[serde(rename = "n")]
    New,
    /// Under a year
    #[serde(rename = "o")]
    Old,
    /// Under a year and a half
    #[serde(rename = "r")]
    Rotate,
    /// Under two years
    #[serde(rename = "t")]
    Tired,
    /// Two years or more
    #[serde(rename = "h")]
    Historic,
    /// Last change lies in the future; not scored
    #[serde(rename = "e")]
    Error,
}

impl AgeBucket {
    pub fn code(&self) -> &'static str {
        match self {
            AgeBucket::Unset => "",
            AgeBucket::New => "n",
            AgeBucket::Old => "o",
            AgeBucket::Rotate => "r",
            AgeBucket::Tired => "t",
            AgeBucket::Historic => "h",
            AgeBucket::Error => "e",
        }
    }

    pub fn from_code(code: &str) -> VaultResult<Self> {
        match code {
            "" => Ok(AgeBucket::Unset),
            "n" => Ok(AgeBucket::New),
            "o" => Ok(AgeBucket::Old),
            "r" => Ok(AgeBucket::Rotate),
            "t" => Ok(AgeBucket::Tired),
            "h" => Ok(AgeBucket::Historic),
            "e" => Ok(AgeBucket::Error),
            other => Err(bad_field("pw_age", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reuse {
    #[default]
    Unset,
    No,
    Yes,
}

impl Reuse {
    pub fn code(&self) -> &'static str {
        match self {
            Reuse::Unset => "",
            Reuse::No => "no",
            Reuse::Yes => "yes",
        }
    }

    pub fn from_code(code: &str) -> VaultResult<Self> {
        match code {
            "" => Ok(Reuse::Unset),
            "no" => Ok(Reuse::No),
            "yes" => Ok(Reuse::Yes),
            other => Err(bad_field("pw_reuse", other)),
        }
    }
}

/// Complexity class, weakest first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Complexity {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "u")]
    Unsuitable,
    #[serde(rename = "w")]
    Weak,
    #[serde(rename = "a")]
    Average,
    #[serde(rename = "g")]
    Good,
    #[serde(rename = "e")]
    Excellent,
    #[serde(rename = "s")]
    Superb,
}

impl Complexity {
    pub fn code(&self) -> &'static str {
        match self {
            Complexity::Unset => "",
            Complexity::Unsuitable => "u",
            Complexity::Weak => "w",
            Complexity::Average => "a",
            Complexity::Good => "g",
            Complexity::Excellent => "e",
            Complexity::Superb => "s",
        }
    }

    pub fn from_code(code: &str) -> VaultResult<Self> {
        match code {
            "" => Ok(Complexity::Unset),
            "u" => Ok(Complexity::Unsuitable),
            "w" => Ok(Complexity::Weak),
            "a" => Ok(Complexity::Average),
            "g" => Ok(Complexity::Good),
            "e" => Ok(Complexity::Excellent),
            "s" => Ok(Complexity::Superb),
            other => Err(bad_field("pw_complexity", other)),
        }
    }
}

/// A stored credential. `password` holds the key-2 token, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// In-memory identity, not persisted
    pub id: Uuid,
    pub website: String,
    pub password: String,
    pub last_modified: DateTime<Utc>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub group: Option<String>,
    pub remark: Option<String>,
    pub two_factor: TwoFactor,
    pub recovery_email: Option<String>,
    pub phone_number: Option<String>,
    pub pw_age: AgeBucket,
    pub pw_reuse: Reuse,
    pub pw_complexity: Complexity,
    pub security_rating: Option<u8>,
}

fn opt(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl Record {
    pub fn reset_audit(&mut self) {
        self.pw_age = AgeBucket::Unset;
        self.pw_reuse = Reuse::Unset;
        self.pw_complexity = Complexity::Unset;
        self.security_rating = None;
    }

    /// Same record apart from the in-memory id and the password token
    pub fn same_fields(&self, other: &Record) -> bool {
        self.website == other.website
            && self.last_modified == other.last_modified
            && self.email == other.email
            && self.username == other.username
            && self.group == other.group
            && self.remark == other.remark
            && self.two_factor == other.two_factor
            && self.recovery_email == other.recovery_email
            && self.phone_number == other.phone_number
            && self.pw_age == other.pw_age
            && self.pw_reuse == other.pw_reuse
            && self.pw_complexity == other.pw_complexity
            && self.security_rating == other.security_rating
    }

    /// The canonical 14-field row, with `password` substituted for the token
    pub fn to_row_with_password(&self, password: &str) -> Vec<String> {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        vec![
            self.website.clone(),
            password.to_string(),
            format_timestamp(&self.last_modified),
            text(&self.email),
            text(&self.username),
            text(&self.group),
            text(&self.remark),
            self.two_factor.code().to_string(),
            text(&self.recovery_email),
            text(&self.phone_number),
            self.pw_age.code().to_string(),
            self.pw_reuse.code().to_string(),
            self.pw_complexity.code().to_string(),
            self.security_rating.map(|r| r.to_string()).unwrap_or_default(),
        ]
    }

    pub fn to_row(&self) -> Vec<String> {
        self.to_row_with_password(&self.password)
    }

    /// Build from a row of an accepted width. Fields beyond the row's width
    /// keep their defaults; a missing timestamp becomes `now`.
    pub fn from_row(row: &[String], now: DateTime<Utc>) -> VaultResult<Record> {
        crate::rows::check_width(row.len())?;
        let field = |i: usize| row.get(i).map(String::as_str).unwrap_or("");

        let website = field(0).to_lowercase();
        if website.is_empty() {
            return Err(VaultError::UnsupportedFileFormat("row has an empty website".into()));
        }

        let last_modified = match field(2) {
            "" => truncate_to_minute(now),
            ts => parse_timestamp(ts)?,
        };

        let security_rating = match field(13) {
            "" => None,
            s => {
                let rating: u8 = s.parse().map_err(|_| bad_field("security_rating", s))?;
                if rating > 15 {
                    return Err(bad_field("security_rating", s));
                }
                Some(rating)
            }
        };

        Ok(Record {
            id: Uuid::new_v4(),
            website,
            password: field(1).to_string(),
            last_modified,
            email: opt(field(3)),
            username: opt(field(4)),
            group: opt(field(5)),
            remark: opt(field(6)),
            two_factor: TwoFactor::from_code(field(7))?,
            recovery_email: opt(field(8)),
            phone_number: opt(field(9)),
            pw_age: AgeBucket::from_code(field(10))?,
            pw_reuse: Reuse::from_code(field(11))?,
            pw_complexity: Complexity::from_code(field(12))?,
            security_rating,
        })
    }
}

/// A record as supplied by the caller, with a plaintext password
pub struct RecordDraft {
    pub website: String,
    pub password: Zeroizing<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub group: Option<String>,
    pub remark: Option<String>,
    pub two_factor: TwoFactor,
    pub recovery_email: Option<String>,
    pub phone_number: Option<String>,
}

impl RecordDraft {
    pub fn new(website: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            website: website.into(),
            password: Zeroizing::new(password.into()),
            last_modified: None,
            email: None,
            username: None,
            group: None,
            remark: None,
            two_factor: TwoFactor::Unset,
            recovery_email: None,
            phone_number: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn with_two_factor(mut self, enabled: bool) -> Self {
        self.two_factor = if enabled { TwoFactor::Enabled } else { TwoFactor::Disabled };
        self
    }

    pub fn with_recovery_email(mut self, email: impl Into<String>) -> Self {
        self.recovery_email = Some(email.into());
        self
    }

    pub fn with_phone_number(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    pub fn with_last_modified(mut self, ts: DateTime<Utc>) -> Self {
        self.last_modified = Some(ts);
        self
    }

    /// Turn into a stored record holding `token` in place of the password
    pub(crate) fn into_record(self, token: String, now: DateTime<Utc>) -> VaultResult<Record> {
        let website = self.website.trim().to_lowercase();
        if website.is_empty() {
            return Err(VaultError::InvalidParameter("website must not be empty".into()));
        }
        Ok(Record {
            id: Uuid::new_v4(),
            website,
            password: token,
            last_modified: truncate_to_minute(self.last_modified.unwrap_or(now)),
            email: self.email,
            username: self.username,
            group: self.group,
            remark: self.remark,
            two_factor: self.two_factor,
            recovery_email: self.recovery_email,
            phone_number: self.phone_number,
            pw_age: AgeBucket::Unset,
            pw_reuse: Reuse::Unset,
            pw_complexity: Complexity::Unset,
            security_rating: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_full_row_roundtrip() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let mut record = RecordDraft::new("Example.COM", "unused")
            .with_email("a@b.c")
            .with_username("alice")
            .with_group("work")
            .with_remark("note, with \"quotes\"")
            .with_two_factor(true)
            .with_recovery_email("r@b.c")
            .with_phone_number("+1 555")
            .into_record("token".into(), now)
            .unwrap();
        record.pw_age = AgeBucket::New;
        record.pw_reuse = Reuse::No;
        record.pw_complexity = Complexity::Good;
        record.security_rating = Some(11);

        assert_eq!(record.website, "example.com");

        let parsed = Record::from_row(&record.to_row(), now).unwrap();
        assert!(parsed.same_fields(&record));
        assert_eq!(parsed.password, "token");
        assert_ne!(parsed.id, record.id);
    }

    #[test]
    fn test_legacy_prefix_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap();
        let record = Record::from_row(&row(&["Site.org", "pw"]), now).unwrap();
        assert_eq!(record.website, "site.org");
        assert_eq!(record.last_modified, Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());
        assert_eq!(record.email, None);
        assert_eq!(record.two_factor, TwoFactor::Unset);
        assert_eq!(record.security_rating, None);

        let record =
            Record::from_row(&row(&["s", "pw", "2020-01-02 03:04", "e@x", "user"]), now).unwrap();
        assert_eq!(format_timestamp(&record.last_modified), "2020-01-02 03:04");
        assert_eq!(record.username.as_deref(), Some("user"));
    }

    #[test]
    fn test_rejects_bad_rows() {
        let now = Utc::now();
        assert!(matches!(
            Record::from_row(&row(&["a", "b", "", "", "", "", ""]), now),
            Err(VaultError::UnsupportedFileFormat(_))
        ));
        assert!(Record::from_row(&row(&["", "pw"]), now).is_err());
        assert!(Record::from_row(&row(&["a", "pw", "yesterday"]), now).is_err());

        let mut full = row(&["a", "pw", "", "", "", "", "", "maybe", "", "", "", "", "", ""]);
        assert!(Record::from_row(&full, now).is_err());
        full[7] = String::new();
        full[13] = "16".into();
        assert!(Record::from_row(&full, now).is_err());
    }

    #[test]
    fn test_empty_website_draft() {
        let result = RecordDraft::new("   ", "pw").into_record("t".into(), Utc::now());
        assert!(matches!(result, Err(VaultError::InvalidParameter(_))));
    }

    #[test]
    fn test_reset_audit() {
        let mut record = RecordDraft::new("a", "pw").into_record("t".into(), Utc::now()).unwrap();
        record.pw_age = AgeBucket::Historic;
        record.pw_reuse = Reuse::Yes;
        record.pw_complexity = Complexity::Weak;
        record.security_rating = Some(3);
        record.reset_audit();
        assert_eq!(record.pw_age, AgeBucket::Unset);
        assert_eq!(record.pw_reuse, Reuse::Unset);
        assert_eq!(record.pw_complexity, Complexity::Unset);
        assert_eq!(record.security_rating, None);
    }
}
