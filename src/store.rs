//! In-memory record collection
//!
//! Records are kept sorted by website after every mutation. Passwords are
//! sealed with key 2 on the way in and only decrypted on request.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

use std::collections::{BTreeSet, HashSet};

use crate::crypto::{KeyMaterial, SecretBuffer};
use crate::error::{VaultError, VaultResult};
use crate::record::{Record, RecordDraft};
use crate::rows;

/// Listing view of a record (no secret values)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub index: usize,
    pub website: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub group: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// Outcome of a CSV import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub added: usize,
    pub skipped: usize,
}

/// Field selector for searches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Website,
    Username,
    Email,
    Group,
}

impl SearchField {
    fn value<'a>(&self, record: &'a Record) -> Option<&'a str> {
        match self {
            SearchField::Website => Some(record.website.as_str()),
            SearchField::Username => record.username.as_deref(),
            SearchField::Email => record.email.as_deref(),
            SearchField::Group => record.group.as_deref(),
        }
    }
}

#[derive(Clone)]
pub struct RecordStore {
    records: Vec<Record>,
    keys: KeyMaterial,
}

impl RecordStore {
    pub fn new(keys: KeyMaterial) -> Self {
        Self { records: Vec::new(), keys }
    }

    pub fn keys(&self) -> &KeyMaterial {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    pub fn get(&self, index: usize) -> VaultResult<&Record> {
        self.records.get(index).ok_or_else(|| self.out_of_range(index))
    }

    fn out_of_range(&self, index: usize) -> VaultError {
        VaultError::InvalidParameter(format!(
            "index {} out of range for {} records",
            index,
            self.records.len()
        ))
    }

    fn sort(&mut self) {
        self.records.sort_by(|a, b| a.website.cmp(&b.website));
    }

    /// Insert keeping website order; equal websites keep insertion order
    fn insert_sorted(&mut self, record: Record) -> usize {
        let index = self.records.partition_point(|r| r.website <= record.website);
        self.records.insert(index, record);
        index
    }

    /// Reuse and ratings depend on the whole collection
    fn invalidate_collection_audit(&mut self) {
        for record in &mut self.records {
            record.pw_reuse = crate::record::Reuse::Unset;
            record.security_rating = None;
        }
    }

    fn seal(&self, draft: RecordDraft, now: DateTime<Utc>) -> VaultResult<Record> {
        let token = self.keys.seal_password(&draft.password)?;
        draft.into_record(token, now)
    }

    /// Add one record and return its position in sorted order
    pub fn add(&mut self, draft: RecordDraft, now: DateTime<Utc>) -> VaultResult<usize> {
        let record = self.seal(draft, now)?;
        debug!(website = %record.website, "adding record");

        self.invalidate_collection_audit();
        Ok(self.insert_sorted(record))
    }

    /// Add several records; nothing is inserted if any of them fails to seal
    pub fn add_many(
        &mut self,
        drafts: impl IntoIterator<Item = RecordDraft>,
        now: DateTime<Utc>,
    ) -> VaultResult<usize> {
        let sealed = drafts
            .into_iter()
            .map(|d| self.seal(d, now))
            .collect::<VaultResult<Vec<_>>>()?;
        let count = sealed.len();

        if count > 0 {
            self.invalidate_collection_audit();
            self.records.extend(sealed);
            self.sort();
        }
        debug!(count, "added records");
        Ok(count)
    }

    pub fn remove(&mut self, index: usize) -> VaultResult<Record> {
        if index >= self.records.len() {
            return Err(self.out_of_range(index));
        }
        let removed = self.records.remove(index);
        self.invalidate_collection_audit();
        debug!(website = %removed.website, "removed record");
        Ok(removed)
    }

    /// Remove several records by their current positions
    ///
    /// Positions are resolved to record ids before anything is removed, so
    /// the order of `indices` does not matter and duplicates collapse. The
    /// removed records are returned in collection order.
    pub fn remove_many(&mut self, indices: &[usize]) -> VaultResult<Vec<Record>> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.records.len()) {
            return Err(self.out_of_range(bad));
        }

        let doomed: HashSet<Uuid> = indices.iter().map(|&i| self.records[i].id).collect();
        let (removed, kept): (Vec<Record>, Vec<Record>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| doomed.contains(&r.id));
        self.records = kept;

        if !removed.is_empty() {
            self.invalidate_collection_audit();
        }
        debug!(count = removed.len(), "removed records");
        Ok(removed)
    }

    /// Replace the record at `index` and return its new position
    ///
    /// When the password is unchanged and no explicit timestamp is given,
    /// the previous timestamp and audit results carry over. Otherwise the
    /// timestamp moves to `now` and audit results are cleared.
    pub fn update(&mut self, index: usize, draft: RecordDraft, now: DateTime<Utc>) -> VaultResult<usize> {
        let previous = self.get(index)?.clone();
        // An unreadable old token counts as a change so the record can still be replaced
        let password_changed = self
            .keys
            .open_password(&previous.password)
            .map_or(true, |old| old.as_bytes() != draft.password.as_bytes());
        let explicit_timestamp = draft.last_modified.is_some();

        let mut record = self.seal(draft, now)?;
        record.id = previous.id;

        if password_changed || explicit_timestamp {
            record.reset_audit();
            self.invalidate_collection_audit();
        } else {
            record.last_modified = previous.last_modified;
            record.pw_age = previous.pw_age;
            record.pw_reuse = previous.pw_reuse;
            record.pw_complexity = previous.pw_complexity;
            record.security_rating = previous.security_rating;
        }

        self.records.remove(index);
        Ok(self.insert_sorted(record))
    }

    pub fn search(&self, field: SearchField, keyword: &str, partial: bool) -> VaultResult<Vec<usize>> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return Err(VaultError::InvalidParameter("search keyword must not be empty".into()));
        }

        Ok(self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                field.value(r).is_some_and(|value| {
                    let value = value.to_lowercase();
                    if partial {
                        value.contains(&keyword)
                    } else {
                        value == keyword
                    }
                })
            })
            .map(|(i, _)| i)
            .collect())
    }

    pub fn search_website(&self, keyword: &str, partial: bool) -> VaultResult<Vec<usize>> {
        self.search(SearchField::Website, keyword, partial)
    }

    pub fn search_username(&self, keyword: &str, partial: bool) -> VaultResult<Vec<usize>> {
        self.search(SearchField::Username, keyword, partial)
    }

    pub fn search_email(&self, keyword: &str, partial: bool) -> VaultResult<Vec<usize>> {
        self.search(SearchField::Email, keyword, partial)
    }

    pub fn search_group(&self, keyword: &str, partial: bool) -> VaultResult<Vec<usize>> {
        self.search(SearchField::Group, keyword, partial)
    }

    /// Union of partial matches over website, username, email and group
    pub fn search_all(&self, keyword: &str) -> VaultResult<Vec<usize>> {
        let mut hits = BTreeSet::new();
        for field in [SearchField::Website, SearchField::Username, SearchField::Email, SearchField::Group] {
            hits.extend(self.search(field, keyword, true)?);
        }
        Ok(hits.into_iter().collect())
    }

    pub fn check_duplicate(&self, website: &str) -> bool {
        let website = website.trim().to_lowercase();
        self.records.iter().any(|r| r.website == website)
    }

    pub fn get_password_plaintext(&self, index: usize) -> VaultResult<SecretBuffer> {
        let record = self.get(index)?;
        self.keys.open_password(&record.password)
    }

    pub fn summaries(&self) -> Vec<RecordSummary> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, r)| RecordSummary {
                index,
                website: r.website.clone(),
                username: r.username.clone(),
                email: r.email.clone(),
                group: r.group.clone(),
                last_modified: r.last_modified,
            })
            .collect()
    }

    /// Header plus one 14-field row per record, passwords still sealed
    pub fn serialize(&self) -> String {
        let table: Vec<Vec<String>> = self.records.iter().map(Record::to_row).collect();
        rows::encode_table(&table)
    }

    /// Rebuild a store from decrypted payload text
    pub fn deserialize(keys: KeyMaterial, text: &str, now: DateTime<Utc>) -> VaultResult<Self> {
        let mut table = rows::parse_rows(text)?;
        if table.first().is_some_and(|row| rows::is_header(row)) {
            table.remove(0);
        }

        let records = table
            .iter()
            .map(|row| Record::from_row(row, now))
            .collect::<VaultResult<Vec<_>>>()?;

        let mut store = Self { records, keys };
        store.sort();
        Ok(store)
    }

    /// Import a plaintext CSV file. Websites already present are skipped.
    pub fn import_csv(&mut self, text: &str, now: DateTime<Utc>) -> VaultResult<ImportSummary> {
        let mut table = rows::parse_rows(text)?;
        if table.first().is_some_and(|row| rows::is_header(row)) {
            table.remove(0);
        }

        let mut summary = ImportSummary::default();
        let mut seen: HashSet<String> = self.records.iter().map(|r| r.website.clone()).collect();
        let mut sealed = Vec::with_capacity(table.len());

        for row in &table {
            let mut record = Record::from_row(row, now)?;
            if !seen.insert(record.website.clone()) {
                summary.skipped += 1;
                continue;
            }
            let plaintext = Zeroizing::new(std::mem::take(&mut record.password));
            record.password = self.keys.seal_password(&plaintext)?;
            record.reset_audit();
            sealed.push(record);
        }

        summary.added = sealed.len();
        if !sealed.is_empty() {
            self.invalidate_collection_audit();
            self.records.extend(sealed);
            self.sort();
        }

        info!(added = summary.added, skipped = summary.skipped, "imported CSV");
        Ok(summary)
    }

    /// Plaintext CSV of every record, 14 columns with header
    pub fn export_csv(&self) -> VaultResult<Zeroizing<String>> {
        let mut table = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let password = self.keys.open_password(&record.password)?;
            table.push(record.to_row_with_password(password.as_str()?));
        }
        let csv = Zeroizing::new(rows::encode_table(&table));
        for row in &mut table {
            for field in row.iter_mut() {
                zeroize::Zeroize::zeroize(field);
            }
        }
        Ok(csv)
    }

    /// Re-seal every password under `new_keys`
    ///
    /// All passwords are decrypted before anything changes; a single failure
    /// aborts with `IncorrectKey` and leaves the store untouched.
    pub fn rekey(&mut self, new_keys: KeyMaterial) -> VaultResult<()> {
        let mut resealed = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let plaintext = self
                .keys
                .open_password(&record.password)
                .map_err(|_| VaultError::IncorrectKey)?;
            let plaintext = plaintext.as_str().map_err(|_| VaultError::IncorrectKey)?;
            resealed.push(new_keys.seal_password(plaintext)?);
        }

        for (record, token) in self.records.iter_mut().zip(resealed) {
            record.password = token;
        }
        self.keys = new_keys;
        info!(count = self.records.len(), "re-encrypted passwords under new key");
        Ok(())
    }
}
