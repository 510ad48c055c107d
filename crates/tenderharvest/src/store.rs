use std::collections::{BTreeSet, HashMap};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::types::TenderRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid schema policy '{0}'. Accepted values: 'keep-header', 'rewrite'")]
pub struct SchemaPolicyParseError(String);

/// What to do when a record brings fields the file header does not have.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaPolicy {
    /// Keep the header written first and drop the new fields from the persisted row.
    #[default]
    KeepHeader,
    /// Rewrite the whole file under the merged header.
    Rewrite,
}

impl FromStr for SchemaPolicy {
    type Err = SchemaPolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep-header" | "keep_header" => Ok(SchemaPolicy::KeepHeader),
            "rewrite" => Ok(SchemaPolicy::Rewrite),
            _ => Err(SchemaPolicyParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Fields of the record that did not make it into the file.
    pub dropped: Vec<String>,
    pub rewritten: bool,
}

/// Append-only CSV file of tender records.
///
/// Every append goes out as a single buffered write, so an interrupted run leaves only
/// complete rows behind.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    policy: SchemaPolicy,
    header: Option<Vec<String>>,
    schema: BTreeSet<String>,
}

impl RecordStore {
    /// Open `path`, picking up the header of an existing file.
    pub fn open(path: impl Into<PathBuf>, policy: SchemaPolicy) -> Result<Self, StoreError> {
        let path = path.into();
        let header = read_header(&path)?;
        let schema = header.iter().flatten().cloned().collect();
        Ok(Self {
            path,
            policy,
            header,
            schema,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header currently in effect in the file.
    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Every field name seen so far, including ones the file could not hold.
    pub fn schema(&self) -> &BTreeSet<String> {
        &self.schema
    }

    pub fn append(&mut self, record: &TenderRecord) -> Result<AppendOutcome, StoreError> {
        self.schema.extend(record.keys().map(str::to_string));

        let Some(header) = self.header.as_ref() else {
            let header: Vec<String> = record.keys().map(str::to_string).collect();
            let row = record.project(&header);
            append_bytes(&self.path, &encode_rows(&[header.clone(), row])?)?;
            self.header = Some(header);
            return Ok(AppendOutcome::default());
        };

        let new_fields: Vec<String> = record
            .keys()
            .filter(|key| !header.iter().any(|h| h == key))
            .map(str::to_string)
            .collect();

        if new_fields.is_empty() {
            append_bytes(&self.path, &encode_rows(&[record.project(header)])?)?;
            return Ok(AppendOutcome::default());
        }

        match self.policy {
            SchemaPolicy::KeepHeader => {
                log::warn!(
                    "Schema drift in {}: dropping {} new field(s) from this row: {}",
                    self.path.display(),
                    new_fields.len(),
                    new_fields.join(", ")
                );
                append_bytes(&self.path, &encode_rows(&[record.project(header)])?)?;
                Ok(AppendOutcome {
                    dropped: new_fields,
                    rewritten: false,
                })
            }
            SchemaPolicy::Rewrite => {
                let merged: Vec<String> = header
                    .iter()
                    .cloned()
                    .chain(new_fields.iter().cloned())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                log::info!(
                    "Schema grew by {} field(s), rewriting {} with {} columns",
                    new_fields.len(),
                    self.path.display(),
                    merged.len()
                );
                self.rewrite(&merged, record)?;
                self.header = Some(merged);
                Ok(AppendOutcome {
                    dropped: Vec::new(),
                    rewritten: true,
                })
            }
        }
    }

    fn rewrite(&self, merged: &[String], record: &TenderRecord) -> Result<(), StoreError> {
        let (old_header, old_rows) = read_rows(&self.path)?;
        let mut rows = Vec::with_capacity(old_rows.len() + 2);
        rows.push(merged.to_vec());
        for old in old_rows {
            let by_name: HashMap<&str, &str> = old_header
                .iter()
                .map(String::as_str)
                .zip(old.iter().map(String::as_str))
                .collect();
            rows.push(
                merged
                    .iter()
                    .map(|c| by_name.get(c.as_str()).copied().unwrap_or_default().to_string())
                    .collect(),
            );
        }
        rows.push(record.project(merged));

        let tmp = self.path.with_extension("csv.tmp");
        fs::write(&tmp, encode_rows(&rows)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn encode_rows(rows: &[Vec<String>]) -> Result<Vec<u8>, StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))
}

fn append_bytes(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(())
}

fn read_header(path: &Path) -> Result<Option<Vec<String>>, StoreError> {
    if !path.is_file() {
        return Ok(None);
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    match reader.records().next() {
        Some(record) => Ok(Some(record?.iter().map(str::to_string).collect())),
        None => Ok(None),
    }
}

/// Header and data rows of a CSV file. Rows may be shorter or longer than the header.
pub(crate) fn read_rows(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let header = reader.headers()?.iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|r| r.map(|r| r.iter().map(str::to_string).collect()))
        .collect::<Result<_, _>>()?;
    Ok((header, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(pairs: &[(&str, &str)]) -> TenderRecord {
        pairs.iter().copied().collect()
    }

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_first_append_writes_sorted_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let mut store = RecordStore::open(&path, SchemaPolicy::KeepHeader).unwrap();
        assert!(store.header().is_none());

        let outcome = store
            .append(&record(&[("Tender ID", "T1"), ("Organization Name", "CIL"), ("A", "x")]))
            .unwrap();

        assert!(outcome.dropped.is_empty());
        assert_eq!(
            lines(&path),
            vec!["A,Organization Name,Tender ID", "x,CIL,T1"]
        );
    }

    #[test]
    fn test_new_field_is_dropped_and_header_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let mut store = RecordStore::open(&path, SchemaPolicy::KeepHeader).unwrap();

        store.append(&record(&[("A", "1"), ("B", "2")])).unwrap();
        let outcome = store
            .append(&record(&[("A", "3"), ("C", "new")]))
            .unwrap();

        assert_eq!(outcome.dropped, vec!["C".to_string()]);
        assert!(!outcome.rewritten);
        assert_eq!(lines(&path), vec!["A,B", "1,2", "3,"]);
        assert!(store.schema().contains("C"));
        assert_eq!(store.header().unwrap(), ["A", "B"]);
    }

    #[test]
    fn test_values_with_delimiters_are_quoted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let mut store = RecordStore::open(&path, SchemaPolicy::KeepHeader).unwrap();

        store
            .append(&record(&[("Value", "12,50,000"), ("Note", "say \"hi\"")]))
            .unwrap();

        let (header, rows) = read_rows(&path).unwrap();
        assert_eq!(header, vec!["Note", "Value"]);
        assert_eq!(rows, vec![vec!["say \"hi\"".to_string(), "12,50,000".to_string()]]);
    }

    #[test]
    fn test_reopen_appends_under_existing_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        {
            let mut store = RecordStore::open(&path, SchemaPolicy::KeepHeader).unwrap();
            store.append(&record(&[("A", "1"), ("B", "2")])).unwrap();
        }

        let mut store = RecordStore::open(&path, SchemaPolicy::KeepHeader).unwrap();
        assert_eq!(store.header().unwrap(), ["A", "B"]);
        store.append(&record(&[("B", "4")])).unwrap();

        assert_eq!(lines(&path), vec!["A,B", "1,2", ",4"]);
    }

    #[test]
    fn test_rewrite_policy_backfills_old_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let mut store = RecordStore::open(&path, SchemaPolicy::Rewrite).unwrap();

        store.append(&record(&[("B", "1")])).unwrap();
        store.append(&record(&[("B", "2")])).unwrap();
        let outcome = store.append(&record(&[("A", "x"), ("C", "y")])).unwrap();

        assert!(outcome.rewritten);
        assert!(outcome.dropped.is_empty());
        assert_eq!(lines(&path), vec!["A,B,C", ",1,", ",2,", "x,,y"]);
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn test_schema_policy_from_str() {
        assert_eq!("keep-header".parse::<SchemaPolicy>().unwrap(), SchemaPolicy::KeepHeader);
        assert_eq!("rewrite".parse::<SchemaPolicy>().unwrap(), SchemaPolicy::Rewrite);
        assert!("sometimes".parse::<SchemaPolicy>().is_err());
    }
}
