use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

/// Positional reference to an organization on the index page. The ordinal is the only
/// identity the portal offers, so it is only meaningful against one fetch of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgRef {
    pub ordinal: usize,
    pub name: Option<String>,
    pub href: Option<String>,
}

impl Display for OrgRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {}",
            self.ordinal + 1,
            self.name.as_deref().unwrap_or("<unresolved>")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenderRef {
    pub title: String,
    pub href: String,
}

/// Flat field name to value mapping extracted from one tender detail page.
///
/// Keys are kept sorted, which is also the column order used when the record seeds a new
/// store header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenderRecord {
    fields: BTreeMap<String, String>,
}

impl TenderRecord {
    pub fn new(organization_name: &str) -> Self {
        let mut record = Self::default();
        record.insert(crate::ORGANIZATION_NAME, organization_name);
        record
    }

    /// Last write wins on duplicate keys.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Project the record onto `header`, using empty strings for missing fields.
    pub fn project(&self, header: &[String]) -> Vec<String> {
        header
            .iter()
            .map(|column| self.get(column).unwrap_or_default().to_string())
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TenderRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::default();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Output locations and partition label for one run, fixed at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub raw_path: PathBuf,
    pub filtered_path: PathBuf,
    pub partition_label: String,
}

impl RunContext {
    pub fn new<Tz>(output_dir: impl AsRef<Path>, started_at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let dir = output_dir.as_ref();
        let stamp = started_at.format("%Y%m%d_%H%M%S");
        Self {
            raw_path: dir.join(format!("tender_details_{stamp}.csv")),
            filtered_path: dir.join(format!("filtered_tender_details_{stamp}.csv")),
            partition_label: started_at.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestSummary {
    pub organizations: usize,
    pub organizations_skipped: usize,
    pub tenders_found: usize,
    pub records_written: usize,
    pub tenders_failed: usize,
}

impl Display for HarvestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nStatistics:")?;
        writeln!(f, "  Organizations:          {}", self.organizations)?;
        writeln!(f, "  Organizations skipped:  {}", self.organizations_skipped)?;
        writeln!(f, "  Tenders found:          {}", self.tenders_found)?;
        writeln!(f, "  Records written:        {}", self.records_written)?;
        writeln!(f, "  Tenders failed:         {}", self.tenders_failed)
    }
}
