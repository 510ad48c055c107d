use std::fs;
use std::path::Path;

use crate::store::read_rows;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Column subset of the record store whose fill rate is above the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredView {
    pub columns: Vec<String>,
    pub fill_counts: Vec<usize>,
    pub rows: Vec<Vec<String>>,
}

impl FilteredView {
    pub fn write(&self, path: &Path) -> Result<(), FilterError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| FilterError::Io(e.into_error()))?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

/// Keep the columns of `header` that are non-empty in strictly more than
/// `threshold * rows.len()` rows. Returns `None` when there are no rows.
pub fn filter_rows(header: &[String], rows: &[Vec<String>], threshold: f64) -> Option<FilteredView> {
    if rows.is_empty() {
        return None;
    }

    let counts: Vec<usize> = (0..header.len())
        .map(|i| {
            rows.iter()
                .filter(|row| row.get(i).is_some_and(|v| !v.trim().is_empty()))
                .count()
        })
        .collect();

    let cutoff = threshold * rows.len() as f64;
    let mut selected: Vec<(usize, &String)> = header
        .iter()
        .enumerate()
        .filter(|(i, _)| counts[*i] as f64 > cutoff)
        .collect();
    selected.sort_by(|a, b| a.1.cmp(b.1));

    Some(FilteredView {
        columns: selected.iter().map(|(_, name)| (*name).clone()).collect(),
        fill_counts: selected.iter().map(|(i, _)| counts[*i]).collect(),
        rows: rows
            .iter()
            .map(|row| {
                selected
                    .iter()
                    .map(|(i, _)| row.get(*i).cloned().unwrap_or_default())
                    .collect()
            })
            .collect(),
    })
}

/// Read the record store at `path` and filter it by column density.
pub fn filter_store(path: &Path, threshold: f64) -> Result<Option<FilteredView>, FilterError> {
    let (header, rows) = read_rows(path)?;
    let total = rows.len();
    log::info!("Analyzing {} rows for column density...", total);

    let Some(view) = filter_rows(&header, &rows, threshold) else {
        log::info!("No data found to filter.");
        return Ok(None);
    };

    log::info!(
        "Selected {} of {} columns with fill rate above {:.0}%:",
        view.columns.len(),
        header.len(),
        threshold * 100.0
    );
    for (column, count) in view.columns.iter().zip(&view.fill_counts) {
        log::info!("  - {} ({}/{})", column, count, total);
    }
    Ok(Some(view))
}
