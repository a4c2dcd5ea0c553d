use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::config::LedgerConfig;
use crate::golf::extractor::ConfirmationRecord;

/// Append-only CSV ledger of accepted confirmations.
///
/// Records are written in append order; nothing is merged or deduplicated.
/// The run's records are also kept in memory so the end-of-run summary can
/// group them by course and date.
pub struct Ledger {
    path: PathBuf,
    records: Mutex<Vec<ConfirmationRecord>>,
}

impl Ledger {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let path = PathBuf::from(&config.output_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Unable to create ledger directory {}", parent.display()))?;
            }
        }

        info!("Ledger output: {}", path.display());

        Ok(Ledger {
            path,
            records: Mutex::new(Vec::new()),
        })
    }

    /// Append one record to the CSV file. The header row is written only
    /// when the file is new or empty.
    pub fn append(&self, record: &ConfirmationRecord) -> Result<()> {
        let write_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Unable to open ledger file {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);

        writer.serialize(record)
            .context("Unable to serialize confirmation record")?;
        writer.flush()
            .context("Unable to flush ledger file")?;

        debug!("Appended confirmation for '{}' on {} to ledger",
               record.course_name, record.date);

        self.lock_records().push(record.clone());

        Ok(())
    }

    /// Records appended during this run, in append order
    pub fn records(&self) -> Vec<ConfirmationRecord> {
        self.lock_records().clone()
    }

    /// Log the run's records grouped by (course, date)
    pub fn log_summary(&self) {
        let records = self.lock_records();

        if records.is_empty() {
            info!("Ledger summary: no confirmations recorded this run");
            return;
        }

        let mut by_course: BTreeMap<(String, String), (usize, f64)> = BTreeMap::new();
        for record in records.iter() {
            let entry = by_course
                .entry((record.course_name.clone(), record.date.clone()))
                .or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += record.course_fees;
        }

        info!("Ledger summary ({} record(s) this run):", records.len());
        for ((course, date), (count, fees)) in &by_course {
            info!("  {} on {}: {} record(s), {:.2} in course fees", course, date, count, fees);
        }
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, Vec<ConfirmationRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
