//! On-disk checkpoint of the record logs.
//!
//! Each subject gets two JSON-lines files in the data directory:
//!
//! ```text
//! subject_{id}_history.jsonl     last `history_capacity` records, oldest first
//! subject_{id}_anomalies.jsonl   anomaly log, oldest first
//! ```
//!
//! Every line is one `{"timestamp": ..., "data": ...}` object. Files are
//! replaced atomically (write to a temporary file, then rename).

use crate::core::{PersistedRecord, StoreError, StoreKind, TelemetryStore};
use crate::source::SubjectId;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Encode one record as a single JSON line (without the newline).
pub fn encode_record(record: &PersistedRecord) -> Result<String, StoreError> {
    serde_json::to_string(record).map_err(|e| StoreError::Parse(e.to_string()))
}

/// Decode one JSON line into a record.
pub fn decode_record(line: &str) -> Result<PersistedRecord, StoreError> {
    serde_json::from_str(line).map_err(|e| StoreError::Parse(e.to_string()))
}

/// Summary of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub subjects: usize,
    pub records: usize,
    pub skipped_lines: usize,
}

/// The JSON-lines files backing a `TelemetryStore`.
#[derive(Debug, Clone)]
pub struct StoreFiles {
    dir: PathBuf,
}

impl StoreFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding one log of one subject.
    pub fn path(&self, subject_id: SubjectId, kind: StoreKind) -> PathBuf {
        self.dir.join(file_name(subject_id, kind))
    }

    /// Write every subject's logs to disk.
    pub fn save(&self, store: &TelemetryStore) -> Result<usize, StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io(e.to_string()))?;

        let mut written = 0;
        for subject_id in store.subjects() {
            for kind in StoreKind::ALL {
                let records = store.read_all(subject_id, kind);
                self.write_atomic(&self.path(subject_id, kind), &records)?;
                written += records.len();
            }
        }
        Ok(written)
    }

    /// Restore every log file found in the directory into `store`.
    ///
    /// Lines that fail to parse are skipped with a warning. A missing
    /// directory is not an error; there is simply nothing to restore.
    pub fn load(&self, store: &TelemetryStore) -> Result<LoadReport, StoreError> {
        let mut report = LoadReport::default();
        if !self.dir.exists() {
            return Ok(report);
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|e| StoreError::Io(e.to_string()))?;
        let mut files: Vec<(SubjectId, StoreKind, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let name = path.file_name()?.to_str()?.to_string();
                let (subject_id, kind) = parse_file_name(&name)?;
                Some((subject_id, kind, path))
            })
            .collect();
        files.sort_by_key(|(id, kind, _)| (*id, kind.as_str()));

        let mut subjects: Vec<SubjectId> = Vec::new();
        for (subject_id, kind, path) in files {
            let file = std::fs::File::open(&path).map_err(|e| StoreError::Io(e.to_string()))?;
            for (line_no, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(|e| StoreError::Io(e.to_string()))?;
                if line.trim().is_empty() {
                    continue;
                }
                let record = match decode_record(&line) {
                    Ok(record) if record.subject_id() == subject_id => record,
                    Ok(record) => {
                        tracing::warn!(
                            "Skipping record for subject {} found in {:?}",
                            record.subject_id(),
                            path
                        );
                        report.skipped_lines += 1;
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Skipping {:?} line {}: {e}", path, line_no + 1);
                        report.skipped_lines += 1;
                        continue;
                    }
                };
                match store.append(kind, record) {
                    Ok(()) => report.records += 1,
                    Err(e) => {
                        tracing::warn!("Skipping {:?} line {}: {e}", path, line_no + 1);
                        report.skipped_lines += 1;
                    }
                }
            }
            if !subjects.contains(&subject_id) {
                subjects.push(subject_id);
            }
        }

        report.subjects = subjects.len();
        Ok(report)
    }

    fn write_atomic(&self, path: &Path, records: &[PersistedRecord]) -> Result<(), StoreError> {
        let tmp = path.with_extension("jsonl.tmp");
        {
            let file = std::fs::File::create(&tmp).map_err(|e| StoreError::Io(e.to_string()))?;
            let mut writer = std::io::BufWriter::new(file);
            for record in records {
                let line = encode_record(record)?;
                writeln!(writer, "{line}").map_err(|e| StoreError::Io(e.to_string()))?;
            }
            writer.flush().map_err(|e| StoreError::Io(e.to_string()))?;
        }
        std::fs::rename(&tmp, path).map_err(|e| StoreError::Io(e.to_string()))
    }
}

fn kind_suffix(kind: StoreKind) -> &'static str {
    match kind {
        StoreKind::History => "history",
        StoreKind::Anomaly => "anomalies",
    }
}

fn file_name(subject_id: SubjectId, kind: StoreKind) -> String {
    format!("subject_{subject_id}_{}.jsonl", kind_suffix(kind))
}

fn parse_file_name(name: &str) -> Option<(SubjectId, StoreKind)> {
    let rest = name.strip_prefix("subject_")?.strip_suffix(".jsonl")?;
    let (id, suffix) = rest.split_once('_')?;
    let kind = StoreKind::ALL
        .into_iter()
        .find(|kind| kind_suffix(*kind) == suffix)?;
    Some((id.parse().ok()?, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::test_support::record_at;
    use crate::core::AnomalyRetention;

    #[test]
    fn test_record_line_round_trip() {
        let record = record_at(5, 77, true);
        let line = encode_record(&record).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(decode_record(&line).unwrap(), record);
    }

    #[test]
    fn test_file_names() {
        let files = StoreFiles::new("/data");
        assert_eq!(
            files.path(3, StoreKind::History),
            PathBuf::from("/data/subject_3_history.jsonl")
        );
        assert_eq!(
            parse_file_name("subject_12_anomalies.jsonl"),
            Some((12, StoreKind::Anomaly))
        );
        assert_eq!(parse_file_name("subject_x_history.jsonl"), None);
        assert_eq!(parse_file_name("ingest_stats.json"), None);
    }

    #[test]
    fn test_save_and_load_restores_logs() {
        let dir = tempfile::tempdir().unwrap();
        let files = StoreFiles::new(dir.path());

        let store = TelemetryStore::default();
        for secs in 0..700 {
            store.ingest(record_at(1, secs, secs % 50 == 0));
            store.ingest(record_at(2, secs, false));
        }
        files.save(&store).unwrap();

        let restored = TelemetryStore::default();
        let report = files.load(&restored).unwrap();
        assert_eq!(report.subjects, 2);
        assert_eq!(report.skipped_lines, 0);

        for subject in [1, 2] {
            for kind in StoreKind::ALL {
                assert_eq!(
                    restored.read_all(subject, kind),
                    store.read_all(subject, kind)
                );
            }
        }
    }

    #[test]
    fn test_load_trims_to_capacity_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let files = StoreFiles::new(dir.path());

        let mut content = String::new();
        for secs in 0..10 {
            content.push_str(&encode_record(&record_at(4, secs, false)).unwrap());
            content.push('\n');
        }
        content.push_str("{not json}\n");
        std::fs::write(files.path(4, StoreKind::History), content).unwrap();

        let store = TelemetryStore::new(4, AnomalyRetention::Unbounded);
        let report = files.load(&store).unwrap();

        assert_eq!(report.skipped_lines, 1);
        let all = store.read_all(4, StoreKind::History);
        assert_eq!(all.len(), 4);
        assert_eq!(all[0], record_at(4, 6, false));
    }

    #[test]
    fn test_load_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = StoreFiles::new(dir.path().join("absent"));
        let store = TelemetryStore::default();
        assert_eq!(files.load(&store).unwrap(), LoadReport::default());
        assert!(store.is_empty());
    }
}
