use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;

/// Fixed header row shared by every sink. Column order is part of the
/// external contract of the log files.
pub const LOG_HEADER: [&str; 7] = [
    "page title",
    "param_name",
    "error status",
    "old value",
    "new value",
    "has value changed?",
    "notes",
];

pub const OK_STATUS: &str = "ok";

/// A sink that cannot take a row is fatal for the whole run: the audit
/// trail is a correctness requirement, not best-effort. Kept as its own
/// type so the driver can classify it through an `anyhow` chain.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("audit sink {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

impl AuditError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Tri-state changed flag: comparison is suppressed for rows where it has
/// no meaning (brand-new params, removals, renames, moves).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Changed {
    Yes,
    No,
    Unknown,
}

impl Changed {
    pub fn compare(before: &str, after: &str) -> Self {
        if before.trim() == after.trim() {
            Self::No
        } else {
            Self::Yes
        }
    }

    pub fn as_field(self) -> &'static str {
        match self {
            Self::Yes => "true",
            Self::No => "false",
            Self::Unknown => "",
        }
    }
}

/// One row of the audit trail: a single mutation attempt, including
/// attempts that changed nothing or failed. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub page_title: String,
    pub param_name: String,
    pub status: String,
    pub value_before: String,
    pub value_after: String,
    pub changed: Changed,
    pub note: String,
}

impl MutationRecord {
    /// A set-value attempt. `before` is `None` for a brand-new parameter,
    /// which suppresses the comparison and attaches the created note.
    pub fn value_change(page_title: &str, param_name: &str, before: Option<&str>, after: &str) -> Self {
        let (value_before, changed, note) = match before {
            Some(previous) => (
                previous.to_string(),
                Changed::compare(previous, after),
                String::new(),
            ),
            None => (String::new(), Changed::Unknown, "param CREATED".to_string()),
        };
        Self {
            page_title: page_title.to_string(),
            param_name: param_name.to_string(),
            status: OK_STATUS.to_string(),
            value_before,
            value_after: after.to_string(),
            changed,
            note,
        }
    }

    pub fn removal(page_title: &str, param_name: &str, old_value: &str) -> Self {
        Self {
            page_title: page_title.to_string(),
            param_name: param_name.to_string(),
            status: OK_STATUS.to_string(),
            value_before: old_value.to_string(),
            value_after: String::new(),
            changed: Changed::Unknown,
            note: "param REMOVED".to_string(),
        }
    }

    pub fn rename(page_title: &str, old_name: &str, new_name: &str) -> Self {
        Self {
            page_title: page_title.to_string(),
            param_name: old_name.to_string(),
            status: OK_STATUS.to_string(),
            value_before: String::new(),
            value_after: String::new(),
            changed: Changed::Unknown,
            note: format!("param RENAMED to: {new_name}"),
        }
    }

    pub fn moved(page_title: &str, param_name: &str, placement: &str) -> Self {
        Self {
            page_title: page_title.to_string(),
            param_name: param_name.to_string(),
            status: OK_STATUS.to_string(),
            value_before: String::new(),
            value_after: String::new(),
            changed: Changed::Unknown,
            note: format!("param MOVED {placement}"),
        }
    }

    pub fn error(
        page_title: &str,
        param_name: &str,
        error_text: &str,
        value_before: &str,
        value_after: &str,
    ) -> Self {
        Self {
            page_title: page_title.to_string(),
            param_name: param_name.to_string(),
            status: error_text.to_string(),
            value_before: value_before.to_string(),
            value_after: value_after.to_string(),
            changed: Changed::compare(value_before, value_after),
            note: String::new(),
        }
    }

    pub fn note(page_title: &str, param_name: &str, note: &str) -> Self {
        Self {
            page_title: page_title.to_string(),
            param_name: param_name.to_string(),
            status: OK_STATUS.to_string(),
            value_before: String::new(),
            value_after: String::new(),
            changed: Changed::Unknown,
            note: note.to_string(),
        }
    }

    fn as_row(&self) -> [&str; 7] {
        [
            &self.page_title,
            &self.param_name,
            &self.status,
            &self.value_before,
            &self.value_after,
            self.changed.as_field(),
            &self.note,
        ]
    }
}

struct Sink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

/// Append-only structured recorder, fanned out to every sink. Each append
/// is flushed before the call returns so a crash never loses the trail.
pub struct AuditLog {
    sinks: Vec<Sink>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field(
                "sinks",
                &self.sinks.iter().map(|s| &s.path).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl AuditLog {
    /// Truncate (or create) each sink and write the header row once.
    /// Missing parent directories are created.
    pub fn open(paths: &[PathBuf]) -> Result<Self, AuditError> {
        let mut sinks = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).map_err(|source| AuditError::io(path, source))?;
            }
            let file = File::create(path).map_err(|source| AuditError::io(path, source))?;
            let mut writer = csv::Writer::from_writer(file);
            writer
                .write_record(LOG_HEADER)
                .map_err(|source| AuditError::csv(path, source))?;
            writer
                .flush()
                .map_err(|source| AuditError::io(path, source))?;
            sinks.push(Sink {
                path: path.clone(),
                writer,
            });
        }
        Ok(Self { sinks })
    }

    /// Serialize the record as one row and append it to every sink.
    /// Partial failure aborts with the failing sink's error.
    pub fn append(&mut self, record: &MutationRecord) -> Result<(), AuditError> {
        for sink in &mut self.sinks {
            sink.writer
                .write_record(record.as_row())
                .map_err(|source| AuditError::csv(&sink.path, source))?;
            sink.writer
                .flush()
                .map_err(|source| AuditError::io(&sink.path, source))?;
        }
        Ok(())
    }

    pub fn sink_paths(&self) -> Vec<PathBuf> {
        self.sinks.iter().map(|sink| sink.path.clone()).collect()
    }
}

/// Filename-compatible timestamp identifying one run.
pub fn run_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H-%M-%S").to_string()
}

pub fn run_log_path(dir: &Path, timestamp: &str) -> PathBuf {
    dir.join(format!("{timestamp}.csv"))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .expect("open log");
        reader
            .records()
            .map(|record| {
                record
                    .expect("row")
                    .iter()
                    .map(|field| field.to_string())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn open_writes_header_to_every_sink() {
        let temp = tempdir().expect("tempdir");
        let paths = vec![
            temp.path().join("logfile.csv"),
            temp.path().join("logfiles").join("run.csv"),
        ];
        AuditLog::open(&paths).expect("open");

        for path in &paths {
            let rows = read_rows(path);
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0], LOG_HEADER.map(str::to_string).to_vec());
        }
    }

    #[test]
    fn append_fans_out_identical_rows() {
        let temp = tempdir().expect("tempdir");
        let paths = vec![temp.path().join("a.csv"), temp.path().join("b.csv")];
        let mut log = AuditLog::open(&paths).expect("open");

        log.append(&MutationRecord::value_change(
            "Vanguard",
            "crew",
            Some("5"),
            "6",
        ))
        .expect("append");
        log.append(&MutationRecord::removal("Vanguard", "shield", "old"))
            .expect("append");

        let first = read_rows(&paths[0]);
        let second = read_rows(&paths[1]);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(
            first[1],
            vec!["Vanguard", "crew", "ok", "5", "6", "true", ""]
        );
        assert_eq!(
            first[2],
            vec!["Vanguard", "shield", "ok", "old", "", "", "param REMOVED"]
        );
    }

    #[test]
    fn value_change_changed_flag_semantics() {
        let created = MutationRecord::value_change("P", "crew", None, "5");
        assert_eq!(created.changed, Changed::Unknown);
        assert_eq!(created.note, "param CREATED");

        let unchanged = MutationRecord::value_change("P", "crew", Some("5"), "5");
        assert_eq!(unchanged.changed, Changed::No);
        assert!(unchanged.note.is_empty());

        let changed = MutationRecord::value_change("P", "crew", Some("5"), "6");
        assert_eq!(changed.changed, Changed::Yes);
    }

    #[test]
    fn error_record_carries_free_text_status() {
        let record = MutationRecord::error("P", "crew", "param is not present", "", "");
        assert_eq!(record.status, "param is not present");
        assert_eq!(record.changed, Changed::No);
    }

    #[test]
    fn rows_survive_fields_with_commas_and_quotes() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("log.csv");
        let mut log = AuditLog::open(std::slice::from_ref(&path)).expect("open");
        log.append(&MutationRecord::value_change(
            "Page, the \"first\"",
            "crew",
            Some("1, 2"),
            "3",
        ))
        .expect("append");

        let rows = read_rows(&path);
        assert_eq!(rows[1][0], "Page, the \"first\"");
        assert_eq!(rows[1][3], "1, 2");
    }

    #[test]
    fn open_fails_for_unwritable_sink() {
        let temp = tempdir().expect("tempdir");
        // a directory cannot be opened as a log file
        let err = AuditLog::open(&[temp.path().to_path_buf()]).expect_err("must fail");
        assert!(err.to_string().contains("audit sink"));
    }

    #[test]
    fn run_log_path_uses_timestamped_filename() {
        let path = run_log_path(Path::new("logfiles"), "2026-08-06 12-00-00");
        assert_eq!(path, Path::new("logfiles").join("2026-08-06 12-00-00.csv"));
    }

    #[test]
    fn run_timestamp_is_filename_compatible() {
        let stamp = run_timestamp();
        assert_eq!(stamp.len(), "2026-08-06 12-00-00".len());
        assert!(!stamp.contains(':'));
        assert!(!stamp.contains('/'));
    }
}
