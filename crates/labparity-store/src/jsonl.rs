//! Snapshot file format.
//!
//! The whole portal state is stored as one JSONL snapshot: every record on
//! its own line, tagged by `kind`. Saving always rewrites the full snapshot
//! through a sibling temp file that is renamed over the old one, so readers
//! only ever see a complete snapshot.

use crate::record::Record;
use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("failed to read snapshot {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write snapshot {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("snapshot line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Decode records, skipping blank lines.
pub fn parse_snapshot(reader: impl BufRead) -> Result<Vec<Record>, JsonlError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| JsonlError::Parse {
            line: line_no,
            message: e.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| JsonlError::Parse {
            line: line_no,
            message: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

pub fn load_snapshot(path: &Path) -> Result<Vec<Record>, JsonlError> {
    let file = File::open(path).map_err(|source| JsonlError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_snapshot(io::BufReader::new(file))
}

/// Replace the snapshot at `path` with `records`.
pub fn save_snapshot(path: &Path, records: &[Record]) -> Result<(), JsonlError> {
    let write_error = |source| JsonlError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir).map_err(write_error)?;
    }

    let mut lines = Vec::with_capacity(records.len());
    for record in records {
        lines.push(serde_json::to_string(record)?);
    }

    let staging = staging_path(path);
    let staged = File::create(&staging).and_then(|file| {
        let mut out = BufWriter::new(file);
        for line in &lines {
            writeln!(out, "{line}")?;
        }
        out.into_inner().map_err(io::IntoInnerError::into_error)?.sync_all()
    });
    if let Err(source) = staged.and_then(|()| fs::rename(&staging, path)) {
        let _ = fs::remove_file(&staging);
        return Err(write_error(source));
    }
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    path.with_file_name(format!(".{name}.{}.staging", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Setting, Submission};
    use chrono::Utc;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(label: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "labparity-snapshot-{label}-{}-{unique}",
            std::process::id()
        ))
    }

    #[test]
    fn saved_snapshot_loads_back_without_staging_leftovers() {
        let dir = scratch_dir("save");
        let path = dir.join("portal.jsonl");
        let records = vec![
            Record::Submission(Submission {
                lab: "lab1".to_string(),
                url: "http://a.example".to_string(),
                name: "Ada".to_string(),
                added_at: Utc::now(),
            }),
            Record::Setting(Setting {
                key: "baseline_url".to_string(),
                value: "http://base.example".to_string(),
                updated_at: Utc::now(),
            }),
        ];
        save_snapshot(&path, &records).expect("save");
        assert_eq!(load_snapshot(&path).expect("load"), records);

        let text = fs::read_to_string(&path).expect("snapshot text");
        assert!(text.lines().next().is_some_and(|l| l.contains(r#""kind":"submission""#)));
        let entries: Vec<_> = fs::read_dir(&dir).expect("list dir").collect();
        assert_eq!(entries.len(), 1);

        save_snapshot(&path, &records[1..]).expect("overwrite");
        assert_eq!(load_snapshot(&path).expect("reload").len(), 1);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn parse_reports_the_bad_line() {
        let input = "\n{\"kind\":\"setting\",\"key\":\"k\",\"value\":\"v\",\"updated_at\":\"2024-01-01T00:00:00Z\"}\n{\"kind\":\"bogus\"}\n";
        match parse_snapshot(input.as_bytes()) {
            Err(JsonlError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn non_utf8_snapshot_is_a_parse_error() {
        let bytes: &[u8] = &[0xff, 0xfe, 0xfd, b'\n'];
        assert!(matches!(
            parse_snapshot(bytes),
            Err(JsonlError::Parse { line: 1, .. })
        ));
    }
}
