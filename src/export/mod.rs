// Export module - turns the note log into a downloadable CSV
// Every field is quoted so notes with commas, quotes or newlines survive

use crate::config::ExportConfig;
use crate::session::NoteLog;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const HEADER: [&str; 2] = ["uri", "comment"];

/// Encode notes as `uri,comment` CSV. An empty log still gets the header.
pub fn encode_notes(notes: &NoteLog) -> String {
    let mut lines = Vec::with_capacity(notes.len() + 1);
    lines.push(HEADER.join(","));

    for note in notes {
        lines.push(format!("{},{}", quote(note.track.as_str()), quote(&note.text)));
    }

    lines.join("\n")
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Where an export ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReceipt {
    pub path: PathBuf,
    pub rows: usize,
}

pub struct ExportManager {
    directory: PathBuf,
    file_prefix: String,
}

impl ExportManager {
    pub fn new(directory: impl Into<PathBuf>, file_prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_prefix: file_prefix.into(),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.directory.clone(), config.file_prefix.clone())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `<prefix>_2024-05-01T12-30-45-123Z.csv`
    pub fn file_name(&self, at: DateTime<Utc>) -> String {
        let stamp = at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        format!("{}_{}.csv", self.file_prefix, stamp)
    }

    /// Write the notes out now. Callers warn about empty logs beforehand;
    /// an empty log is still written (header only).
    pub fn export(&self, notes: &NoteLog) -> Result<ExportReceipt> {
        self.export_at(notes, Utc::now())
    }

    pub fn export_at(&self, notes: &NoteLog, at: DateTime<Utc>) -> Result<ExportReceipt> {
        if notes.is_empty() {
            warn!("Exporting an empty note log");
        }

        fs::create_dir_all(&self.directory)
            .with_context(|| format!("Failed to create {}", self.directory.display()))?;

        let path = self.directory.join(self.file_name(at));
        fs::write(&path, encode_notes(notes))
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!("Exported {} notes to {}", notes.len(), path.display());
        Ok(ExportReceipt {
            path,
            rows: notes.len(),
        })
    }
}

/// Result of asking for an export
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Nothing written; the log is empty and the next request will go through
    NeedsConfirmation,
    Exported(ExportReceipt),
}

/// Export behind a one-step confirmation for empty logs.
/// The first request on an empty log only warns; asking again writes the
/// header-only file. Any other action in between should `reset` it.
pub struct ExportPrompt {
    manager: ExportManager,
    confirm_empty: bool,
}

impl ExportPrompt {
    pub fn new(manager: ExportManager) -> Self {
        Self {
            manager,
            confirm_empty: false,
        }
    }

    pub fn request(&mut self, notes: &NoteLog) -> Result<ExportOutcome> {
        if notes.is_empty() && !self.confirm_empty {
            self.confirm_empty = true;
            return Ok(ExportOutcome::NeedsConfirmation);
        }

        self.confirm_empty = false;
        self.manager.export(notes).map(ExportOutcome::Exported)
    }

    pub fn reset(&mut self) {
        self.confirm_empty = false;
    }

    pub fn is_confirming(&self) -> bool {
        self.confirm_empty
    }

    pub fn manager(&self) -> &ExportManager {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Note;
    use crate::tracks::{IdentifierParser, TrackIdentifier};
    use chrono::TimeZone;

    fn log(entries: &[(&str, &str)]) -> NoteLog {
        entries
            .iter()
            .map(|(token, text)| Note {
                track: TrackIdentifier::from_token(token).unwrap(),
                text: text.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_quotes_and_escapes_every_field() {
        let notes = log(&[("abc", "great \"drop\", meh outro"), ("def", "")]);
        assert_eq!(
            encode_notes(&notes),
            "uri,comment\n\"spotify:track:abc\",\"great \"\"drop\"\", meh outro\"\n\"spotify:track:def\",\"\""
        );
    }

    #[test]
    fn test_empty_log_is_header_only() {
        assert_eq!(encode_notes(&NoteLog::new()), "uri,comment");
    }

    #[test]
    fn test_identifiers_survive_reimport() {
        let notes = log(&[
            ("abc", "multi\nline, \"quoted\""),
            ("def", ","),
            ("abc", "dup"),
        ]);
        let reparsed = IdentifierParser::new().parse_str(&encode_notes(&notes));
        let original: Vec<_> = notes.iter().map(|n| n.track.clone()).collect();
        assert_eq!(reparsed.as_slice(), original.as_slice());
    }

    #[test]
    fn test_file_name_is_timestamped() {
        let manager = ExportManager::new(".", "spotify_notes");
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(manager.file_name(at), "spotify_notes_2024-05-01T12-30-45-123Z.csv");
    }

    #[test]
    fn test_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ExportManager::new(dir.path().join("out"), "notes");
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let receipt = manager.export_at(&log(&[("abc", "ok")]), at).unwrap();
        assert_eq!(receipt.rows, 1);
        assert_eq!(receipt.path, dir.path().join("out").join("notes_2024-01-02T03-04-05-000Z.csv"));

        let written = std::fs::read_to_string(&receipt.path).unwrap();
        assert_eq!(written, "uri,comment\n\"spotify:track:abc\",\"ok\"");

        let empty = manager.export(&NoteLog::new()).unwrap();
        assert_eq!(empty.rows, 0);
        assert_eq!(std::fs::read_to_string(&empty.path).unwrap(), "uri,comment");
    }

    fn written_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[test]
    fn test_empty_export_needs_second_request() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut prompt = ExportPrompt::new(ExportManager::new(&out, "notes"));

        let first = prompt.request(&NoteLog::new()).unwrap();
        assert_eq!(first, ExportOutcome::NeedsConfirmation);
        assert!(prompt.is_confirming());
        assert_eq!(written_files(&out), 0);

        let ExportOutcome::Exported(receipt) = prompt.request(&NoteLog::new()).unwrap() else {
            panic!("second request should export");
        };
        assert_eq!(receipt.rows, 0);
        assert_eq!(std::fs::read_to_string(&receipt.path).unwrap(), "uri,comment");
        assert!(!prompt.is_confirming());
    }

    #[test]
    fn test_reset_requires_confirming_again() {
        let dir = tempfile::tempdir().unwrap();
        let mut prompt = ExportPrompt::new(ExportManager::new(dir.path(), "notes"));

        prompt.request(&NoteLog::new()).unwrap();
        prompt.reset();
        assert_eq!(prompt.request(&NoteLog::new()).unwrap(), ExportOutcome::NeedsConfirmation);
        assert_eq!(written_files(dir.path()), 0);
    }

    #[test]
    fn test_notes_export_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut prompt = ExportPrompt::new(ExportManager::new(dir.path(), "notes"));

        let ExportOutcome::Exported(receipt) = prompt.request(&log(&[("abc", "ok")])).unwrap() else {
            panic!("non-empty log should export on first request");
        };
        assert_eq!(receipt.rows, 1);
        assert_eq!(written_files(dir.path()), 1);
    }
}
