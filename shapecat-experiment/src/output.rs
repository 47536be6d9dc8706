//! Session data files.
//!
//! One file per format is written to the data directory, named
//! `<participant>_<experiment>_<date>.<ext>`.

use serde::{Deserialize, Serialize};
use shapecat_core::{SessionData, TrialRecord};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ExperimentError, Result};

const CSV_HEADER: &str =
    "phase,block,trial,stimulus,correct_key,response,correct,reaction_time,with_noise";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionWriter {
    dir: PathBuf,
    formats: Vec<OutputFormat>,
}

impl SessionWriter {
    pub fn new(dir: impl Into<PathBuf>, formats: Vec<OutputFormat>) -> Self {
        Self {
            dir: dir.into(),
            formats,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_stem(session: &SessionData) -> String {
        format!(
            "{}_{}_{}",
            sanitize(&session.info.participant),
            sanitize(&session.experiment),
            sanitize(&session.date)
        )
    }

    /// Writes every configured format and returns the paths written.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a file cannot be written.
    pub fn write(&self, session: &SessionData) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir).map_err(|source| ExperimentError::DirectoryCreate {
            path: self.dir.clone(),
            source,
        })?;

        let stem = Self::file_stem(session);
        let mut written = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            let path = self.dir.join(format!("{stem}.{}", format.extension()));
            let body = match format {
                OutputFormat::Csv => to_csv(session),
                OutputFormat::Json => serde_json::to_string_pretty(session)?,
            };
            fs::write(&path, body).map_err(|source| ExperimentError::Write {
                path: path.clone(),
                source,
            })?;
            tracing::info!(path = %path.display(), trials = session.trials.len(), "session saved");
            written.push(path);
        }
        Ok(written)
    }
}

/// Renders the trial table, one row per trial in presentation order
pub fn to_csv(session: &SessionData) -> String {
    let mut out = String::with_capacity(64 * (session.trials.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for trial in &session.trials {
        push_row(&mut out, trial);
    }
    out
}

fn push_row(out: &mut String, t: &TrialRecord) {
    let rt = t
        .reaction_time_secs()
        .map(|s| format!("{s:.4}"))
        .unwrap_or_default();
    let response = t.response.map(|k| k.name()).unwrap_or("");
    let _ = writeln!(
        out,
        "{},{},{},{},{},{},{},{},{}",
        t.phase.as_str(),
        t.block,
        t.trial,
        shapecat_core::Stimulus::label(&t.stimulus),
        t.correct_key.name(),
        response,
        t.correct,
        rt,
        t.with_noise
    );
}

fn sanitize(part: &str) -> String {
    let cleaned: String = part
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapecat_core::{BlockKind, ParticipantInfo, ResponseKey, Shape};

    fn session() -> SessionData {
        let info = ParticipantInfo {
            participant: "p01".to_string(),
            session: "001".to_string(),
            ..Default::default()
        };
        let mut s = SessionData::new(info, "Categorization_Task", "2024-05-01_10-00-00");
        s.trials = vec![
            TrialRecord {
                phase: BlockKind::Training,
                block: 1,
                trial: 1,
                stimulus: Shape::Square,
                correct_key: ResponseKey::Z,
                response: Some(ResponseKey::Z),
                correct: true,
                reaction_time_ns: Some(523_400_000),
                with_noise: false,
            },
            TrialRecord {
                phase: BlockKind::Testing,
                block: 1,
                trial: 1,
                stimulus: Shape::Circle,
                correct_key: ResponseKey::M,
                response: None,
                correct: false,
                reaction_time_ns: None,
                with_noise: true,
            },
        ];
        s.completed = true;
        s
    }

    #[test]
    fn test_csv_rows() {
        let csv = to_csv(&session());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "training,1,1,square,z,z,true,0.5234,false");
        assert_eq!(lines[2], "testing,1,1,circle,m,,false,,true");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(
            SessionWriter::file_stem(&session()),
            "p01_Categorization_Task_2024-05-01_10-00-00"
        );
    }

    #[test]
    fn test_sanitize_replaces_path_characters() {
        assert_eq!(sanitize("a/b:c"), "a_b_c");
        assert_eq!(sanitize("  "), "unknown");
    }

    #[test]
    fn test_write_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SessionWriter::new(
            dir.path().join("data"),
            vec![OutputFormat::Csv, OutputFormat::Json],
        );
        let paths = writer.write(&session()).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].extension().is_some_and(|e| e == "csv"));

        let json = fs::read_to_string(&paths[1]).unwrap();
        let back: SessionData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session());
    }

    #[test]
    fn test_write_into_file_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let writer = SessionWriter::new(blocker.join("data"), vec![OutputFormat::Csv]);
        let err = writer.write(&session()).unwrap_err();
        assert!(matches!(err, ExperimentError::DirectoryCreate { .. }));
    }
}
