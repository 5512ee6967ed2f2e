// Copyright 2025 hookscope contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Report persistence: the sink trait and the filesystem implementation.

use super::document::ReportDocument;
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// Errors a report sink can produce.
#[derive(Debug)]
pub enum ReportError {
    /// The target directory could not be created.
    DirectoryCreate {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The report file could not be written.
    Write {
        /// File that failed.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The document did not serialize.
    Serialize(serde_json::Error),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectoryCreate { path, source } => {
                write!(f, "failed to create report directory '{}': {source}", path.display())
            }
            Self::Write { path, source } => {
                write!(f, "failed to write report '{}': {source}", path.display())
            }
            Self::Serialize(err) => write!(f, "failed to serialize report: {err}"),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DirectoryCreate { source, .. } | Self::Write { source, .. } => Some(source),
            Self::Serialize(err) => Some(err),
        }
    }
}

/// Somewhere a finished report can go.
pub trait ReportSink {
    /// Persists `document` under `filename`.
    fn save(&self, filename: &str, document: &ReportDocument) -> Result<(), ReportError>;
}

/// Classifies a report by how the profiled run was started. Most specific
/// wins: a scheduled job on a CLI counts as `cron`, not `cli`.
pub fn report_type(document: &ReportDocument) -> &'static str {
    let mut kind = "web";
    if document.is_cli == Some(true) {
        kind = "cli";
    }
    if document.cli_command.is_some() {
        kind = "command";
    }
    if document.is_cron {
        kind = "cron";
    }
    if document.is_ajax {
        kind = "ajax";
    }
    kind
}

/// Writes reports as pretty-printed JSON under
/// `<base>/profiler/<report type>/<filename>`.
///
/// The report type is one of `web`, `cli`, `command`, `cron` or `ajax`, per
/// [`report_type`]; consumers watching the output tree should match on that
/// set. `command` covers tool-driven runs that carry a CLI subcommand.
#[derive(Debug, Clone)]
pub struct FileSystemReporter {
    base: PathBuf,
}

impl FileSystemReporter {
    /// Creates a reporter rooted at `base`. Nothing is created until the
    /// first save.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The directory a document of this kind would land in.
    pub fn target_dir(&self, document: &ReportDocument) -> PathBuf {
        self.base.join("profiler").join(report_type(document))
    }
}

impl ReportSink for FileSystemReporter {
    fn save(&self, filename: &str, document: &ReportDocument) -> Result<(), ReportError> {
        let dir = self.target_dir(document);
        fs::create_dir_all(&dir).map_err(|source| ReportError::DirectoryCreate {
            path: dir.clone(),
            source,
        })?;

        let body = serde_json::to_string_pretty(document).map_err(ReportError::Serialize)?;
        let path = dir.join(filename);
        fs::write(&path, body).map_err(|source| ReportError::Write {
            path: path.clone(),
            source,
        })?;
        log::info!("profiler report written to {}", path.display());
        Ok(())
    }
}

/// A sink that keeps documents in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: std::cell::RefCell<Vec<(String, ReportDocument)>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filenames and documents saved so far.
    pub fn saved(&self) -> std::cell::Ref<'_, Vec<(String, ReportDocument)>> {
        self.saved.borrow()
    }
}

impl ReportSink for MemorySink {
    fn save(&self, filename: &str, document: &ReportDocument) -> Result<(), ReportError> {
        self.saved
            .borrow_mut()
            .push((filename.to_string(), document.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn document() -> ReportDocument {
        ReportDocument {
            server: Some("localhost".to_string()),
            url: "/".to_string(),
            timestamp: 1_700_000_000,
            method: "GET".to_string(),
            referer: None,
            total_time: 0.25,
            total_human_time: "0.250000".to_string(),
            memory_used: 1024,
            peak_memory_used: 2048,
            is_cron: false,
            is_ajax: false,
            is_cli: None,
            cli_command: None,
            collectors: BTreeMap::new(),
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn report_type_precedence() {
        let mut doc = document();
        assert_eq!(report_type(&doc), "web");

        doc.is_cli = Some(true);
        assert_eq!(report_type(&doc), "cli");

        doc.cli_command = Some("sync".to_string());
        assert_eq!(report_type(&doc), "command");

        doc.is_cron = true;
        assert_eq!(report_type(&doc), "cron");

        doc.is_ajax = true;
        assert_eq!(report_type(&doc), "ajax");
    }

    #[test]
    fn save_creates_type_directory_and_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = FileSystemReporter::new(dir.path());

        let doc = document();
        reporter.save("report.json", &doc).unwrap();

        let path = dir.path().join("profiler").join("web").join("report.json");
        let body = fs::read_to_string(&path).unwrap();
        let parsed: ReportDocument = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.url, "/");
        assert_eq!(parsed.timestamp, 1_700_000_000);
    }

    #[test]
    fn unwritable_base_reports_directory_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"a plain file").unwrap();

        // profiler/ cannot be created below a regular file.
        let reporter = FileSystemReporter::new(&blocker);
        let err = reporter.save("report.json", &document()).unwrap_err();
        assert!(matches!(err, ReportError::DirectoryCreate { .. }));
    }

    #[test]
    fn memory_sink_collects_documents() {
        let sink = MemorySink::new();
        sink.save("a.json", &document()).unwrap();
        sink.save("b.json", &document()).unwrap();
        assert_eq!(sink.saved().len(), 2);
        assert_eq!(sink.saved()[0].0, "a.json");
    }
}
