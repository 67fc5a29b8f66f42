//! Folder importer
//!
//! Discovers OCA package files in a folder and writes each one to a graph
//! store. Files are processed one at a time in name order, so when two
//! packages declare the same attribute the later file's overlays win.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::graph::{GraphStore, ImportOutcome, ImportRunSummary, Statement, import_statements};
use crate::oca::{load_schema_file, schema_name_from_path};

/// `.json` files directly inside `folder`, sorted by file name
pub fn discover_schema_files(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.exists() {
        return Err(Error::FolderNotFound(folder.display().to_string()));
    }
    if !folder.is_dir() {
        return Err(Error::NotADirectory(folder.display().to_string()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let is_json = path
            .file_name()
            .map(|n| n.to_string_lossy().ends_with(".json"))
            .unwrap_or(false);
        if is_json && path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(Error::NoSchemaFiles(folder.display().to_string()));
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// What happened to one file
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileResult {
    Imported(ImportOutcome),
    /// Dry run: the statements that would have been sent to Neo4j
    Planned { schema_id: String, statements: Vec<Statement> },
    Failed { code: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub file: PathBuf,
    pub schema_name: String,
    pub result: FileResult,
}

impl FileOutcome {
    fn failed(file: &Path, schema_name: String, e: &Error) -> Self {
        Self {
            file: file.to_path_buf(),
            schema_name,
            result: FileResult::Failed {
                code: e.code().to_string(),
                message: e.to_string(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.result, FileResult::Failed { .. })
    }
}

/// Summary of one folder import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub run_id: String,
    pub folder: PathBuf,
    pub dry_run: bool,
    pub files: Vec<FileOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ImportReport {
    pub fn imported(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.result, FileResult::Imported(_)))
            .count()
    }

    pub fn planned(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.result, FileResult::Planned { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| f.is_failure()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn to_run_summary(&self) -> ImportRunSummary {
        ImportRunSummary {
            id: self.run_id.clone(),
            folder: self.folder.display().to_string(),
            files_total: self.files.len() as u64,
            files_imported: self.imported() as u64,
            files_failed: self.failed() as u64,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Imports OCA package folders into a graph store
pub struct Importer {
    store: Arc<dyn GraphStore>,
    dry_run: bool,
}

impl Importer {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            dry_run: false,
        }
    }

    /// Parse and plan without writing
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Import every package in `folder`
    ///
    /// Invalid files are reported and skipped. Errors that would fail every
    /// file (unreachable store, bad credentials) abort the run.
    pub async fn import_folder(&self, folder: &Path) -> Result<ImportReport> {
        let files = discover_schema_files(folder)?;
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        info!(
            run_id = %run_id,
            folder = %folder.display(),
            files = files.len(),
            dry_run = self.dry_run,
            backend = %self.store.backend(),
            "Starting import"
        );

        let mut outcomes = Vec::with_capacity(files.len());
        for path in &files {
            outcomes.push(self.import_file(path).await?);
        }

        let report = ImportReport {
            run_id,
            folder: folder.to_path_buf(),
            dry_run: self.dry_run,
            files: outcomes,
            started_at,
            finished_at: Utc::now(),
        };

        if !self.dry_run {
            if let Err(e) = self.store.record_import_run(&report.to_run_summary()).await {
                warn!(error = %e, "Failed to record import run");
            }
        }

        info!(
            run_id = %report.run_id,
            imported = report.imported(),
            failed = report.failed(),
            "Import finished"
        );
        Ok(report)
    }

    /// Import a single package file
    pub async fn import_file(&self, path: &Path) -> Result<FileOutcome> {
        let schema_name = schema_name_from_path(path);

        let record = match load_schema_file(path) {
            Ok(record) => record,
            Err(e) => {
                error!(file = %path.display(), error = %e, "Failed to read schema");
                return Ok(FileOutcome::failed(path, schema_name, &e));
            }
        };

        if self.dry_run {
            return Ok(FileOutcome {
                file: path.to_path_buf(),
                schema_name,
                result: FileResult::Planned {
                    schema_id: record.id.clone(),
                    statements: import_statements(&record),
                },
            });
        }

        match self.store.import_schema(&record).await {
            Ok(outcome) => {
                info!(
                    schema = %outcome.schema_name,
                    id = %outcome.schema_id,
                    created = outcome.created,
                    "Imported schema"
                );
                Ok(FileOutcome {
                    file: path.to_path_buf(),
                    schema_name,
                    result: FileResult::Imported(outcome),
                })
            }
            Err(e) if e.is_per_file() => {
                error!(file = %path.display(), error = %e, "Failed to import schema");
                Ok(FileOutcome::failed(path, schema_name, &e))
            }
            Err(e) => Err(e),
        }
    }
}
