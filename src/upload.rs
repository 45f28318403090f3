//! File selection and the ingestion state machine.
//!
//! Reads are tagged with the generation of the selection that started them.
//! A read finishing after a newer selection is dropped, so only the most
//! recent file ever reaches the pipeline.

use log::{info, warn};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::alias_cache::{AliasCache, SessionStore};
use crate::error::{ExportError, ParseError, UploadError};
use crate::export::{export_table, ExportSummary, TableSink};
use crate::ingest::{ingest, Ingestion};

const ACCEPTED_EXTENSIONS: [&str; 2] = [".geojson", ".json"];
const ACCEPTED_MIME_TYPES: [&str; 2] = ["application/geo+json", "application/json"];

/// Whether a file with this name and MIME type may be read.
pub fn is_accepted_file(name: &str, mime: Option<&str>) -> bool {
    ACCEPTED_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
        || mime.is_some_and(|mime| ACCEPTED_MIME_TYPES.contains(&mime))
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("geojson") => Some("application/geo+json"),
        Some("json") => Some("application/json"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTicket {
    generation: u64,
    name: String,
}

impl ReadTicket {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Applied,
    /// A newer selection was made while this read was in flight.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestState {
    Empty,
    /// A file was selected and its content has not arrived yet.
    Parsing,
    Ready(Arc<Ingestion>),
    Failed(ParseError),
}

/// One user session: the selected file, its content and the current
/// ingestion result.
pub struct Session<'s> {
    store: &'s dyn SessionStore,
    generation: u64,
    file_name: Option<String>,
    content: Option<String>,
    state: IngestState,
    upload_error: Option<String>,
}

impl<'s> Session<'s> {
    pub fn new(store: &'s dyn SessionStore) -> Self {
        Session {
            store,
            generation: 0,
            file_name: None,
            content: None,
            state: IngestState::Empty,
            upload_error: None,
        }
    }

    pub fn state(&self) -> &IngestState {
        &self.state
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Raw content of the last file read, kept even when parsing failed.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn upload_error(&self) -> Option<&str> {
        self.upload_error.as_deref()
    }

    /// The current result, shared so an export keeps its own generation.
    pub fn snapshot(&self) -> Option<Arc<Ingestion>> {
        match &self.state {
            IngestState::Ready(ingestion) => Some(Arc::clone(ingestion)),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.generation += 1;
        self.file_name = None;
        self.content = None;
        self.state = IngestState::Empty;
        self.upload_error = None;
    }

    /// Starts a new selection. Everything from the previous one is cleared
    /// first, and files of the wrong type are rejected before any read.
    pub fn select(&mut self, name: &str, mime: Option<&str>) -> Result<ReadTicket, UploadError> {
        self.reset();
        if !is_accepted_file(name, mime) {
            let err = UploadError::InvalidFileType {
                name: name.to_string(),
            };
            self.upload_error = Some(err.to_string());
            return Err(err);
        }
        self.file_name = Some(name.to_string());
        self.state = IngestState::Parsing;
        Ok(ReadTicket {
            generation: self.generation,
            name: name.to_string(),
        })
    }

    /// Delivers the result of the read started by `ticket`.
    ///
    /// A read error clears the session and is returned; a parse error is
    /// recorded in the state with the raw content kept.
    pub fn complete(
        &mut self,
        ticket: &ReadTicket,
        read: io::Result<String>,
    ) -> Result<ReadOutcome, UploadError> {
        if ticket.generation != self.generation {
            warn!("Discarding stale read of '{}'", ticket.name);
            return Ok(ReadOutcome::Superseded);
        }

        let content = match read {
            Ok(content) => content,
            Err(source) => {
                let err = UploadError::Read {
                    name: ticket.name.clone(),
                    source,
                };
                self.content = None;
                self.state = IngestState::Empty;
                self.upload_error = Some(err.to_string());
                return Err(err);
            }
        };

        let cache = AliasCache::new(self.store);
        self.state = match ingest(Some(&content), &cache) {
            Ok(ingestion) if ingestion.is_empty() && content.is_empty() => IngestState::Empty,
            Ok(ingestion) => IngestState::Ready(Arc::new(ingestion)),
            Err(err) => {
                warn!("Could not parse '{}': {}", ticket.name, err);
                IngestState::Failed(err)
            }
        };
        self.content = Some(content);
        Ok(ReadOutcome::Applied)
    }

    pub fn load_path(&mut self, path: &Path) -> Result<ReadOutcome, UploadError> {
        let name = path.display().to_string();
        let ticket = self.select(&name, mime_for_path(path))?;
        info!("Reading {}", name);
        self.complete(&ticket, fs::read_to_string(path))
    }

    /// Renames one column and saves the full definition list to the cache.
    /// Returns `false` when there is no column called `name`.
    pub fn rename(&mut self, name: &str, alias: &str) -> bool {
        let Some(current) = self.snapshot() else {
            return false;
        };
        if current.column(name).is_none() {
            return false;
        }
        let renamed = current.with_alias(name, alias);
        AliasCache::new(self.store).save_best_effort(&renamed.columns);
        self.state = IngestState::Ready(Arc::new(renamed));
        true
    }

    /// Exports the current result. Session state is never modified, so a
    /// failed export can simply be retried.
    pub fn export(
        &self,
        sink: &mut dyn TableSink,
        table_name: &str,
    ) -> Result<ExportSummary, ExportError> {
        let snapshot = self.snapshot().ok_or(ExportError::NoData)?;
        export_table(sink, &snapshot, table_name)
    }
}
