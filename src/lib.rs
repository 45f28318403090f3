use std::path::Path;
use std::sync::Arc;

pub mod alias_cache;
pub mod error;
pub mod export;
pub mod inference;
pub mod ingest;
pub mod preview;
pub mod upload;
pub mod wkt;

pub use alias_cache::{AliasCache, FileStore, MemoryStore, SessionStore};
pub use error::{Error, ParseError, Result};
pub use export::{export_table, ExportSummary, JsonFileSink, TableSink};
pub use inference::{infer_type, InferredType};
pub use ingest::{ingest, ColumnDefinition, Ingestion, ParsedRow};
pub use preview::{preview_wkt, Canvas, Preview};
pub use upload::{IngestState, Session};

/// Loads a GeoJSON file into `session`, applying `aliases` on top of any
/// cached ones. Returns the resulting ingestion.
pub fn load_file(
    session: &mut Session<'_>,
    path: &Path,
    aliases: &[(String, String)],
) -> Result<Arc<Ingestion>> {
    session.load_path(path)?;
    if let IngestState::Failed(err) = session.state() {
        return Err(err.clone().into());
    }
    for (name, alias) in aliases {
        if !session.rename(name, alias) {
            log::warn!("No column named '{}' to rename", name);
        }
    }
    Ok(session.snapshot().unwrap_or_default())
}

/// Loads `path` and exports it as `table_name` through `sink`.
pub fn export_file(
    session: &mut Session<'_>,
    path: &Path,
    aliases: &[(String, String)],
    sink: &mut dyn TableSink,
    table_name: &str,
) -> Result<ExportSummary> {
    load_file(session, path, aliases)?;
    Ok(session.export(sink, table_name)?)
}
