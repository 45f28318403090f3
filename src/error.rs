//! Error types for the import pipeline.
//!
//! Only upload, parse and export errors are meant to reach the user. Geometry
//! and cache errors are handled where they occur and degrade to a sentinel or
//! a default value.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid file type '{name}': expected a .geojson or .json file")]
    InvalidFileType { name: String },

    #[error("error reading file '{name}': {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed JSON")]
    MalformedJson,

    /// Valid JSON, but not an object with `type: "FeatureCollection"` and a
    /// `features` array.
    #[error("not a FeatureCollection")]
    NotFeatureCollection,
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("geometry is not a JSON object with a type tag")]
    MissingType,

    #[error("position must hold at least two numbers")]
    ShortPosition,

    #[error("unexpected value in coordinates: {0}")]
    InvalidCoordinate(String),

    #[error("non-finite coordinate ({x}, {y})")]
    NonFinite { x: f64, y: f64 },

    #[error("invalid GeoJSON geometry: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("WKT error: {0}")]
    Wkt(#[from] geozero::error::GeozeroError),
}

/// Alias cache read or write failure. Never surfaced to the user.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("session store error: {0}")]
    Store(#[from] io::Error),

    #[error("cache entry is not a valid column definition list: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no data to upload or table name is empty")]
    NoData,

    #[error("failed to create table: {0}")]
    CreateTable(String),

    #[error("failed to add records: {0}")]
    AddRecords(String),

    #[error("failed to write table: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize table: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
