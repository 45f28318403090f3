//! GeoJSON ingestion: feature collection text to rows and column definitions.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

use crate::alias_cache::AliasCache;
use crate::error::ParseError;
use crate::inference::{infer_type, InferredType};
use crate::wkt::{geometry_to_wkt, GEOMETRY_ERROR_SENTINEL};

/// One feature of the input, flattened for display and export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRow {
    /// Zero-based position of the feature in the input.
    pub id: usize,
    /// Geometry as WKT, the error sentinel, or empty when there is no geometry.
    pub wkt: String,
    pub properties: Option<Map<String, Value>>,
}

impl ParsedRow {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.as_ref().and_then(|props| props.get(key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,
    pub inferred_type: InferredType,
    pub alias: String,
}

/// Result of ingesting one file. Replaced as a whole on every new file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ingestion {
    pub rows: Vec<ParsedRow>,
    /// Every property key, deduplicated and sorted by code point.
    pub column_keys: Vec<String>,
    pub columns: Vec<ColumnDefinition>,
}

impl Ingestion {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.columns.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Returns a copy with `name` renamed to `alias`; the original is left
    /// untouched. Unknown names leave the definitions unchanged.
    pub fn with_alias(&self, name: &str, alias: &str) -> Ingestion {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                if column.name == name {
                    ColumnDefinition {
                        alias: alias.to_string(),
                        ..column.clone()
                    }
                } else {
                    column.clone()
                }
            })
            .collect();
        Ingestion {
            rows: self.rows.clone(),
            column_keys: self.column_keys.clone(),
            columns,
        }
    }
}

/// Runs the whole pipeline over `content`.
///
/// Absent or empty content gives the empty result. Aliases saved in `cache`
/// override the defaults for matching column names; an unreadable cache is
/// ignored.
pub fn ingest(content: Option<&str>, cache: &AliasCache<'_>) -> Result<Ingestion, ParseError> {
    let content = match content {
        Some(text) if !text.is_empty() => text,
        _ => return Ok(Ingestion::default()),
    };

    let features = parse_feature_collection(content)?;
    let rows = build_rows(features);
    let column_keys = collect_keys(&rows);
    let mut columns = infer_columns(&rows, &column_keys);
    apply_aliases(&mut columns, &cache.load_or_default());

    info!(
        "Parsed {} features with {} property columns",
        rows.len(),
        column_keys.len()
    );
    Ok(Ingestion {
        rows,
        column_keys,
        columns,
    })
}

/// Parses `content` and returns the `features` array of a feature collection.
pub fn parse_feature_collection(content: &str) -> Result<Vec<Value>, ParseError> {
    let document: Value = serde_json::from_str(content).map_err(|err| {
        warn!("Input is not valid JSON: {}", err);
        ParseError::MalformedJson
    })?;

    let Value::Object(mut document) = document else {
        return Err(ParseError::NotFeatureCollection);
    };
    if document.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(ParseError::NotFeatureCollection);
    }
    match document.remove("features") {
        Some(Value::Array(features)) => Ok(features),
        _ => Err(ParseError::NotFeatureCollection),
    }
}

fn build_rows(features: Vec<Value>) -> Vec<ParsedRow> {
    features
        .into_iter()
        .enumerate()
        .map(|(id, feature)| build_row(id, feature))
        .collect()
}

fn build_row(id: usize, feature: Value) -> ParsedRow {
    let Value::Object(mut feature) = feature else {
        warn!("Feature at index {} is not an object", id);
        return ParsedRow {
            id,
            wkt: String::new(),
            properties: None,
        };
    };

    let wkt = match feature.get("geometry") {
        None | Some(Value::Null) => {
            warn!("Feature at index {} has no geometry", id);
            String::new()
        }
        Some(geometry) => geometry_to_wkt(geometry).unwrap_or_else(|err| {
            warn!("Could not convert geometry of feature {} to WKT: {}", id, err);
            GEOMETRY_ERROR_SENTINEL.to_string()
        }),
    };

    let properties = match feature.remove("properties") {
        Some(Value::Object(properties)) => Some(properties),
        Some(Value::Null) | None => None,
        Some(other) => {
            debug!("Ignoring non-object properties of feature {}: {}", id, other);
            None
        }
    };

    ParsedRow {
        id,
        wkt,
        properties,
    }
}

fn collect_keys(rows: &[ParsedRow]) -> Vec<String> {
    // BTreeSet<String> orders by bytes, which for UTF-8 is code point order.
    rows.iter()
        .filter_map(|row| row.properties.as_ref())
        .flat_map(|properties| properties.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn infer_columns(rows: &[ParsedRow], keys: &[String]) -> Vec<ColumnDefinition> {
    keys.iter()
        .map(|key| {
            let inferred_type = infer_type(rows.iter().filter_map(|row| row.property(key)));
            debug!("Column '{}' inferred as {}", key, inferred_type);
            ColumnDefinition {
                name: key.clone(),
                inferred_type,
                alias: key.clone(),
            }
        })
        .collect()
}

fn apply_aliases(columns: &mut [ColumnDefinition], aliases: &HashMap<String, String>) {
    for column in columns.iter_mut() {
        if let Some(alias) = aliases.get(&column.name) {
            column.alias = alias.clone();
        }
    }
}
