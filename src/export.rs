//! Export of an ingestion result into a host table.
//!
//! The host is reached through [`TableSink`]; this module only decides what
//! table to ask for and what goes in each cell.

use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::ExportError;
use crate::inference::InferredType;
use crate::ingest::{ColumnDefinition, Ingestion, ParsedRow};

/// Name of the column holding each row's WKT.
pub const GEOMETRY_FIELD: &str = "WKT_Geometry";

/// Cell text for values that cannot be turned into JSON.
pub const STRINGIFY_ERROR_MARKER: &str = "Error: Could not stringify object";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldType {
    Text,
    Number,
    Checkbox,
}

impl From<InferredType> for FieldType {
    fn from(inferred: InferredType) -> Self {
        match inferred {
            InferredType::String => FieldType::Text,
            InferredType::Number => FieldType::Number,
            InferredType::Boolean => FieldType::Checkbox,
            InferredType::Object
            | InferredType::Array
            | InferredType::Mixed
            | InferredType::Null
            | InferredType::Unknown => FieldType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMeta {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTable {
    pub table_id: String,
    pub name: String,
    pub fields: Vec<FieldMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Checkbox(bool),
}

/// One record: field id to cell value, `None` leaving the cell empty.
pub type Record = BTreeMap<String, Option<CellValue>>;

/// Capability to create tables and add records in the host application.
pub trait TableSink {
    fn create_table(&mut self, name: &str, fields: &[FieldSpec])
        -> Result<CreatedTable, ExportError>;

    fn add_records(&mut self, table: &CreatedTable, records: Vec<Record>)
        -> Result<(), ExportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub table_id: String,
    pub table_name: String,
    pub records: usize,
}

/// Fields for `columns`, aliases as names, followed by the geometry field.
pub fn field_specs(columns: &[ColumnDefinition]) -> Vec<FieldSpec> {
    columns
        .iter()
        .map(|column| FieldSpec {
            name: column.alias.clone(),
            field_type: column.inferred_type.into(),
        })
        .chain(std::iter::once(FieldSpec {
            name: GEOMETRY_FIELD.to_string(),
            field_type: FieldType::Text,
        }))
        .collect()
}

pub fn cell_value(raw: Option<&Value>, field_type: FieldType) -> Option<CellValue> {
    let raw = match raw {
        None | Some(Value::Null) => return None,
        Some(raw) => raw,
    };

    match field_type {
        FieldType::Text => Some(CellValue::Text(text_of(raw))),
        FieldType::Number => {
            let number = match raw {
                Value::Number(number) => number.as_f64(),
                Value::String(text) => text.trim().parse::<f64>().ok(),
                _ => None,
            };
            if number.is_none() {
                warn!("Could not read {} as a number", raw);
            }
            number.map(CellValue::Number)
        }
        FieldType::Checkbox => Some(CellValue::Checkbox(is_truthy(raw))),
    }
}

fn text_of(raw: &Value) -> String {
    match raw {
        Value::String(text) => text.clone(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(raw).unwrap_or_else(|err| {
            warn!("Could not stringify {}: {}", raw, err);
            STRINGIFY_ERROR_MARKER.to_string()
        }),
        // f64 Display drops the trailing ".0" that serde_json keeps.
        Value::Number(number) if number.is_f64() => number
            .as_f64()
            .map(|value| value.to_string())
            .unwrap_or_else(|| number.to_string()),
        other => other.to_string(),
    }
}

fn is_truthy(raw: &Value) -> bool {
    match raw {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Builds one record per row, in row order. Columns whose alias has no field
/// id are left out.
pub fn build_records(
    rows: &[ParsedRow],
    columns: &[ColumnDefinition],
    field_ids: &HashMap<String, String>,
) -> Vec<Record> {
    let geometry_id = field_ids.get(GEOMETRY_FIELD);
    if geometry_id.is_none() {
        warn!("No field id for {}", GEOMETRY_FIELD);
    }

    let mut resolved = Vec::with_capacity(columns.len());
    for column in columns {
        match field_ids.get(&column.alias) {
            Some(id) => resolved.push((column, id, FieldType::from(column.inferred_type))),
            None => warn!("No field id for alias '{}', skipping it", column.alias),
        }
    }

    rows.iter()
        .map(|row| {
            let mut record = Record::new();
            if let Some(id) = geometry_id {
                record.insert(id.clone(), Some(CellValue::Text(row.wkt.clone())));
            }
            for (column, id, field_type) in &resolved {
                record.insert((*id).clone(), cell_value(row.property(&column.name), *field_type));
            }
            record
        })
        .collect()
}

pub fn export_table(
    sink: &mut dyn TableSink,
    ingestion: &Ingestion,
    table_name: &str,
) -> Result<ExportSummary, ExportError> {
    let table_name = table_name.trim();
    if ingestion.rows.is_empty() || table_name.is_empty() {
        return Err(ExportError::NoData);
    }

    let fields = field_specs(&ingestion.columns);
    let table = sink.create_table(table_name, &fields)?;
    if table.table_id.is_empty() {
        return Err(ExportError::CreateTable("no table id returned".to_string()));
    }
    info!("Created table '{}' ({})", table.name, table.table_id);

    let field_ids: HashMap<String, String> = table
        .fields
        .iter()
        .map(|field| (field.name.clone(), field.id.clone()))
        .collect();
    let records = build_records(&ingestion.rows, &ingestion.columns, &field_ids);
    let count = records.len();
    if count > 0 {
        sink.add_records(&table, records)?;
        info!("Added {} records to '{}'", count, table.name);
    }

    Ok(ExportSummary {
        table_id: table.table_id,
        table_name: table.name,
        records: count,
    })
}

#[derive(Serialize)]
struct TableDocument<'a> {
    #[serde(flatten)]
    table: &'a CreatedTable,
    records: &'a [Record],
}

/// Sink writing the table and its records to a JSON document on disk.
#[derive(Debug)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, table: &CreatedTable, records: &[Record]) -> Result<(), ExportError> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut writer, &TableDocument { table, records })?;
        writer.flush()?;
        Ok(())
    }
}

impl TableSink for JsonFileSink {
    fn create_table(
        &mut self,
        name: &str,
        fields: &[FieldSpec],
    ) -> Result<CreatedTable, ExportError> {
        let table = CreatedTable {
            table_id: format!("tbl_{}", name.to_lowercase().replace(char::is_whitespace, "_")),
            name: name.to_string(),
            fields: fields
                .iter()
                .enumerate()
                .map(|(index, field)| FieldMeta {
                    id: format!("fld{index}"),
                    name: field.name.clone(),
                    field_type: field.field_type,
                })
                .collect(),
        };
        self.write(&table, &[])?;
        Ok(table)
    }

    fn add_records(&mut self, table: &CreatedTable, records: Vec<Record>) -> Result<(), ExportError> {
        self.write(table, &records)
    }
}
