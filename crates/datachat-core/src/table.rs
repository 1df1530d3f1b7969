//! Table loading and schema description for uploaded files.
//!
//! Each call is self-contained: the file is parsed into an in-memory
//! relation and dropped with the returned value, so the same file can be
//! re-loaded any number of times without retained handles.

use crate::{DatachatError, Result};
use datachat_types::ColumnType;
use std::collections::HashSet;
use std::path::Path;

/// One column of a loaded table.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

/// A normalized in-memory relation built from a tabular file.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table_name: String,
    pub columns: Vec<Column>,
    /// Row cells as raw strings; typed conversion happens at materialization.
    pub rows: Vec<Vec<String>>,
}

impl LoadedTable {
    /// Human-readable schema description suitable for a model prompt:
    /// per column, the normalized name, inferred type and distinct count.
    pub fn schema_description(&self) -> String {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let distinct: HashSet<&str> =
                    self.rows.iter().map(|row| row[idx].as_str()).collect();
                format!("{} ({}, {} distinct values)", col.name, col.ty, distinct.len())
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Table '{}' with {} rows and columns: {}",
            self.table_name,
            self.rows.len(),
            columns
        )
    }

    /// First `limit` rows as JSON values, converted by inferred column type.
    /// Non-finite numerics come back as null for serialization safety.
    pub fn preview_rows(&self, limit: usize) -> Vec<Vec<serde_json::Value>> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(col, cell)| cell_to_json(col.ty, cell))
                    .collect()
            })
            .collect()
    }
}

fn cell_to_json(ty: ColumnType, cell: &str) -> serde_json::Value {
    use serde_json::Value;
    if cell.is_empty() {
        return Value::Null;
    }
    match ty {
        ColumnType::Integer => cell
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(cell.to_string())),
        ColumnType::Float => cell
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnType::Boolean => Value::Bool(cell.eq_ignore_ascii_case("true")),
        ColumnType::Text | ColumnType::Date => Value::String(cell.to_string()),
    }
}

/// Load a delimited file into an in-memory relation with normalized column
/// names and inferred per-column types.
pub fn load_table(path: &Path) -> Result<LoadedTable> {
    let delimiter = match path.extension().and_then(|e| e.to_str()) {
        Some("tsv") => b'\t',
        _ => b',',
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| DatachatError::MalformedTable(e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| DatachatError::MalformedTable(e.to_string()))?
        .clone();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(DatachatError::EmptyTable(path.to_path_buf()));
    }

    let names = normalize_headers(&headers);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DatachatError::MalformedTable(e.to_string()))?;
        rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
    }

    let columns = names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| Column {
            ty: infer_column_type(&rows, idx),
            name,
        })
        .collect();

    Ok(LoadedTable {
        table_name: table_name_for(path),
        columns,
        rows,
    })
}

/// Logical table name for a file: its stem, normalized like a column name.
pub fn table_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("uploaded");
    let name = normalize_identifier(stem);
    if name.is_empty() { "uploaded".to_string() } else { name }
}

/// Normalize a header into a valid unquoted SQL identifier: lower-case,
/// spaces to underscores, the set `()%:./` stripped or replaced.
pub fn normalize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().to_lowercase().chars() {
        match ch {
            ' ' | '.' | '/' | ':' => out.push('_'),
            '(' | ')' | '%' => {}
            c if c.is_ascii_alphanumeric() || c == '_' => out.push(c),
            _ => out.push('_'),
        }
    }
    // Collapse runs introduced by replacement and trim the edges
    let mut collapsed = String::with_capacity(out.len());
    let mut prev_underscore = false;
    for ch in out.chars() {
        if ch == '_' {
            if !prev_underscore && !collapsed.is_empty() {
                collapsed.push('_');
            }
            prev_underscore = true;
        } else {
            collapsed.push(ch);
            prev_underscore = false;
        }
    }
    let collapsed = collapsed.trim_end_matches('_').to_string();
    // Identifiers may not start with a digit
    if collapsed.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("c_{}", collapsed)
    } else {
        collapsed
    }
}

fn normalize_headers(headers: &csv::StringRecord) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    headers
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let mut name = normalize_identifier(raw);
            if name.is_empty() {
                name = format!("column_{}", idx + 1);
            }
            // Duplicates get a numeric suffix so every identifier is unique
            let mut candidate = name.clone();
            let mut n = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_{}", name, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

/// Infer the scalar type of a column from its non-empty cells. Empty cells
/// do not veto a narrower type; an all-empty column is text.
fn infer_column_type(rows: &[Vec<String>], idx: usize) -> ColumnType {
    let cells: Vec<&str> = rows
        .iter()
        .filter_map(|row| row.get(idx))
        .map(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .collect();
    if cells.is_empty() {
        return ColumnType::Text;
    }

    if cells.iter().all(|c| c.parse::<i64>().is_ok()) {
        return ColumnType::Integer;
    }
    if cells.iter().all(|c| c.parse::<f64>().is_ok()) {
        return ColumnType::Float;
    }
    if cells.iter().all(|c| c.eq_ignore_ascii_case("true") || c.eq_ignore_ascii_case("false")) {
        return ColumnType::Boolean;
    }
    if cells
        .iter()
        .all(|c| chrono::NaiveDate::parse_from_str(c, "%Y-%m-%d").is_ok())
    {
        return ColumnType::Date;
    }
    ColumnType::Text
}
