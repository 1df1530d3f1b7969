//! Query execution against an ephemeral in-memory store.
//!
//! The source table is re-materialized into a fresh in-memory database
//! scoped to the single call (create-use-discard), so no state can leak
//! across turns or sessions.

use crate::table::LoadedTable;
use datachat_types::{ColumnDesc, ColumnType, QueryOutcome, RawResult, TableResult};
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::Value as JsonValue;

/// Execute a synthesized SQL statement against a loaded table.
///
/// Failures (malformed SQL, unresolvable identifiers, empty input) come
/// back as `QueryOutcome::Failure`, never as an error across this boundary.
pub fn execute_query(sql: &str, table: &LoadedTable) -> QueryOutcome {
    let sql = sql.trim();
    if sql.is_empty() {
        return QueryOutcome::failure("Empty SQL statement");
    }

    match run(sql, table) {
        Ok(result) => QueryOutcome::Success(result),
        Err(e) => {
            tracing::debug!(target: "datachat::query", "Query failed: {}", e);
            QueryOutcome::failure(format!("Query error: {}", e))
        }
    }
}

fn run(sql: &str, table: &LoadedTable) -> rusqlite::Result<TableResult> {
    let conn = Connection::open_in_memory()?;
    materialize(&conn, table)?;

    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let column_count = column_names.len();

    let mut raw_rows: Vec<Vec<JsonValue>> = Vec::new();
    let mut sql_types: Vec<Option<ColumnType>> = vec![None; column_count];

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut out = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            let value: SqlValue = row.get(idx)?;
            if sql_types[idx].is_none() {
                sql_types[idx] = column_type_of(&value);
            }
            out.push(to_json(value));
        }
        raw_rows.push(out);
    }

    let types = sql_types
        .into_iter()
        .map(|t| t.unwrap_or(ColumnType::Text))
        .collect();

    let display_rows = raw_rows
        .iter()
        .map(|row| {
            let mut record = serde_json::Map::with_capacity(column_count);
            for (name, value) in column_names.iter().zip(row) {
                record.insert(name.clone(), value.clone());
            }
            record
        })
        .collect();

    Ok(TableResult {
        columns: column_names
            .iter()
            .map(|name| ColumnDesc {
                title: name.clone(),
                data_index: name.clone(),
            })
            .collect(),
        rows: display_rows,
        raw: RawResult {
            columns: column_names,
            rows: raw_rows,
            types,
        },
    })
}

/// Create the table and insert every row, converting cells by the column's
/// inferred type. Unparseable cells fall back to their text form.
fn materialize(conn: &Connection, table: &LoadedTable) -> rusqlite::Result<()> {
    let column_defs = table
        .columns
        .iter()
        .map(|col| format!("\"{}\" {}", col.name, affinity(col.ty)))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute(
        &format!("CREATE TABLE \"{}\" ({})", table.table_name, column_defs),
        [],
    )?;

    let placeholders = (1..=table.columns.len())
        .map(|n| format!("?{}", n))
        .collect::<Vec<_>>()
        .join(", ");
    let mut insert = conn.prepare(&format!(
        "INSERT INTO \"{}\" VALUES ({})",
        table.table_name, placeholders
    ))?;

    for row in &table.rows {
        let values: Vec<SqlValue> = table
            .columns
            .iter()
            .zip(row)
            .map(|(col, cell)| to_sql_value(col.ty, cell))
            .collect();
        insert.execute(rusqlite::params_from_iter(values))?;
    }
    Ok(())
}

fn affinity(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Integer | ColumnType::Boolean => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::Text | ColumnType::Date => "TEXT",
    }
}

fn to_sql_value(ty: ColumnType, cell: &str) -> SqlValue {
    if cell.is_empty() {
        return SqlValue::Null;
    }
    match ty {
        ColumnType::Integer => cell
            .parse::<i64>()
            .map(SqlValue::Integer)
            .unwrap_or_else(|_| SqlValue::Text(cell.to_string())),
        ColumnType::Float => cell
            .parse::<f64>()
            .map(SqlValue::Real)
            .unwrap_or_else(|_| SqlValue::Text(cell.to_string())),
        ColumnType::Boolean => SqlValue::Integer(cell.eq_ignore_ascii_case("true") as i64),
        ColumnType::Text | ColumnType::Date => SqlValue::Text(cell.to_string()),
    }
}

fn column_type_of(value: &SqlValue) -> Option<ColumnType> {
    match value {
        SqlValue::Integer(_) => Some(ColumnType::Integer),
        SqlValue::Real(_) => Some(ColumnType::Float),
        SqlValue::Text(_) => Some(ColumnType::Text),
        SqlValue::Blob(_) => Some(ColumnType::Text),
        SqlValue::Null => None,
    }
}

/// Convert an SQLite value for transport. Non-finite floats serialize as
/// null for JSON safety.
fn to_json(value: SqlValue) -> JsonValue {
    match value {
        SqlValue::Null => JsonValue::Null,
        SqlValue::Integer(n) => JsonValue::from(n),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        SqlValue::Text(s) => JsonValue::String(s),
        SqlValue::Blob(b) => JsonValue::String(String::from_utf8_lossy(&b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn sample_table() -> LoadedTable {
        LoadedTable {
            table_name: "sales".to_string(),
            columns: vec![
                Column {
                    name: "region".to_string(),
                    ty: ColumnType::Text,
                },
                Column {
                    name: "amount".to_string(),
                    ty: ColumnType::Integer,
                },
            ],
            rows: vec![
                vec!["north".to_string(), "12".to_string()],
                vec!["south".to_string(), "7".to_string()],
                vec!["north".to_string(), "3".to_string()],
            ],
        }
    }

    #[test]
    fn aggregates_over_materialized_table() {
        let table = sample_table();
        let outcome = execute_query(
            "SELECT region, SUM(amount) AS total FROM sales GROUP BY region ORDER BY region",
            &table,
        );
        let QueryOutcome::Success(result) = outcome else {
            panic!("expected success");
        };
        assert_eq!(result.raw.columns, vec!["region", "total"]);
        assert_eq!(result.raw.rows.len(), 2);
        assert_eq!(result.raw.rows[0][1], JsonValue::from(15));
        assert_eq!(
            result.raw.types,
            vec![ColumnType::Text, ColumnType::Integer]
        );
        assert_eq!(result.rows[0]["region"], JsonValue::from("north"));
    }

    #[test]
    fn empty_statement_is_rejected_before_execution() {
        let table = sample_table();
        for sql in ["", "   ", "\n\t"] {
            let outcome = execute_query(sql, &table);
            assert!(!outcome.is_success(), "{:?} should be rejected", sql);
        }
    }

    #[test]
    fn bad_sql_is_a_tagged_failure() {
        let table = sample_table();
        match execute_query("SELECT nope FROM sales", &table) {
            QueryOutcome::Failure { message } => {
                assert!(message.contains("nope") || message.contains("no such column"));
            }
            QueryOutcome::Success(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn empty_cells_become_null() {
        let mut table = sample_table();
        table.rows.push(vec!["east".to_string(), String::new()]);
        let QueryOutcome::Success(result) =
            execute_query("SELECT amount FROM sales WHERE region = 'east'", &table)
        else {
            panic!("expected success");
        };
        assert_eq!(result.raw.rows[0][0], JsonValue::Null);
    }

    #[test]
    fn no_state_survives_between_calls() {
        let table = sample_table();
        let first = execute_query("CREATE TABLE scratch (x)", &table);
        assert!(first.is_success());
        // The scratch table lived in a discarded store
        let second = execute_query("SELECT * FROM scratch", &table);
        assert!(!second.is_success());
    }
}
