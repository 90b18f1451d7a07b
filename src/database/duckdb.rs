//! DuckDB adapter.
//!
//! Reads tables of an embedded DuckDB database in keyset-paginated batches,
//! renders [`Condition`]s to SQL with bound parameters, and applies sanitizer
//! updates inside a transaction so a failing batch leaves the table as it was.

use super::{check_batch_size, plan_update, BatchPosition, Database};
use crate::condition::Condition;
use crate::error::ShrinkError;
use crate::record::{Batch, Record, Value};
use anyhow::{Context, Result};
use duckdb::types::{TimeUnit, ToSql, ToSqlOutput, ValueRef};
use duckdb::{params_from_iter, Connection};
use std::path::Path;

/// Days from 0001-01-01 to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub struct DuckDbDatabase {
    conn: Connection,
    batch_size: usize,
}

impl DuckDbDatabase {
    /// Open (or create) a database file
    pub fn open(path: &Path, batch_size: usize) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB database: {}", path.display()))?;
        Self::from_connection(conn, batch_size)
    }

    pub fn open_in_memory(batch_size: usize) -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to create in-memory DuckDB connection")?;
        Self::from_connection(conn, batch_size)
    }

    pub fn from_connection(conn: Connection, batch_size: usize) -> Result<Self> {
        Ok(Self {
            conn,
            batch_size: check_batch_size(batch_size)?,
        })
    }

    /// Underlying connection, for schema setup and ad-hoc queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Names of the tables in the main schema
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = 'main' ORDER BY table_name",
            )
            .context("Failed to list tables")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn ensure_table(&self, table: &str) -> Result<()> {
        let exists: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM information_schema.tables \
                 WHERE table_schema = 'main' AND table_name = ?",
                duckdb::params![table],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to look up table '{}'", table))?;
        if !exists {
            return Err(ShrinkError::UnknownTable(table.to_string()).into());
        }
        Ok(())
    }

    /// Select list for a table.
    ///
    /// Columns whose values have no [`Value`] counterpart (enums, lists,
    /// structs, intervals, ...) are read through their DuckDB text form.
    fn projection(&self, table: &str) -> Result<String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = 'main' AND table_name = ? ORDER BY ordinal_position",
            )
            .context("Failed to list columns")?;
        let columns = stmt
            .query_map(duckdb::params![table], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<duckdb::Result<Vec<_>>>()
            .with_context(|| format!("Failed to look up columns of '{}'", table))?;
        if columns.is_empty() {
            return Err(ShrinkError::UnknownTable(table.to_string()).into());
        }

        Ok(columns
            .iter()
            .map(|(column, data_type)| {
                let name = quote_ident(column);
                if has_native_value(data_type) {
                    name
                } else {
                    format!("CAST({} AS VARCHAR) AS {}", name, name)
                }
            })
            .collect::<Vec<_>>()
            .join(", "))
    }

    fn select(&self, sql: &str, params: &[Value]) -> Result<Batch> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Failed to prepare query: {}", sql))?;

        let mut rows_result = stmt
            .query(params_from_iter(params.iter()))
            .with_context(|| format!("Failed to execute query: {}", sql))?;

        let mut rows: Vec<Vec<Value>> = Vec::new();
        let mut column_count = 0;
        while let Some(row) = rows_result.next()? {
            if column_count == 0 {
                column_count = row.as_ref().column_count();
            }
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(value_from_ref(row.get_ref(i)?)?);
            }
            rows.push(values);
        }

        // Column names are only available once the statement has run
        drop(rows_result);
        let columns: Vec<String> = (0..stmt.column_count())
            .map(|i| {
                stmt.column_name(i)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| format!("col{}", i))
            })
            .collect();

        Ok(rows
            .into_iter()
            .map(|values| columns.iter().cloned().zip(values).collect::<Record>())
            .collect())
    }
}

impl Database for DuckDbDatabase {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn fetch_batch(&self, table: &str, position: &BatchPosition) -> Result<Batch> {
        let projection = self.projection(table)?;
        let name = quote_ident(table);

        match position.primary_key.as_deref() {
            Some(column) => {
                let key = quote_ident(column);
                let mut params = Vec::new();
                let mut sql = format!("SELECT {} FROM {}", projection, name);
                if let Some(after) = &position.after {
                    sql.push_str(&format!(" WHERE {} > ?", key));
                    params.push(after.clone());
                }
                sql.push_str(&format!(" ORDER BY {} LIMIT {}", key, position.limit));
                self.select(&sql, &params)
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM {} ORDER BY ALL LIMIT {} OFFSET {}",
                    projection, name, position.limit, position.offset
                );
                self.select(&sql, &[])
            }
        }
    }

    fn get_records(&self, table: &str, condition: &Condition) -> Result<Batch> {
        let projection = self.projection(table)?;
        let mut params = Vec::new();
        let filter = render_condition(condition, &mut params);
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            projection,
            quote_ident(table),
            filter
        );
        self.select(&sql, &params)
    }

    fn update_records(
        &self,
        table: &str,
        primary_key: &str,
        old: &[Record],
        new: &[Record],
    ) -> Result<()> {
        let changes = plan_update(table, primary_key, old, new)?;
        if changes.is_empty() {
            return Ok(());
        }
        self.ensure_table(table)?;

        self.conn
            .execute_batch("BEGIN TRANSACTION")
            .context("Failed to begin transaction")?;

        let result = (|| -> Result<()> {
            for (key, before, after) in &changes {
                let changed: Vec<(&str, &Value)> = after
                    .iter()
                    .filter(|(column, value)| before.get(column) != Some(*value))
                    .collect();
                if changed.is_empty() {
                    continue;
                }

                let assignments: Vec<String> = changed
                    .iter()
                    .map(|(column, _)| format!("{} = ?", quote_ident(column)))
                    .collect();
                let sql = format!(
                    "UPDATE {} SET {} WHERE {} = ?",
                    quote_ident(table),
                    assignments.join(", "),
                    quote_ident(primary_key)
                );

                let key = key.to_value();
                let params: Vec<&Value> = changed
                    .iter()
                    .map(|(_, value)| *value)
                    .chain(std::iter::once(&key))
                    .collect();
                self.conn
                    .execute(&sql, params_from_iter(params))
                    .with_context(|| format!("Failed to update {} {} = {}", table, primary_key, key))?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.conn
                    .execute_batch("COMMIT")
                    .context("Failed to commit update")?;
                Ok(())
            }
            Err(e) => {
                // Report the statement error, not the rollback's
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn delete_records(&self, table: &str, condition: &Condition) -> Result<u64> {
        self.ensure_table(table)?;
        let mut params = Vec::new();
        let filter = render_condition(condition, &mut params);
        let sql = format!("DELETE FROM {} WHERE {}", quote_ident(table), filter);
        let deleted = self
            .conn
            .execute(&sql, params_from_iter(params.iter()))
            .with_context(|| format!("Failed to delete from '{}'", table))?;
        Ok(deleted as u64)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(duckdb::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::Owned(duckdb::types::Value::Boolean(*b)),
            Value::Integer(i) => ToSqlOutput::Owned(duckdb::types::Value::BigInt(*i)),
            Value::Float(f) => ToSqlOutput::Owned(duckdb::types::Value::Double(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// Whether `value_from_ref` maps a column type without going through text
fn has_native_value(data_type: &str) -> bool {
    let data_type = data_type.to_ascii_uppercase();
    data_type.starts_with("DECIMAL")
        || data_type.starts_with("TIMESTAMP")
        || matches!(
            data_type.as_str(),
            "BOOLEAN"
                | "TINYINT"
                | "SMALLINT"
                | "INTEGER"
                | "BIGINT"
                | "HUGEINT"
                | "UTINYINT"
                | "USMALLINT"
                | "UINTEGER"
                | "UBIGINT"
                | "FLOAT"
                | "DOUBLE"
                | "VARCHAR"
                | "BLOB"
                | "DATE"
                | "TIME"
        )
}

/// Split an epoch offset in `unit` into whole seconds and nanoseconds
fn split_epoch(unit: &TimeUnit, value: i64) -> (i64, u32) {
    let per_second: i64 = match unit {
        TimeUnit::Second => 1,
        TimeUnit::Millisecond => 1_000,
        TimeUnit::Microsecond => 1_000_000,
        TimeUnit::Nanosecond => 1_000_000_000,
    };
    let nanos_per_tick = 1_000_000_000 / per_second;
    (
        value.div_euclid(per_second),
        (value.rem_euclid(per_second) * nanos_per_tick) as u32,
    )
}

/// Convert a DuckDB cell into a [`Value`].
///
/// Wide integers that fit are kept numeric; temporal types become their text
/// form so sanitizers can work on them and DuckDB casts them back on update.
fn value_from_ref(value: ValueRef<'_>) -> Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(n) => Value::Integer(n.into()),
        ValueRef::SmallInt(n) => Value::Integer(n.into()),
        ValueRef::Int(n) => Value::Integer(n.into()),
        ValueRef::BigInt(n) => Value::Integer(n),
        ValueRef::HugeInt(n) => i64::try_from(n)
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(n.to_string())),
        ValueRef::UTinyInt(n) => Value::Integer(n.into()),
        ValueRef::USmallInt(n) => Value::Integer(n.into()),
        ValueRef::UInt(n) => Value::Integer(n.into()),
        ValueRef::UBigInt(n) => i64::try_from(n)
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(n.to_string())),
        ValueRef::Float(f) => Value::Float(f.into()),
        ValueRef::Double(f) => Value::Float(f),
        ValueRef::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::Text(d.to_string())),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
        ValueRef::Timestamp(unit, ts) => {
            let (secs, nanos) = split_epoch(&unit, ts);
            match chrono::DateTime::from_timestamp(secs, nanos) {
                Some(dt) => Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
                None => anyhow::bail!("timestamp out of range: {} ({:?})", ts, unit),
            }
        }
        ValueRef::Date32(days) => {
            match chrono::NaiveDate::from_num_days_from_ce_opt(UNIX_EPOCH_DAYS_FROM_CE + days) {
                Some(date) => Value::Text(date.format("%Y-%m-%d").to_string()),
                None => anyhow::bail!("date out of range: {} days", days),
            }
        }
        ValueRef::Time64(unit, value) => {
            let (secs, nanos) = split_epoch(&unit, value);
            match u32::try_from(secs)
                .ok()
                .and_then(|secs| chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos))
            {
                Some(time) => Value::Text(time.format("%H:%M:%S%.f").to_string()),
                None => anyhow::bail!("time out of range: {} ({:?})", value, unit),
            }
        }
        other => anyhow::bail!(
            "unsupported DuckDB value of type {:?}; read it as VARCHAR",
            other.data_type()
        ),
    })
}

/// Quote an identifier for DuckDB
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a condition as a SQL boolean expression, appending bound values.
///
/// Leaf predicates are wrapped in `COALESCE(.., FALSE)` so NULL never
/// propagates; `NOT` then behaves exactly like the in-memory evaluation.
fn render_condition(condition: &Condition, params: &mut Vec<Value>) -> String {
    match condition {
        Condition::All => "TRUE".to_string(),
        Condition::Compare { column, op, value } => {
            params.push(value.clone());
            format!("COALESCE({} {} ?, FALSE)", quote_ident(column), op.sql())
        }
        Condition::In { column, values } => {
            if values.is_empty() {
                return "FALSE".to_string();
            }
            params.extend(values.iter().cloned());
            let placeholders = vec!["?"; values.len()].join(", ");
            format!(
                "COALESCE({} IN ({}), FALSE)",
                quote_ident(column),
                placeholders
            )
        }
        Condition::Between { column, low, high } => {
            params.push(low.clone());
            params.push(high.clone());
            format!(
                "COALESCE({} BETWEEN ? AND ?, FALSE)",
                quote_ident(column)
            )
        }
        Condition::IsNull(column) => format!("({} IS NULL)", quote_ident(column)),
        Condition::NotNull(column) => format!("({} IS NOT NULL)", quote_ident(column)),
        Condition::Matches { column, pattern } => {
            params.push(Value::Text(pattern.as_str().to_string()));
            format!(
                "COALESCE(regexp_matches(CAST({} AS VARCHAR), ?), FALSE)",
                quote_ident(column)
            )
        }
        Condition::And(conditions) => join(conditions, " AND ", "TRUE", params),
        Condition::Or(conditions) => join(conditions, " OR ", "FALSE", params),
        Condition::Not(inner) => format!("(NOT {})", render_condition(inner, params)),
    }
}

fn join(conditions: &[Condition], separator: &str, empty: &str, params: &mut Vec<Value>) -> String {
    if conditions.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = conditions
        .iter()
        .map(|c| render_condition(c, params))
        .collect();
    format!("({})", parts.join(separator))
}
