use crate::db::{DbError, RowSet};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Row, TypeInfo};
use std::time::Duration;
use tracing::{debug, info};

/// Runs an approved SQL string against the pool and materializes the
/// result as a RowSet. Single attempt, no partial results; the timeout
/// counts as an execution failure like any other.
pub async fn execute_query(
    pool: &PgPool,
    sql: &str,
    timeout: Duration,
) -> Result<RowSet, DbError> {
    debug!("Executing generated SQL: {}", sql);

    let fetch = sqlx::query(sql).fetch_all(pool);
    let rows = match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result.map_err(|e| DbError::Execution(e.to_string()))?,
        Err(_) => {
            return Err(DbError::Execution(format!(
                "statement timed out after {}s",
                timeout.as_secs()
            )));
        }
    };

    let columns: Vec<String> = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let mut out_rows = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut map = Map::with_capacity(row.columns().len());
        for (idx, column) in row.columns().iter().enumerate() {
            let value = decode_value(row, idx, column.type_info().name())
                .map_err(|e| DbError::Execution(e.to_string()))?;
            map.insert(column.name().to_string(), value);
        }
        out_rows.push(map);
    }

    info!("Query returned {} rows, {} columns", out_rows.len(), columns.len());

    Ok(RowSet {
        columns,
        rows: out_rows,
    })
}

/// Maps one Postgres value to JSON: numbers stay numbers, text stays
/// text, temporal values become ISO-8601 strings, SQL NULL becomes null.
fn decode_value(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)?
            .map(|v| Value::Number(Number::from(v))),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)?
            .map(|v| Value::Number(Number::from(v))),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)?
            .map(|v| Value::Number(Number::from(v))),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| number_or_null(f64::from(v))),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)?
            .map(number_or_null),
        "NUMERIC" => row.try_get::<Option<Decimal>, _>(idx)?.map(|d| {
            // past f64 range we keep the digits as text rather than lose them
            d.to_f64()
                .map(number_or_null)
                .unwrap_or_else(|| Value::String(d.to_string()))
        }),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)?
            .map(|t| Value::String(t.format("%H:%M:%S").to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|ts| Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(|ts| Value::String(ts.to_rfc3339())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx)?,
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => row
            .try_get::<Option<String>, _>(idx)?
            .map(Value::String),
        other => {
            // Unknown type: fall back to its text form rather than fail the row
            match row.try_get::<Option<String>, _>(idx) {
                Ok(v) => v.map(Value::String),
                Err(_) => {
                    debug!("Could not decode column type '{}', emitting null", other);
                    Some(Value::Null)
                }
            }
        }
    };

    Ok(value.unwrap_or(Value::Null))
}

fn number_or_null(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(number_or_null(f64::NAN), Value::Null);
        assert_eq!(number_or_null(f64::INFINITY), Value::Null);
        assert_eq!(number_or_null(1.5), serde_json::json!(1.5));
    }
}
