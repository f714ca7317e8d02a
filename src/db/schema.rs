use crate::db::DbError;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Text description of the configured schema, fed verbatim into the LLM
/// prompt. Built lazily from information_schema on first use, then cached
/// for the life of the process; `refresh` rebuilds it on demand.
pub struct SchemaCatalog {
    pool: PgPool,
    schema: String,
    cache: RwLock<Option<String>>,
}

impl SchemaCatalog {
    pub fn new(pool: PgPool, schema: String) -> Self {
        Self {
            pool,
            schema,
            cache: RwLock::new(None),
        }
    }

    /// Returns the cached schema text, introspecting the database if the
    /// cache is cold. A single attempt, no retries.
    pub async fn describe(&self) -> Result<String, DbError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            debug!("Using cached schema description");
            return Ok(cached.clone());
        }
        self.refresh().await
    }

    /// Drops the cache and re-reads table/column metadata from the database.
    pub async fn refresh(&self) -> Result<String, DbError> {
        let rows = sqlx::query(
            "SELECT table_name, column_name, data_type \
             FROM information_schema.columns \
             WHERE table_schema = $1 \
             ORDER BY table_name, ordinal_position",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DbError::Schema(e.to_string()))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let table: String = row
                .try_get("table_name")
                .map_err(|e| DbError::Schema(e.to_string()))?;
            let column: String = row
                .try_get("column_name")
                .map_err(|e| DbError::Schema(e.to_string()))?;
            let data_type: String = row
                .try_get("data_type")
                .map_err(|e| DbError::Schema(e.to_string()))?;
            entries.push((table, column, data_type));
        }

        let description = render_description(&self.schema, &entries);

        info!(
            "Schema cache refreshed: {} columns across schema '{}'",
            entries.len(),
            self.schema
        );

        let mut cache = self.cache.write().await;
        *cache = Some(description.clone());
        Ok(description)
    }
}

/// One stanza per table, one line per column, types uppercased.
fn render_description(schema: &str, entries: &[(String, String, String)]) -> String {
    let mut out = format!("Schema: {}\n", schema);

    if entries.is_empty() {
        out.push_str("(no tables found)\n");
        return out;
    }

    let mut current_table: Option<&str> = None;
    for (table, column, data_type) in entries {
        if current_table != Some(table.as_str()) {
            out.push_str(&format!("\nTable: {}\n", table));
            current_table = Some(table.as_str());
        }
        out.push_str(&format!("  - {}: {}\n", column, data_type.to_uppercase()));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(t: &str, c: &str, d: &str) -> (String, String, String) {
        (t.to_string(), c.to_string(), d.to_string())
    }

    #[test]
    fn renders_one_stanza_per_table() {
        let entries = vec![
            entry("orders", "id", "integer"),
            entry("orders", "total", "numeric"),
            entry("users", "name", "character varying"),
        ];
        let text = render_description("unit", &entries);

        assert_eq!(text.matches("Table: ").count(), 2);
        assert!(text.contains("Table: orders\n  - id: INTEGER\n  - total: NUMERIC\n"));
        assert!(text.contains("Table: users\n  - name: CHARACTER VARYING\n"));
    }

    #[test]
    fn empty_schema_is_still_described() {
        let text = render_description("unit", &[]);
        assert!(text.contains("no tables found"));
    }
}
