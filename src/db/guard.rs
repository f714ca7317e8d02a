use crate::db::DbError;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

// Token match, not substring: "created_at" must not trip on CREATE.
static DENYLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(insert|update|delete|drop|alter|create)\b").unwrap()
});

/// Rejects generated SQL containing any data-mutating keyword. This is a
/// denylist heuristic, not a parser: read-only statements pass, the six
/// keywords above are blocked, and anything it cannot understand passes
/// through to the database which enforces its own permissions.
pub fn check_query(sql: &str) -> Result<(), DbError> {
    if let Some(found) = DENYLIST.find(sql) {
        warn!("Rejected generated SQL containing '{}'", found.as_str());
        return Err(DbError::UnsafeQuery(format!(
            "statement contains disallowed keyword '{}'",
            found.as_str().to_uppercase()
        )));
    }
    Ok(())
}
