//! Remote query gateway.
//!
//! Every statement sent to the remote database is a [`Statement`]: SQL text
//! with positional `$n` placeholders plus the values bound to them. User input
//! only ever travels as a bound value. The one place where identifiers are
//! built dynamically ([`Statement::upsert`]) validates them first.
//!
//! Rows come back as JSON objects keyed by snake_case column names.
//! [`fetch_as`] is the decode boundary: rows are converted to camelCase and
//! deserialized into the typed models, whose lenient field deserializers
//! normalize driver-specific shapes.

mod error;
mod http;

pub use error::GatewayError;
pub use http::{encode_param, HttpGateway};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::case::{to_camel_case, to_snake_case};

/// A row as returned by the remote endpoint.
pub type Row = Map<String, Value>;

/// A parameterized SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    text: String,
    params: Vec<Value>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Binds the next positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Binds a value for a JSON column, serialized to JSON text.
    pub fn bind_json<T: Serialize + ?Sized>(self, value: &T) -> Self {
        let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
        self.bind(json)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Builds `INSERT INTO table (...) VALUES (...)` from a snake_case record.
    ///
    /// Nested objects and arrays are bound as JSON text.
    pub fn insert(table: &str, record: &Row) -> Result<Self, GatewayError> {
        let columns = checked_columns(table, record, &[])?;
        let text = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders(1, columns.len()).join(", "),
        );
        Ok(Statement::new(text).bind_record(record))
    }

    /// Builds `INSERT ... ON CONFLICT (...) DO UPDATE` from a snake_case record.
    pub fn upsert(table: &str, record: &Row, conflict: &[&str]) -> Result<Self, GatewayError> {
        let columns = checked_columns(table, record, conflict)?;
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| !conflict.contains(c))
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect();

        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        let text = format!(
            "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT ({}) {action}",
            columns.join(", "),
            placeholders(1, columns.len()).join(", "),
            conflict.join(", "),
        );
        Ok(Statement::new(text).bind_record(record))
    }

    /// Builds `UPDATE table SET ... WHERE id = $n RETURNING id` from a
    /// snake_case record. The record's `id` selects the row.
    pub fn update_by_id(table: &str, record: &Row) -> Result<Self, GatewayError> {
        let id = record
            .get("id")
            .cloned()
            .ok_or_else(|| GatewayError::InvalidIdentifier(format!("record for {table} has no id")))?;
        let mut fields = record.clone();
        fields.remove("id");
        let columns = checked_columns(table, &fields, &[])?;
        let assignments: Vec<String> = columns
            .iter()
            .zip(placeholders(1, columns.len()))
            .map(|(c, p)| format!("{c} = {p}"))
            .collect();
        let text = format!(
            "UPDATE {table} SET {} WHERE id = ${} RETURNING id",
            assignments.join(", "),
            columns.len() + 1,
        );
        Ok(Statement::new(text).bind_record(&fields).bind(id))
    }

    fn bind_record(mut self, record: &Row) -> Self {
        for value in record.values() {
            self = match value {
                Value::Object(_) | Value::Array(_) => self.bind(value.to_string()),
                other => self.bind(other.clone()),
            };
        }
        self
    }
}

/// Converts a model into a snake_case row for [`Statement::insert`] and
/// friends.
pub fn to_row<T: Serialize>(record: &T) -> Result<Row, GatewayError> {
    let value = serde_json::to_value(record).map_err(|e| GatewayError::Decode(e.to_string()))?;
    match to_snake_case(value) {
        Value::Object(row) => Ok(row),
        _ => Err(GatewayError::Decode("record is not an object".to_string())),
    }
}

fn checked_columns<'a>(
    table: &str,
    record: &'a Row,
    conflict: &[&str],
) -> Result<Vec<&'a str>, GatewayError> {
    for ident in std::iter::once(&table).chain(conflict.iter()) {
        ensure_identifier(ident)?;
    }
    for column in record.keys() {
        ensure_identifier(column)?;
    }
    if record.is_empty() {
        return Err(GatewayError::InvalidIdentifier(format!(
            "empty record for {table}"
        )));
    }
    Ok(record.keys().map(String::as_str).collect())
}

fn placeholders(first: usize, count: usize) -> Vec<String> {
    (first..first + count).map(|i| format!("${i}")).collect()
}

/// Accepts `[a-z_][a-z0-9_]*`, the shape of every table and column name.
pub fn is_safe_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn ensure_identifier(ident: &str) -> Result<(), GatewayError> {
    if is_safe_identifier(ident) {
        Ok(())
    } else {
        Err(GatewayError::InvalidIdentifier(ident.to_string()))
    }
}

/// Executes SQL against the remote database.
#[async_trait]
pub trait QueryGateway: Send + Sync {
    /// Runs one statement and returns its rows.
    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, GatewayError>;

    /// Runs a batch of statements in one transaction; either all of them
    /// apply or none do.
    async fn transaction(&self, statements: &[Statement])
        -> Result<Vec<Vec<Row>>, GatewayError>;
}

/// Rows decoded at the boundary, plus how many were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub records: Vec<T>,
    pub dropped: usize,
}

impl<T> Default for Decoded<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            dropped: 0,
        }
    }
}

/// Runs a query and decodes every row into `T`.
pub async fn fetch_as<T: DeserializeOwned>(
    gateway: &dyn QueryGateway,
    statement: &Statement,
) -> Result<Vec<T>, GatewayError> {
    Ok(fetch_decoded(gateway, statement).await?.records)
}

/// Like [`fetch_as`], keeping the count of rows that did not decode.
pub async fn fetch_decoded<T: DeserializeOwned>(
    gateway: &dyn QueryGateway,
    statement: &Statement,
) -> Result<Decoded<T>, GatewayError> {
    let rows = gateway.query(statement).await?;
    Ok(decode_rows(rows))
}

/// Decodes rows into `T`, dropping (and logging) rows that do not fit.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Decoded<T> {
    let mut records = Vec::with_capacity(rows.len());
    let mut dropped = 0;
    for row in rows {
        let id = row.get("id").map(|v| v.to_string()).unwrap_or_default();
        match serde_json::from_value(to_camel_case(Value::Object(row))) {
            Ok(value) => records.push(value),
            Err(e) => {
                dropped += 1;
                tracing::warn!(
                    "Dropping malformed {} row {}: {}",
                    std::any::type_name::<T>().rsplit("::").next().unwrap_or("record"),
                    id,
                    e
                );
            }
        }
    }
    Decoded { records, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeeHead;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_bind_keeps_order() {
        let stmt = Statement::new("SELECT * FROM students WHERE school_id = $1 AND status = $2")
            .bind("s1")
            .bind("Active");
        assert_eq!(stmt.params(), &[json!("s1"), json!("Active")]);
    }

    #[test]
    fn test_bind_json_serializes_to_text() {
        let stmt = Statement::new("UPDATE x SET y = $1").bind_json(&vec![1, 2]);
        assert_eq!(stmt.params(), &[json!("[1,2]")]);
    }

    #[test]
    fn test_safe_identifier() {
        assert!(is_safe_identifier("fee_challans"));
        assert!(is_safe_identifier("_x1"));
        assert!(!is_safe_identifier("1abc"));
        assert!(!is_safe_identifier("name; DROP TABLE students"));
        assert!(!is_safe_identifier("feeItems"));
        assert!(!is_safe_identifier(""));
    }

    #[test]
    fn test_upsert_builds_parameterized_statement() {
        let record = row(json!({
            "id": "f1",
            "fee_items": [{"description": "Tuition", "amount": 10}],
            "total_amount": 10
        }));
        let stmt = Statement::upsert("fee_challans", &record, &["id"]).unwrap();
        assert_eq!(
            stmt.text(),
            "INSERT INTO fee_challans (fee_items, id, total_amount) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET fee_items = EXCLUDED.fee_items, total_amount = EXCLUDED.total_amount"
        );
        assert_eq!(stmt.params()[0], json!(r#"[{"amount":10,"description":"Tuition"}]"#));
        assert_eq!(stmt.params()[1], json!("f1"));
    }

    #[test]
    fn test_update_by_id_binds_id_last() {
        let record = row(json!({"id": "st1", "name": "Ali", "status": "Left"}));
        let stmt = Statement::update_by_id("students", &record).unwrap();
        assert_eq!(
            stmt.text(),
            "UPDATE students SET name = $1, status = $2 WHERE id = $3 RETURNING id"
        );
        assert_eq!(stmt.params(), &[json!("Ali"), json!("Left"), json!("st1")]);
    }

    #[test]
    fn test_to_row_is_snake_case() {
        let head = FeeHead::new("Tuition Fee", 1000.0, "s1");
        let row = to_row(&head).unwrap();
        assert_eq!(row.get("default_amount"), Some(&json!(1000.0)));
        assert_eq!(row.get("school_id"), Some(&json!("s1")));
        let stmt = Statement::insert("fee_heads", &row).unwrap();
        assert!(stmt.text().starts_with("INSERT INTO fee_heads (default_amount, id, name, school_id)"));
    }

    #[test]
    fn test_upsert_rejects_hostile_columns() {
        let record = row(json!({"id": "1", "name) VALUES ('x'); --": "y"}));
        let err = Statement::upsert("schools", &record, &["id"]).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidIdentifier(_)));
    }

    #[test]
    fn test_decode_rows_drops_malformed() {
        let rows = vec![
            row(json!({"id": "h1", "name": "Tuition", "default_amount": "1500", "school_id": "s1"})),
            row(json!({"id": "h2", "default_amount": 10})),
        ];
        let heads = decode_rows::<FeeHead>(rows);
        assert_eq!(heads.records.len(), 1);
        assert_eq!(heads.dropped, 1);
        assert_eq!(heads.records[0].default_amount, 1500.0);
    }
}
