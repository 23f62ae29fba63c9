//! Scripted fakes shared by the unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backup::{BackupTarget, DriveError, RemoteBackup};
use crate::gateway::{GatewayError, QueryGateway, Row, Statement};

struct Rule {
    needle: String,
    outcome: Result<Vec<Row>, GatewayError>,
    delay: Option<Duration>,
    times: Option<usize>,
    /// Matching statements let through before the rule applies.
    skip: usize,
}

#[derive(Default)]
struct Inner {
    statements: Vec<Statement>,
    transactions: Vec<Vec<Statement>>,
    tables: HashMap<String, Vec<Row>>,
    rules: Vec<Rule>,
    store_inserts: bool,
}

/// Gateway fake that records every statement.
///
/// SELECTs are answered with the fixture rows of the table named after
/// `FROM` (unfiltered). Statements with `RETURNING` get a single id row.
/// Rules matched by substring override both. With [`storing_inserts`]
/// every successful `INSERT INTO` is appended to its fixture table, so a
/// resync sees it.
///
/// [`storing_inserts`]: RecordingGateway::storing_inserts
#[derive(Clone, Default)]
pub struct RecordingGateway {
    inner: Arc<Mutex<Inner>>,
}

pub fn fixture_row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture row must be an object, got {other}"),
    }
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        self.set_rows(table, rows);
        self
    }

    pub fn set_rows(&self, table: &str, rows: Vec<Value>) {
        let rows = rows.into_iter().map(fixture_row).collect();
        self.lock().tables.insert(table.to_string(), rows);
    }

    /// Fails every statement containing `needle`.
    pub fn fail_on(self, needle: &str, error: GatewayError) -> Self {
        self.push_rule(needle, Err(error), None, None);
        self
    }

    /// Fails the next statement containing `needle`, then behaves normally.
    pub fn fail_once_on(self, needle: &str, error: GatewayError) -> Self {
        self.push_rule(needle, Err(error), None, Some(1));
        self
    }

    /// Lets the first `skip` statements containing `needle` through, then
    /// fails the next one.
    pub fn fail_after(self, needle: &str, skip: usize, error: GatewayError) -> Self {
        self.lock().rules.push(Rule {
            needle: needle.to_string(),
            outcome: Err(error),
            delay: None,
            times: Some(1),
            skip,
        });
        self
    }

    pub fn storing_inserts(self) -> Self {
        self.lock().store_inserts = true;
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn respond_on(self, needle: &str, rows: Vec<Value>) -> Self {
        let rows = rows.into_iter().map(fixture_row).collect();
        self.push_rule(needle, Ok(rows), None, None);
        self
    }

    /// Delays statements containing `needle` before answering normally.
    pub fn delay_on(self, needle: &str, delay: Duration) -> Self {
        self.lock().rules.push(Rule {
            needle: needle.to_string(),
            outcome: Ok(Vec::new()),
            delay: Some(delay),
            times: Some(0),
            skip: 0,
        });
        self
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.lock().statements.clone()
    }

    pub fn transactions(&self) -> Vec<Vec<Statement>> {
        self.lock().transactions.clone()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.lock()
            .statements
            .iter()
            .filter(|s| s.text().contains(needle))
            .count()
    }

    pub fn clear_log(&self) {
        let mut inner = self.lock();
        inner.statements.clear();
        inner.transactions.clear();
    }

    fn push_rule(
        &self,
        needle: &str,
        outcome: Result<Vec<Row>, GatewayError>,
        delay: Option<Duration>,
        times: Option<usize>,
    ) {
        self.lock().rules.push(Rule {
            needle: needle.to_string(),
            outcome,
            delay,
            times,
            skip: 0,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn delay_for(&self, statement: &Statement) -> Option<Duration> {
        self.lock()
            .rules
            .iter()
            .find(|r| r.delay.is_some() && statement.text().contains(&r.needle))
            .and_then(|r| r.delay)
    }

    fn answer(&self, statement: &Statement, store: bool) -> Result<Vec<Row>, GatewayError> {
        let mut inner = self.lock();
        inner.statements.push(statement.clone());

        let text = statement.text();
        let rule = inner.rules.iter_mut().find(|r| {
            r.delay.is_none() && r.times != Some(0) && text.contains(&r.needle)
        });
        if let Some(rule) = rule {
            if rule.skip > 0 {
                rule.skip -= 1;
            } else {
                if let Some(times) = rule.times.as_mut() {
                    *times -= 1;
                }
                return rule.outcome.clone();
            }
        }

        if text.trim_start().starts_with("SELECT") {
            let rows = table_name(text)
                .and_then(|t| inner.tables.get(t))
                .cloned()
                .unwrap_or_default();
            return Ok(rows);
        }
        if store && inner.store_inserts {
            store_insert(&mut inner, statement);
        }
        if text.contains("RETURNING") {
            return Ok(vec![fixture_row(json!({"id": "returned"}))]);
        }
        Ok(Vec::new())
    }
}

/// Appends the row of an `INSERT INTO table (cols) VALUES (...)` statement.
fn store_insert(inner: &mut Inner, statement: &Statement) {
    let Some(rest) = statement.text().trim_start().strip_prefix("INSERT INTO ") else {
        return;
    };
    let Some((table, rest)) = rest.split_once(" (") else {
        return;
    };
    let Some((columns, _)) = rest.split_once(')') else {
        return;
    };
    let row: Row = columns
        .split(',')
        .map(|c| c.trim().to_string())
        .zip(statement.params().iter().cloned())
        .collect();
    inner.tables.entry(table.to_string()).or_default().push(row);
}

fn table_name(text: &str) -> Option<&str> {
    let start = text.find(" FROM ")? + " FROM ".len();
    text[start..]
        .split(|c: char| c.is_whitespace() || c == ';' || c == ')')
        .next()
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl QueryGateway for RecordingGateway {
    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, GatewayError> {
        if let Some(delay) = self.delay_for(statement) {
            tokio::time::sleep(delay).await;
        }
        self.answer(statement, true)
    }

    /// All or nothing: inserts are stored only when every statement succeeds.
    async fn transaction(&self, statements: &[Statement]) -> Result<Vec<Vec<Row>>, GatewayError> {
        self.lock().transactions.push(statements.to_vec());
        let results = statements
            .iter()
            .map(|s| self.answer(s, false))
            .collect::<Result<Vec<_>, _>>()?;
        let mut inner = self.lock();
        if inner.store_inserts {
            for statement in statements {
                store_insert(&mut inner, statement);
            }
        }
        Ok(results)
    }
}

/// Backup target held in memory. Uploads can be made to fail.
#[derive(Clone, Default)]
pub struct MemoryTarget {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    files: Vec<(RemoteBackup, Vec<u8>)>,
    failure: Option<DriveError>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, error: DriveError) {
        self.inner.lock().unwrap().failure = Some(error);
    }

    pub fn recover(&self) {
        self.inner.lock().unwrap().failure = None;
    }

    pub fn uploads(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.files.iter().map(|(f, _)| f.name.clone()).collect()
    }
}

#[async_trait]
impl BackupTarget for MemoryTarget {
    async fn upload(&self, name: &str, contents: Vec<u8>) -> Result<RemoteBackup, DriveError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.failure.clone() {
            return Err(error);
        }
        let file = RemoteBackup {
            id: format!("file{}", inner.files.len() + 1),
            name: name.to_string(),
            created_time: None,
        };
        inner.files.push((file.clone(), contents));
        Ok(file)
    }

    async fn list(&self) -> Result<Vec<RemoteBackup>, DriveError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.files.iter().rev().map(|(f, _)| f.clone()).collect())
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>, DriveError> {
        let inner = self.inner.lock().unwrap();
        inner
            .files
            .iter()
            .find(|(f, _)| f.id == id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or(DriveError::Status(404))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_selects_use_fixtures() {
        let gw = RecordingGateway::new().with_rows("students", vec![json!({"id": "st1"})]);
        let rows = gw
            .query(&Statement::new("SELECT * FROM students WHERE school_id = $1").bind("s1"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(gw.count_matching("FROM students"), 1);
    }

    #[tokio::test]
    async fn test_fail_once_then_recover() {
        let gw = RecordingGateway::new()
            .fail_once_on("FROM schools", GatewayError::Transport("reset".into()));
        let stmt = Statement::new("SELECT * FROM schools");
        assert!(gw.query(&stmt).await.is_err());
        assert!(gw.query(&stmt).await.is_ok());
    }

    #[tokio::test]
    async fn test_stored_inserts_feed_later_selects() {
        let gw = RecordingGateway::new()
            .storing_inserts()
            .fail_after("INSERT INTO students", 1, GatewayError::Transport("reset".into()));
        let insert = |id: &str| {
            Statement::new("INSERT INTO students (id, name) VALUES ($1, $2)")
                .bind(id)
                .bind("Ali")
        };
        gw.query(&insert("st1")).await.unwrap();
        assert!(gw.query(&insert("st2")).await.is_err());
        assert!(gw.transaction(&[insert("st3"), insert("st4")]).await.is_ok());

        let rows = gw
            .query(&Statement::new("SELECT * FROM students"))
            .await
            .unwrap();
        let ids: Vec<&Value> = rows.iter().map(|r| &r["id"]).collect();
        assert_eq!(ids, vec![&json!("st1"), &json!("st3"), &json!("st4")]);
        assert_eq!(rows[0]["name"], json!("Ali"));
    }
}
