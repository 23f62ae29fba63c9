//! SQL-over-HTTP client for Neon-compatible serverless Postgres endpoints.
//!
//! A single query is `POST /sql` with `{"query": "...", "params": [...]}`; a
//! transaction posts `{"queries": [...]}` and gets `{"results": [...]}` back.
//! The Postgres connection string travels in the `Neon-Connection-String`
//! header.

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{GatewayError, QueryGateway, Row, Statement};

const CONNECTION_STRING_HEADER: &str = "Neon-Connection-String";
const ARRAY_MODE_HEADER: &str = "Neon-Array-Mode";

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    params: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct TransactionBody<'a> {
    queries: Vec<QueryBody<'a>>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    results: Vec<QueryResponse>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Gateway that talks to the remote database over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: String,
    connection_string: String,
}

impl HttpGateway {
    /// Creates a gateway from a `postgres://` connection string.
    ///
    /// The SQL endpoint defaults to `https://<host>/sql`; `endpoint` overrides
    /// it (useful for proxies and local test servers).
    pub fn new(connection_string: &str, endpoint: Option<&str>) -> Result<Self, GatewayError> {
        let connection_string = connection_string.trim();
        if connection_string.is_empty() {
            return Err(GatewayError::NotConfigured);
        }

        let endpoint = match endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => default_endpoint(connection_string)?,
        };

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            connection_string: connection_string.to_string(),
        })
    }

    /// Creates a gateway from an optional configured value.
    pub fn from_config(
        connection_string: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<Self, GatewayError> {
        Self::new(connection_string.ok_or(GatewayError::NotConfigured)?, endpoint)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<B: Serialize + ?Sized>(&self, body: &B) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONNECTION_STRING_HEADER, &self.connection_string)
            .header(ARRAY_MODE_HEADER, "false")
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Err(match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(err) => GatewayError::Query {
                message: err.message,
                code: err.code,
            },
            Err(_) => GatewayError::Transport(format!("Server returned status {}", status)),
        })
    }
}

#[async_trait]
impl QueryGateway for HttpGateway {
    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, GatewayError> {
        tracing::debug!("query: {}", statement.text());
        let body = QueryBody {
            query: statement.text(),
            params: statement.params().iter().map(encode_param).collect(),
        };
        let response: QueryResponse = self
            .post(&body)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(response.rows)
    }

    async fn transaction(
        &self,
        statements: &[Statement],
    ) -> Result<Vec<Vec<Row>>, GatewayError> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!("transaction of {} statement(s)", statements.len());
        let body = TransactionBody {
            queries: statements
                .iter()
                .map(|s| QueryBody {
                    query: s.text(),
                    params: s.params().iter().map(encode_param).collect(),
                })
                .collect(),
        };
        let response: TransactionResponse = self
            .post(&body)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(response.results.into_iter().map(|r| r.rows).collect())
    }
}

fn default_endpoint(connection_string: &str) -> Result<String, GatewayError> {
    let url = Url::parse(connection_string)
        .map_err(|e| GatewayError::InvalidConnectionString(e.to_string()))?;
    if !matches!(url.scheme(), "postgres" | "postgresql") {
        return Err(GatewayError::InvalidConnectionString(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| GatewayError::InvalidConnectionString("missing host".to_string()))?;
    Ok(format!("https://{}/sql", host))
}

/// Encodes a bound value the way the endpoint expects parameters: text or
/// null. Arrays become Postgres array literals, objects JSON text.
pub fn encode_param(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(_) => value.clone(),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Number(n) => Value::String(n.to_string()),
        Value::Array(items) => Value::String(array_literal(items)),
        Value::Object(_) => Value::String(value.to_string()),
    }
}

fn array_literal(items: &[Value]) -> String {
    let elements: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::Null => "NULL".to_string(),
            Value::Array(inner) => array_literal(inner),
            Value::String(s) => quote_element(s),
            other => match encode_param(other) {
                Value::String(s) => quote_element(&s),
                _ => "NULL".to_string(),
            },
        })
        .collect();
    format!("{{{}}}", elements.join(","))
}

fn quote_element(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
