use serde::{Deserialize, Serialize};

/// Body of one pipeline HTTP call.
#[derive(Debug, Serialize)]
pub struct PipelineRequest {
    pub requests: Vec<Request>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baton: Option<String>,
}

/// A single request inside a pipeline batch.
///
/// Build execute requests with [`Request::execute`], multi-statement scripts
/// with [`Request::sequence`] and stream termination with [`Request::Close`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Execute { stmt: ExecuteStatement },
    Sequence { sql: String },
    Close,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecuteStatement {
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub named_args: Option<Vec<NamedArg>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NamedArg {
    pub name: String,
    pub value: Value,
}

/// Outgoing typed value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Value {
    Null {},
    Integer { value: String },
    Float { value: f64 },
    Text { value: String },
    Blob { value: String },
}

/// Incoming typed value, kept loose so unknown tags can still be decoded.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Cell {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub base64: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PipelineResponse {
    #[serde(default)]
    pub baton: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub results: Vec<PipelineResult>,
}

#[derive(Debug, Deserialize)]
pub struct PipelineResult {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub response: Option<ResponseEnvelope>,
    #[serde(default)]
    pub error: Option<PipelineError>,
}

#[derive(Debug, Deserialize)]
pub struct PipelineError {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub result: Option<ExecuteResult>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteResult {
    #[serde(default)]
    pub cols: Vec<Col>,
    #[serde(default)]
    pub rows: Vec<Vec<Cell>>,
    #[serde(default)]
    pub affected_row_count: u64,
    #[serde(default)]
    pub last_insert_rowid: Option<IntOrText>,
    #[serde(default)]
    pub replication_index: Option<IntOrText>,
    #[serde(default)]
    pub rows_read: Option<u64>,
    #[serde(default)]
    pub rows_written: Option<u64>,
    #[serde(default)]
    pub query_duration_ms: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct Col {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub decltype: Option<String>,
}

/// Servers disagree on whether row ids and replication indexes are JSON
/// numbers or decimal strings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IntOrText {
    Int(i64),
    Text(String),
}
