use crate::{row_map::RowRef, Baton, LibsqlError, Value};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Col {
    pub name: String,
    pub decltype: Option<String>,
}

/// Decoded result of one executed statement.
#[derive(Clone, Debug, PartialEq)]
pub struct StatementResult {
    pub cols: Vec<Col>,
    pub rows: Vec<Vec<Value>>,
    pub affected_row_count: u64,
    pub last_insert_rowid: Option<i64>,
    pub replication_index: Option<String>,
    pub rows_read: Option<u64>,
    pub rows_written: Option<u64>,
    pub query_duration_ms: Option<f64>,
}

impl StatementResult {
    /// Iterates rows as column-aligned views.
    pub fn rows_iter(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(|values| RowRef {
            cols: &self.cols,
            values,
        })
    }
}

/// Error reported by the server for one request of a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolError {
    /// Index of the failing request in the batch.
    pub request_index: usize,
    pub message: String,
    pub code: Option<String>,
}

impl From<ProtocolError> for LibsqlError {
    fn from(error: ProtocolError) -> Self {
        Self::Server {
            request_index: error.request_index,
            message: error.message,
            code: error.code,
        }
    }
}

/// Outcome of one request, aligned with the request order of the batch.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Execute(StatementResult),
    Sequence,
    Close,
    Error(ProtocolError),
}

/// Decoded pipeline response.
///
/// Outcomes stop at the first [`Outcome::Error`]; requests after it have no
/// entry.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineResponse {
    /// Continuation token; `None` means the stream is closed server-side.
    pub baton: Option<Baton>,
    /// Origin the server wants subsequent requests sent to.
    pub base_url: Option<String>,
    pub outcomes: Vec<Outcome>,
}

impl PipelineResponse {
    /// Statement results in request order, skipping close/sequence outcomes.
    pub fn results(&self) -> impl Iterator<Item = &StatementResult> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            Outcome::Execute(result) => Some(result),
            _ => None,
        })
    }

    /// First statement result, for call sites expecting a single result set.
    pub fn first(&self) -> Option<&StatementResult> {
        self.results().next()
    }

    /// Server error that ended outcome mapping, if any.
    pub fn error(&self) -> Option<&ProtocolError> {
        self.outcomes.iter().find_map(|outcome| match outcome {
            Outcome::Error(error) => Some(error),
            _ => None,
        })
    }

    /// Consumes the response into its statement results, failing on the
    /// first server error.
    pub fn into_results(self) -> Result<Vec<StatementResult>, LibsqlError> {
        let mut results = Vec::with_capacity(self.outcomes.len());
        for outcome in self.outcomes {
            match outcome {
                Outcome::Execute(result) => results.push(result),
                Outcome::Error(error) => return Err(error.into()),
                Outcome::Sequence | Outcome::Close => {}
            }
        }
        Ok(results)
    }
}
