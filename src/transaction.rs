use std::{fmt, str::FromStr};

use crate::{
    session::Pipeline, wire::Request, Baton, LibsqlError, PipelineResponse, Result, Statement,
    StatementResult,
};

/// Locking behaviour requested when a transaction begins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// `BEGIN IMMEDIATE`.
    Write,
    /// `BEGIN TRANSACTION READONLY`.
    Read,
    /// `BEGIN DEFERRED`.
    #[default]
    Deferred,
}

impl TransactionMode {
    pub fn begin_sql(self) -> &'static str {
        match self {
            Self::Write => "BEGIN IMMEDIATE",
            Self::Read => "BEGIN TRANSACTION READONLY",
            Self::Deferred => "BEGIN DEFERRED",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Read => "read",
            Self::Deferred => "deferred",
        }
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionMode {
    type Err = LibsqlError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "write" => Ok(Self::Write),
            "read" => Ok(Self::Read),
            "deferred" => Ok(Self::Deferred),
            _ => Err(LibsqlError::InvalidTransactionMode(value.to_owned())),
        }
    }
}

impl TryFrom<&str> for TransactionMode {
    type Error = LibsqlError;

    fn try_from(value: &str) -> Result<Self> {
        value.parse()
    }
}

impl From<std::convert::Infallible> for LibsqlError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

/// Lifecycle of a [`Transaction`]; it only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Open,
    Closed,
}

impl TransactionState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// Interactive transaction over one pipeline stream.
///
/// `begin` opens the stream with `BEGIN <mode>` and keeps its baton.
/// Statements passed to [`Transaction::add`] are queued locally and shipped
/// together with `COMMIT` by [`Transaction::commit`], which also closes the
/// stream. [`Transaction::rollback`] discards the queue and closes the stream.
pub struct Transaction<'s, P: Pipeline> {
    pipeline: &'s mut P,
    mode: TransactionMode,
    baton: Option<Baton>,
    pending: Vec<Request>,
    state: TransactionState,
}

impl<'s, P: Pipeline> fmt::Debug for Transaction<'s, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("mode", &self.mode)
            .field("baton", &self.baton)
            .field("pending", &self.pending.len())
            .field("state", &self.state)
            .finish()
    }
}

impl<'s, P: Pipeline> Transaction<'s, P> {
    /// Creates an idle transaction. The mode is validated here, before any
    /// request is sent.
    pub fn new<M>(pipeline: &'s mut P, mode: M) -> Result<Self>
    where
        M: TryInto<TransactionMode>,
        LibsqlError: From<<M as TryInto<TransactionMode>>::Error>,
    {
        let mode = match mode.try_into() {
            Ok(mode) => mode,
            Err(err) => {
                let err = LibsqlError::from(err);
                pipeline.report("transaction", &err);
                return Err(err);
            }
        };

        Ok(Self {
            pipeline,
            mode,
            baton: None,
            pending: Vec::new(),
            state: TransactionState::Idle,
        })
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn baton(&self) -> Option<&Baton> {
        self.baton.as_ref()
    }

    /// Number of statements queued for commit.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Sends `BEGIN <mode>` in a fresh stream and keeps the returned baton.
    ///
    /// A failed begin leaves the transaction closed.
    pub async fn begin(&mut self) -> Result<()> {
        self.expect_state(TransactionState::Idle, "begin")?;
        self.state = TransactionState::Closed;

        let result = self
            .pipeline
            .send_batch(vec![Request::execute_sql(self.mode.begin_sql())], None, false)
            .await
            .and_then(|response| {
                if let Some(error) = response.error() {
                    return Err(error.clone().into());
                }
                response.baton.ok_or_else(|| {
                    LibsqlError::Decode(
                        "server closed the stream without returning a baton".to_owned(),
                    )
                })
            });

        match result {
            Ok(baton) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(mode = %self.mode, "transaction opened");
                self.baton = Some(baton);
                self.state = TransactionState::Open;
                Ok(())
            }
            Err(err) => Err(self.fail("begin", err.into_start_transaction()).await),
        }
    }

    /// Queues a statement for the commit batch. No request is sent.
    pub fn add(&mut self, statement: impl Into<Statement>) -> Result<&mut Self> {
        self.expect_state(TransactionState::Open, "add to")?;
        let request = Request::execute(&statement.into()).map_err(|err| {
            self.pipeline.report("add", &err);
            err
        })?;
        self.pending.push(request);
        Ok(self)
    }

    /// Executes a statement right away inside the open stream, outside the
    /// commit queue.
    ///
    /// A failure closes the stream and with it the transaction.
    pub async fn execute(&mut self, statement: &Statement) -> Result<StatementResult> {
        self.expect_state(TransactionState::Open, "execute in")?;

        let result = self
            .pipeline
            .execute(statement, self.baton.as_ref())
            .await;
        self.baton = self.pipeline.baton().cloned();
        if result.is_err() || self.baton.is_none() {
            self.state = TransactionState::Closed;
            self.pending.clear();
        }
        result
    }

    /// Sends the queued statements followed by `COMMIT`, closing the stream.
    ///
    /// The returned response holds one outcome per queued statement, then the
    /// `COMMIT` outcome and the close outcome. A server error on any of them
    /// fails the call with [`LibsqlError::InvalidBatchTransaction`].
    pub async fn commit(&mut self) -> Result<PipelineResponse> {
        self.expect_state(TransactionState::Open, "commit")?;
        self.state = TransactionState::Closed;

        let mut requests = std::mem::take(&mut self.pending);
        requests.push(Request::execute_sql("COMMIT"));
        let baton = self.baton.take();

        let result = self
            .pipeline
            .send_batch(requests, baton.as_ref(), true)
            .await
            .and_then(|response| match response.error() {
                Some(error) => Err(error.clone().into()),
                None => Ok(response),
            });

        match result {
            Ok(response) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(mode = %self.mode, "transaction committed");
                Ok(response)
            }
            Err(err) => Err(self.fail("commit", err.into_batch_transaction()).await),
        }
    }

    /// Same as [`Transaction::commit`].
    pub async fn end_transaction(&mut self) -> Result<PipelineResponse> {
        self.commit().await
    }

    /// Sends `ROLLBACK` and closes the stream, discarding queued statements.
    pub async fn rollback(&mut self) -> Result<()> {
        self.expect_state(TransactionState::Open, "roll back")?;
        self.state = TransactionState::Closed;
        self.pending.clear();
        let baton = self.baton.take();

        let result = self
            .pipeline
            .send_batch(
                vec![Request::execute_sql("ROLLBACK")],
                baton.as_ref(),
                true,
            )
            .await
            .and_then(|response| match response.error() {
                Some(error) => Err(error.clone().into()),
                None => Ok(()),
            });

        match result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(mode = %self.mode, "transaction rolled back");
                Ok(())
            }
            Err(err) => Err(self.fail("rollback", err.into_query_operation()).await),
        }
    }

    fn expect_state(&self, expected: TransactionState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        let err = LibsqlError::TransactionState {
            operation,
            state: self.state.as_str(),
        };
        self.pipeline.report("transaction", &err);
        Err(err)
    }

    async fn fail(&mut self, operation: &'static str, err: LibsqlError) -> LibsqlError {
        self.pipeline.close().await;
        self.baton = None;
        self.pipeline.report(operation, &err);
        err
    }
}

impl<'s, P: Pipeline> Drop for Transaction<'s, P> {
    fn drop(&mut self) {
        #[cfg(feature = "tracing")]
        if self.state == TransactionState::Open {
            tracing::warn!(
                mode = %self.mode,
                pending = self.pending.len(),
                "transaction dropped while open; the server will roll it back when the stream expires"
            );
        }
    }
}
