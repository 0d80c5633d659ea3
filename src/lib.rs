//! `libsql-pipeline` is an async client for the libSQL Hrana-over-HTTP
//! pipeline protocol.
//!
//! A [`PipelineSession`] owns the HTTP transport and the server-issued
//! [`Baton`] that chains batches into one server-side stream:
//! - [`PipelineSession::execute`] runs one statement,
//! - [`PipelineSession::batch_execute`] runs statements atomically,
//! - [`PipelineSession::transaction`] opens an interactive [`Transaction`],
//! - [`PipelineSession::execute_sequence`] runs a raw multi-statement script.
//!
//! Results are decoded into [`StatementResult`]s; [`row_map`] turns them into
//! name-addressable rows or JSON text.

mod baton;
mod batch;
mod config;
mod decode;
mod error;
mod observer;
mod options;
mod params;
mod session;
mod transaction;
mod types;
mod value;
mod wire;

pub mod row_map;

#[cfg(test)]
mod test_support;

pub use baton::Baton;
pub use batch::batch_execute;
pub use config::{Config, Endpoint};
pub use error::{ErrorCode, LibsqlError};
pub use observer::{ErrorObserver, TracingObserver};
pub use options::ClientOptions;
pub use params::{Params, Statement};
pub use session::{Pipeline, PipelineSession};
pub use transaction::{Transaction, TransactionMode, TransactionState};
pub use types::{Col, Outcome, PipelineResponse, ProtocolError, StatementResult};
pub use value::Value;
pub use wire::Request;

pub type Result<T> = std::result::Result<T, LibsqlError>;
