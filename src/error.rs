use std::fmt;

/// Machine-readable classification of a [`LibsqlError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Connection,
    QueryOperation,
    InvalidStartTransaction,
    InvalidBatchTransaction,
    BatchTransactionTerminated,
    InvalidTransactionMode,
    InvalidTypeArgument,
    UndefinedFetchOption,
    TransactionState,
    MultipleExec,
    UrlInvalid,
    UrlSchemeNotSupported,
    UrlParamNotSupported,
    Transport,
    Http,
    Server,
    Decode,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "CONNECTION_ERROR",
            Self::QueryOperation => "QUERY_OPERATION_ERROR",
            Self::InvalidStartTransaction => "INVALID_START_TRANSACTION",
            Self::InvalidBatchTransaction => "INVALID_BATCH_TRANSACTION",
            Self::BatchTransactionTerminated => "BATCH_TRANSACTION_TERMINATED",
            Self::InvalidTransactionMode => "INVALID_TRANSACTION_MODE",
            Self::InvalidTypeArgument => "INVALID_TYPE_ARGUMENT",
            Self::UndefinedFetchOption => "UNDEFINED_FETCH_OPTION",
            Self::TransactionState => "TRANSACTION_STATE",
            Self::MultipleExec => "MULTIPLE_EXEC_ERROR",
            Self::UrlInvalid => "URL_INVALID",
            Self::UrlSchemeNotSupported => "URL_SCHEME_NOT_SUPPORTED",
            Self::UrlParamNotSupported => "URL_PARAM_NOT_SUPPORTED",
            Self::Transport => "TRANSPORT_ERROR",
            Self::Http => "HTTP_ERROR",
            Self::Server => "SERVER_ERROR",
            Self::Decode => "DECODE_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type returned by this crate.
///
/// `Transport`, `Http`, `Server` and `Decode` come straight out of a pipeline
/// round trip. The operation-level variants re-classify them with the phase in
/// which they happened, keeping the message and the server error code.
#[derive(Debug, thiserror::Error)]
pub enum LibsqlError {
    /// Health check could not reach the server.
    #[error("CONNECTION_ERROR: connection failed! {0}")]
    Connection(String),
    /// A single `execute` call failed.
    #[error("QUERY_OPERATION_ERROR: {message}")]
    QueryOperation {
        message: String,
        server_code: Option<String>,
    },
    /// The `BEGIN` round trip of a transaction failed.
    #[error("INVALID_START_TRANSACTION: {message}")]
    InvalidStartTransaction {
        message: String,
        server_code: Option<String>,
    },
    /// The statement/`COMMIT` round trip of a batch failed.
    #[error("INVALID_BATCH_TRANSACTION: {message}")]
    InvalidBatchTransaction {
        message: String,
        server_code: Option<String>,
    },
    /// A non-interactive batch was aborted; `source` names the failing phase.
    #[error("BATCH_TRANSACTION_TERMINATED: {0}")]
    BatchTransaction(#[source] Box<LibsqlError>),
    /// Transaction mode other than `write`, `read` or `deferred`.
    #[error(
        "INVALID_TRANSACTION_MODE: unknown transaction mode '{0}', supported values are \"write\", \"read\" and \"deferred\""
    )]
    InvalidTransactionMode(String),
    /// A value could not be mapped to a wire type.
    #[error("INVALID_TYPE_ARGUMENT: {0}")]
    InvalidTypeArgument(String),
    /// Unknown result materialization request.
    #[error("UNDEFINED_FETCH_OPTION: unsupported fetch option '{0}'")]
    UndefinedFetchOption(String),
    /// Operation issued against a transaction in the wrong state.
    #[error("TRANSACTION_STATE: cannot {operation} a transaction that is {state}")]
    TransactionState {
        operation: &'static str,
        state: &'static str,
    },
    /// A free-form multi-statement script failed.
    #[error("MULTIPLE_EXEC_ERROR: {message}")]
    MultipleExec {
        message: String,
        server_code: Option<String>,
    },
    #[error("URL_INVALID: {0}")]
    UrlInvalid(String),
    #[error("URL_SCHEME_NOT_SUPPORTED: {0}")]
    UrlSchemeNotSupported(String),
    #[error("URL_PARAM_NOT_SUPPORTED: {0}")]
    UrlParamNotSupported(String),
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// SQL/pipeline error returned by the server for one request.
    #[error("pipeline error at request {request_index}: {message}")]
    Server {
        /// Index of the failing request in the pipeline payload.
        request_index: usize,
        /// Error message text from the server.
        message: String,
        /// Optional engine-specific error code.
        code: Option<String>,
    },
    /// Response decoding or protocol-shape validation error.
    #[error("decode error: {0}")]
    Decode(String),
}

impl LibsqlError {
    /// Machine-readable code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Connection(_) => ErrorCode::Connection,
            Self::QueryOperation { .. } => ErrorCode::QueryOperation,
            Self::InvalidStartTransaction { .. } => ErrorCode::InvalidStartTransaction,
            Self::InvalidBatchTransaction { .. } => ErrorCode::InvalidBatchTransaction,
            Self::BatchTransaction(_) => ErrorCode::BatchTransactionTerminated,
            Self::InvalidTransactionMode(_) => ErrorCode::InvalidTransactionMode,
            Self::InvalidTypeArgument(_) => ErrorCode::InvalidTypeArgument,
            Self::UndefinedFetchOption(_) => ErrorCode::UndefinedFetchOption,
            Self::TransactionState { .. } => ErrorCode::TransactionState,
            Self::MultipleExec { .. } => ErrorCode::MultipleExec,
            Self::UrlInvalid(_) => ErrorCode::UrlInvalid,
            Self::UrlSchemeNotSupported(_) => ErrorCode::UrlSchemeNotSupported,
            Self::UrlParamNotSupported(_) => ErrorCode::UrlParamNotSupported,
            Self::Transport(_) => ErrorCode::Transport,
            Self::Http { .. } => ErrorCode::Http,
            Self::Server { .. } => ErrorCode::Server,
            Self::Decode(_) => ErrorCode::Decode,
        }
    }

    /// Error code reported by the server, if this error carries one.
    pub fn server_code(&self) -> Option<&str> {
        match self {
            Self::Server { code, .. } => code.as_deref(),
            Self::QueryOperation { server_code, .. }
            | Self::InvalidStartTransaction { server_code, .. }
            | Self::InvalidBatchTransaction { server_code, .. }
            | Self::MultipleExec { server_code, .. } => server_code.as_deref(),
            Self::BatchTransaction(inner) => inner.server_code(),
            _ => None,
        }
    }

    pub(crate) fn into_query_operation(self) -> Self {
        self.reclassify(|message, server_code| Self::QueryOperation {
            message,
            server_code,
        })
    }

    pub(crate) fn into_start_transaction(self) -> Self {
        self.reclassify(|message, server_code| Self::InvalidStartTransaction {
            message,
            server_code,
        })
    }

    pub(crate) fn into_batch_transaction(self) -> Self {
        self.reclassify(|message, server_code| Self::InvalidBatchTransaction {
            message,
            server_code,
        })
    }

    pub(crate) fn into_multiple_exec(self) -> Self {
        self.reclassify(|message, server_code| Self::MultipleExec {
            message,
            server_code,
        })
    }

    // Local validation errors keep their own classification.
    fn reclassify(self, phase: impl FnOnce(String, Option<String>) -> Self) -> Self {
        if self.is_local() {
            return self;
        }
        let (message, server_code) = self.into_parts();
        phase(message, server_code)
    }

    pub(crate) fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransactionMode(_)
                | Self::InvalidTypeArgument(_)
                | Self::UndefinedFetchOption(_)
                | Self::TransactionState { .. }
                | Self::UrlInvalid(_)
                | Self::UrlSchemeNotSupported(_)
                | Self::UrlParamNotSupported(_)
        )
    }

    fn into_parts(self) -> (String, Option<String>) {
        match self {
            Self::Server { message, code, .. } => (message, code),
            other => {
                let server_code = other.server_code().map(str::to_owned);
                (other.to_string(), server_code)
            }
        }
    }
}
