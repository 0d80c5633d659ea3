use std::{fmt, sync::Arc, time::Duration};

use reqwest::{header, StatusCode};

use crate::{
    batch,
    decode::decode_response,
    observer::{ErrorObserver, TracingObserver},
    transaction::TransactionMode,
    wire::{self, PipelineRequest, Request},
    Baton, ClientOptions, Config, Endpoint, LibsqlError, Outcome, PipelineResponse, Result,
    Statement, StatementResult, Transaction,
};

const HEALTH_PATH: &str = "/health";
const VERSION_PATH: &str = "/version";

/// The narrow surface shared by plain calls, transactions and batches.
///
/// [`PipelineSession`] is the HTTP implementation. One value drives exactly
/// one server-side stream; every method takes `&mut self` so a stream is
/// never driven from two places at once.
#[allow(async_fn_in_trait)]
pub trait Pipeline {
    /// Executes one statement, continuing `baton` when given and closing the
    /// stream otherwise.
    async fn execute(
        &mut self,
        statement: &Statement,
        baton: Option<&Baton>,
    ) -> Result<StatementResult>;

    /// Sends `requests` as one batch, appending a close request when `close`
    /// is set. Outcomes are decoded but not interpreted.
    async fn send_batch(
        &mut self,
        requests: Vec<Request>,
        baton: Option<&Baton>,
        close: bool,
    ) -> Result<PipelineResponse>;

    /// Best-effort close of the current stream. Never fails.
    async fn close(&mut self);

    /// Baton returned by the most recent response.
    fn baton(&self) -> Option<&Baton>;

    /// Hook for classified errors.
    fn report(&self, _operation: &'static str, _error: &LibsqlError) {}
}

/// HTTP client for one libSQL pipeline stream.
pub struct PipelineSession {
    http: reqwest::Client,
    base_url: String,
    authorization: Option<String>,
    options: ClientOptions,
    baton: Option<Baton>,
    observer: Arc<dyn ErrorObserver>,
}

impl fmt::Debug for PipelineSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineSession")
            .field("base_url", &self.base_url)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "<redacted>"),
            )
            .field("options", &self.options)
            .field("baton", &self.baton)
            .finish()
    }
}

impl PipelineSession {
    /// Creates an unauthenticated session against `base_url`
    /// (e.g. `http://127.0.0.1:8080`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            authorization: None,
            options: ClientOptions::default(),
            baton: None,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Creates a session from an already validated endpoint.
    pub fn from_endpoint(endpoint: Endpoint) -> Self {
        let session = Self::new(endpoint.base_url);
        match endpoint.auth_token {
            Some(token) => session.with_auth_token(token),
            None => session,
        }
    }

    /// Validates `config` and creates a session for it.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.endpoint().map(Self::from_endpoint)
    }

    /// Creates a session from `LIBSQL_URL` / `LIBSQL_AUTH_TOKEN`.
    ///
    /// **Not available on `wasm32` targets** — see [`Config::from_env`].
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Result<Self> {
        Self::from_config(&Config::from_env()?)
    }

    /// Sets a bearer token; the `Bearer ` prefix is added when missing.
    pub fn with_auth_token(mut self, token: impl AsRef<str>) -> Self {
        self.authorization = Some(normalize_bearer_authorization(token.as_ref()));
        self
    }

    /// Applies client options such as the timeout.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    /// Replaces the default [`TracingObserver`].
    pub fn with_observer(mut self, observer: impl ErrorObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Current origin; follows `base_url` redirections from the server.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Baton returned by the most recent response, if the stream is open.
    pub fn baton(&self) -> Option<&Baton> {
        self.baton.as_ref()
    }

    /// Checks that the server answers its health endpoint with `200 OK`.
    pub async fn connect(&self) -> Result<bool> {
        match self.get(HEALTH_PATH).send().await {
            Ok(response) => Ok(response.status() == StatusCode::OK),
            Err(err) => {
                let err = LibsqlError::Connection(err.to_string());
                self.observer.on_error("connect", &err);
                Err(err)
            }
        }
    }

    /// Returns the raw body of the version endpoint.
    pub async fn version(&self) -> Result<String> {
        let result = async {
            let response = self
                .get(VERSION_PATH)
                .send()
                .await
                .map_err(LibsqlError::Transport)?;
            read_body(response).await
        }
        .await;
        if let Err(err) = &result {
            self.observer.on_error("version", err);
        }
        result
    }

    /// Executes one statement.
    ///
    /// Without a baton the statement runs in a fresh stream that is closed in
    /// the same round trip. With a baton the stream stays open and the new
    /// baton is recorded. Any failure after encoding is reported as
    /// [`LibsqlError::QueryOperation`] and closes a continued stream.
    pub async fn execute(
        &mut self,
        statement: &Statement,
        baton: Option<&Baton>,
    ) -> Result<StatementResult> {
        let request = match Request::execute(statement) {
            Ok(request) => request,
            Err(err) => {
                self.observer.on_error("execute", &err);
                return Err(err);
            }
        };

        let result = self
            .send_batch(vec![request], baton, baton.is_none())
            .await
            .and_then(|response| {
                match response.outcomes.into_iter().next() {
                    Some(Outcome::Execute(result)) => Ok(result),
                    Some(Outcome::Error(error)) => Err(error.into()),
                    Some(_) | None => Err(LibsqlError::Decode(
                        "missing execute result".to_owned(),
                    )),
                }
            });

        match result {
            Ok(result) => Ok(result),
            Err(err) => {
                if baton.is_some() {
                    self.close().await;
                }
                let err = err.into_query_operation();
                self.observer.on_error("execute", &err);
                Err(err)
            }
        }
    }

    /// Posts one batch and records the returned baton and base URL.
    pub async fn send_batch(
        &mut self,
        mut requests: Vec<Request>,
        baton: Option<&Baton>,
        close: bool,
    ) -> Result<PipelineResponse> {
        if close {
            requests.push(Request::Close);
        }
        let payload = PipelineRequest {
            requests,
            baton: baton.map(|baton| baton.as_str().to_owned()),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            requests = payload.requests.len(),
            continued = payload.baton.is_some(),
            close,
            "sending pipeline batch"
        );

        let body = self.post_pipeline(&payload).await?;
        let response = serde_json::from_str::<wire::PipelineResponse>(&body).map_err(|err| {
            LibsqlError::Decode(format!(
                "invalid pipeline response JSON: {err}; body: {body}"
            ))
        })?;
        // The baton is recorded even when the outcomes fail to decode.
        self.baton = Baton::from_response(response.baton.clone());
        let response = decode_response(response)?;

        if let Some(base_url) = &response.base_url {
            let base_url = base_url.trim_end_matches('/');
            if base_url != self.base_url {
                #[cfg(feature = "tracing")]
                tracing::debug!(from = %self.base_url, to = %base_url, "server rerouted stream");
                self.base_url = base_url.to_owned();
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            outcomes = response.outcomes.len(),
            open = self.baton.is_some(),
            "pipeline batch answered"
        );

        Ok(response)
    }

    /// Runs a multi-statement script in a fresh stream and returns the raw
    /// response body.
    ///
    /// The script batch carries its own close request, so a stream opened
    /// earlier on this session is left untouched, even on failure.
    pub async fn execute_sequence(&mut self, sql: &str) -> Result<String> {
        let payload = PipelineRequest {
            requests: vec![Request::sequence(sql), Request::Close],
            baton: None,
        };

        match self.post_pipeline(&payload).await {
            Ok(body) => Ok(body),
            Err(err) => {
                let err = err.into_multiple_exec();
                self.observer.on_error("execute_sequence", &err);
                Err(err)
            }
        }
    }

    /// Closes the current stream, if any. Failures are reported to the
    /// observer and otherwise ignored.
    pub async fn close(&mut self) {
        let Some(baton) = self.baton.take() else {
            #[cfg(feature = "tracing")]
            tracing::debug!("no open stream to close");
            return;
        };

        if let Err(err) = self.send_batch(Vec::new(), Some(&baton), true).await {
            self.observer.on_error("close", &err);
        }
        self.baton = None;
    }

    /// Runs `statements` atomically: `BEGIN <mode>` in one round trip, then
    /// the statements plus `COMMIT` and a close in a second one.
    pub async fn batch_execute<I>(
        &mut self,
        statements: I,
        mode: TransactionMode,
    ) -> Result<PipelineResponse>
    where
        I: IntoIterator<Item = Statement>,
    {
        batch::batch_execute(self, statements, mode).await
    }

    /// Opens an interactive transaction on this session.
    pub async fn transaction<M>(&mut self, mode: M) -> Result<Transaction<'_, Self>>
    where
        M: TryInto<TransactionMode>,
        LibsqlError: From<<M as TryInto<TransactionMode>>::Error>,
    {
        let mut transaction = Transaction::new(self, mode)?;
        transaction.begin().await?;
        Ok(transaction)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .http
            .get(format!("{}{path}", self.base_url))
            .timeout(Duration::from_millis(self.options.timeout_ms));
        match &self.authorization {
            Some(authorization) => request.header(header::AUTHORIZATION, authorization),
            None => request,
        }
    }

    async fn post_pipeline(&self, payload: &PipelineRequest) -> Result<String> {
        let mut request = self
            .http
            .post(format!("{}{}", self.base_url, self.options.pipeline_path))
            .header(header::CONTENT_TYPE, "application/json")
            .timeout(Duration::from_millis(self.options.timeout_ms))
            .json(payload);
        if let Some(authorization) = &self.authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }

        let response = request.send().await.map_err(LibsqlError::Transport)?;
        read_body(response).await
    }
}

impl Pipeline for PipelineSession {
    async fn execute(
        &mut self,
        statement: &Statement,
        baton: Option<&Baton>,
    ) -> Result<StatementResult> {
        PipelineSession::execute(self, statement, baton).await
    }

    async fn send_batch(
        &mut self,
        requests: Vec<Request>,
        baton: Option<&Baton>,
        close: bool,
    ) -> Result<PipelineResponse> {
        PipelineSession::send_batch(self, requests, baton, close).await
    }

    async fn close(&mut self) {
        PipelineSession::close(self).await
    }

    fn baton(&self) -> Option<&Baton> {
        self.baton.as_ref()
    }

    fn report(&self, operation: &'static str, error: &LibsqlError) {
        self.observer.on_error(operation, error);
    }
}

impl Drop for PipelineSession {
    fn drop(&mut self) {
        #[cfg(feature = "tracing")]
        if self.baton.is_some() {
            tracing::warn!(
                base_url = %self.base_url,
                "pipeline session dropped with an open stream; call close() first"
            );
        }
    }
}

async fn read_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await.map_err(LibsqlError::Transport)?;
    if !status.is_success() {
        return Err(LibsqlError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
