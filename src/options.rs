/// Configures HTTP timeout and endpoint paths.
///
/// Requests are never retried; a failed call surfaces as an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Path of the pipeline endpoint, relative to the base URL.
    pub pipeline_path: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            pipeline_path: "/v2/pipeline".to_owned(),
        }
    }
}
