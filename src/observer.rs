//! Error observation hook.

use crate::LibsqlError;

/// Receives every classified error before it is returned to the caller.
///
/// Install one with [`crate::PipelineSession::with_observer`]. Any
/// `Fn(&'static str, &LibsqlError)` closure works as an observer.
pub trait ErrorObserver: Send + Sync {
    fn on_error(&self, operation: &'static str, error: &LibsqlError);
}

impl<F> ErrorObserver for F
where
    F: Fn(&'static str, &LibsqlError) + Send + Sync,
{
    fn on_error(&self, operation: &'static str, error: &LibsqlError) {
        self(operation, error)
    }
}

/// Default observer: a `warn` event per error when the `tracing` feature is
/// enabled, nothing otherwise.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl ErrorObserver for TracingObserver {
    #[allow(unused_variables)]
    fn on_error(&self, operation: &'static str, error: &LibsqlError) {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            operation,
            code = error.code().as_str(),
            server_code = error.server_code(),
            "{error}"
        );
    }
}
