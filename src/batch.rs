use crate::{
    session::Pipeline, transaction::TransactionMode, wire::Request, LibsqlError,
    PipelineResponse, Result, Statement,
};

/// Runs `statements` atomically in two strictly sequential round trips.
///
/// 1. `BEGIN <mode>` in a fresh stream, capturing the baton.
/// 2. The statements, `COMMIT` and a close request, continuing that baton.
///
/// Statements are encoded before anything is sent, so argument errors come
/// back unwrapped. Round-trip failures close the stream (best effort) and are
/// returned as [`LibsqlError::BatchTransaction`] wrapping
/// `InvalidStartTransaction` or `InvalidBatchTransaction`.
pub async fn batch_execute<P, I>(
    pipeline: &mut P,
    statements: I,
    mode: TransactionMode,
) -> Result<PipelineResponse>
where
    P: Pipeline,
    I: IntoIterator<Item = Statement>,
{
    let mut requests = statements
        .into_iter()
        .map(|statement| Request::execute(&statement))
        .collect::<Result<Vec<_>>>()
        .map_err(|err| {
            pipeline.report("batch_execute", &err);
            err
        })?;
    requests.push(Request::execute_sql("COMMIT"));

    let begin = pipeline
        .send_batch(vec![Request::execute_sql(mode.begin_sql())], None, false)
        .await
        .and_then(|response| {
            if let Some(error) = response.error() {
                return Err(error.clone().into());
            }
            response.baton.ok_or_else(|| {
                LibsqlError::Decode("server closed the stream without returning a baton".to_owned())
            })
        });
    let baton = match begin {
        Ok(baton) => baton,
        Err(err) => return Err(terminate(pipeline, err.into_start_transaction()).await),
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(
        %mode,
        statements = requests.len() - 1,
        "batch transaction started"
    );

    let commit = pipeline
        .send_batch(requests, Some(&baton), true)
        .await
        .and_then(|response| match response.error() {
            Some(error) => Err(error.clone().into()),
            None => Ok(response),
        });
    match commit {
        Ok(response) => Ok(response),
        Err(err) => Err(terminate(pipeline, err.into_batch_transaction()).await),
    }
}

async fn terminate<P: Pipeline>(pipeline: &mut P, phase: LibsqlError) -> LibsqlError {
    pipeline.close().await;
    let err = LibsqlError::BatchTransaction(Box::new(phase));
    pipeline.report("batch_execute", &err);
    err
}
