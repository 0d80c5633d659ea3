//! In-memory [`Pipeline`] for state-machine tests.

use std::{cell::RefCell, collections::VecDeque};

use crate::{
    session::Pipeline,
    wire::{PipelineRequest, Request},
    Baton, ErrorCode, LibsqlError, Outcome, PipelineResponse, ProtocolError, Result, Statement,
    StatementResult,
};

/// Records every batch body and answers from a scripted queue.
pub(crate) struct FakePipeline {
    responses: VecDeque<Result<PipelineResponse>>,
    baton: Option<Baton>,
    pub bodies: Vec<serde_json::Value>,
    pub closed: usize,
    reported: RefCell<Vec<(&'static str, ErrorCode)>>,
}

impl FakePipeline {
    pub fn new(responses: Vec<Result<PipelineResponse>>) -> Self {
        Self {
            responses: responses.into(),
            baton: None,
            bodies: Vec::new(),
            closed: 0,
            reported: RefCell::default(),
        }
    }
}

impl Pipeline for FakePipeline {
    async fn execute(
        &mut self,
        statement: &Statement,
        baton: Option<&Baton>,
    ) -> Result<StatementResult> {
        let request = Request::execute(statement)?;
        let response = self
            .send_batch(vec![request], baton, baton.is_none())
            .await?;
        match response.outcomes.into_iter().next() {
            Some(Outcome::Execute(result)) => Ok(result),
            Some(Outcome::Error(error)) => Err(LibsqlError::from(error).into_query_operation()),
            _ => Err(LibsqlError::Decode("missing execute result".to_owned())),
        }
    }

    async fn send_batch(
        &mut self,
        mut requests: Vec<Request>,
        baton: Option<&Baton>,
        close: bool,
    ) -> Result<PipelineResponse> {
        if close {
            requests.push(Request::Close);
        }
        let body = PipelineRequest {
            requests,
            baton: baton.map(|baton| baton.as_str().to_owned()),
        };
        self.bodies
            .push(serde_json::to_value(&body).expect("request body must serialize"));

        let response = self
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(LibsqlError::Decode("no scripted response".to_owned())))?;
        self.baton = response.baton.clone();
        Ok(response)
    }

    async fn close(&mut self) {
        self.closed += 1;
        self.baton = None;
    }

    fn baton(&self) -> Option<&Baton> {
        self.baton.as_ref()
    }

    fn report(&self, operation: &'static str, error: &LibsqlError) {
        self.reported.borrow_mut().push((operation, error.code()));
    }
}

impl FakePipeline {
    /// Operations and codes passed to [`Pipeline::report`], in order.
    pub fn reported(&self) -> Vec<(&'static str, ErrorCode)> {
        self.reported.borrow().clone()
    }
}

fn empty_result() -> StatementResult {
    StatementResult {
        cols: Vec::new(),
        rows: Vec::new(),
        affected_row_count: 0,
        last_insert_rowid: None,
        replication_index: None,
        rows_read: None,
        rows_written: None,
        query_duration_ms: None,
    }
}

/// `count` successful execute outcomes with the given baton.
pub(crate) fn ok_response(count: usize, baton: Option<&str>) -> PipelineResponse {
    PipelineResponse {
        baton: Baton::from_response(baton.map(str::to_owned)),
        base_url: None,
        outcomes: (0..count).map(|_| Outcome::Execute(empty_result())).collect(),
    }
}

/// `count` successful execute outcomes followed by a close outcome.
pub(crate) fn closed_response(count: usize) -> PipelineResponse {
    let mut response = ok_response(count, None);
    response.outcomes.push(Outcome::Close);
    response
}

/// Successful outcomes up to `index`, then a constraint error.
pub(crate) fn error_response(index: usize, message: &str, baton: Option<&str>) -> PipelineResponse {
    let mut response = ok_response(index, baton);
    response.outcomes.push(Outcome::Error(ProtocolError {
        request_index: index,
        message: message.to_owned(),
        code: Some("SQLITE_CONSTRAINT".to_owned()),
    }));
    response
}
