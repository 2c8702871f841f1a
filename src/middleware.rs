use std::collections::BTreeMap;
use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::payload::{Fault, MessagePayload};
use crate::query::{parse_query, QueryError};
use crate::severity::Severity;
use crate::sink::LogSink;

/// Error type handlers and sinks report faults with.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// The parts of an inbound request the request logger reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query_string: String,
    pub remote_addr: Option<String>,
    /// Controller name assigned by the routing framework, if any.
    pub controller: Option<String>,
    /// Action name assigned by the routing framework, if any.
    pub action: Option<String>,
}

impl Request {
    /// Build a request from a method and a request target such as
    /// `/orders?page=2`.
    pub fn new(method: impl Into<String>, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Request {
            method: method.into(),
            path: path.to_string(),
            query_string: query.to_string(),
            ..Default::default()
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new("GET", target)
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn with_route(mut self, controller: impl Into<String>, action: impl Into<String>) -> Self {
        self.controller = Some(controller.into());
        self.action = Some(action.into());
        self
    }
}

/// Status, headers and body returned by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Response {
            status,
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    /// The response substituted for a handler that failed.
    pub fn internal_server_error() -> Self {
        Response::new(500)
            .with_header("Content-Type", "text/html")
            .with_body("Internal Server Error")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Header lookup, ignoring ASCII case of the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }
}

/// A request handler wrapped by [`RequestLogger`].
///
/// An `Err` is a handler fault: the request logger answers it with a 500
/// instead of passing it on.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, request: &Request) -> Result<Response, BoxError>;
}

/// [`Handler`] backed by an async closure. See [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure taking an owned [`Request`] as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, BoxError>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, BoxError>> + Send + 'static,
{
    async fn call(&self, request: &Request) -> Result<Response, BoxError> {
        (self.f)(request.clone()).await
    }
}

/// What came out of calling the wrapped handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// The handler returned a response.
    Completed(Response),
    /// The handler failed; `response` is the substituted 500.
    Recovered { response: Response, fault: Fault },
}

impl HandlerOutcome {
    pub fn response(&self) -> &Response {
        match self {
            HandlerOutcome::Completed(response) => response,
            HandlerOutcome::Recovered { response, .. } => response,
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            HandlerOutcome::Completed(response) => response,
            HandlerOutcome::Recovered { response, .. } => response,
        }
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, HandlerOutcome::Recovered { .. })
    }
}

/// Failure while building or writing the request summary.
///
/// Unlike handler faults these are never turned into a response: they are
/// logged at error severity and returned to the caller.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("failed to decode query string: {0}")]
    Query(#[from] QueryError),

    #[error("failed to encode request summary: {0}")]
    Summary(#[from] serde_json::Error),

    #[error("log sink rejected request summary: {0}")]
    Sink(#[source] BoxError),
}

/// One log record per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    pub request: bool,
    pub request_ip: Option<String>,
    pub method: String,
    pub controller: Option<String>,
    pub action: Option<String>,
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub status: u16,
    /// Content type of the response.
    pub format: Option<String>,
    /// Whole milliseconds, rounded to nearest.
    pub duration: u64,
}

impl RequestSummary {
    pub fn build(
        request: &Request,
        response: &Response,
        elapsed: Duration,
    ) -> Result<Self, PipelineError> {
        Ok(RequestSummary {
            request: true,
            request_ip: request.remote_addr.clone(),
            method: request.method.clone(),
            controller: request.controller.clone(),
            action: request.action.clone(),
            path: request.path.clone(),
            params: parse_query(&request.query_string)?,
            status: response.status,
            format: response.content_type().map(str::to_string),
            duration: duration_ms(elapsed),
        })
    }

    pub fn to_payload(&self) -> Result<MessagePayload, PipelineError> {
        Ok(MessagePayload::classify(serde_json::to_value(self)?))
    }
}

/// Round an elapsed time to whole milliseconds; 0.4ms reports 0, 0.5ms
/// reports 1.
pub fn duration_ms(elapsed: Duration) -> u64 {
    (elapsed.as_secs_f64() * 1000.0).round() as u64
}

/// Wraps a [`Handler`], writing one summary record per request to a
/// [`LogSink`] at info severity.
///
/// Handler faults become a plain 500 response. Faults while building or
/// writing the summary are logged at error severity and then returned as
/// [`PipelineError`]. No state is kept between requests, so one logger
/// can serve concurrent requests as long as its handler and sink can.
pub struct RequestLogger<H> {
    handler: H,
    sink: Arc<dyn LogSink>,
}

impl<H: Handler> RequestLogger<H> {
    pub fn new(handler: H, sink: Arc<dyn LogSink>) -> Self {
        RequestLogger { handler, sink }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Run the handler for `request` and log the outcome.
    pub async fn handle(&self, request: &Request) -> Result<Response, PipelineError> {
        match self.process(request).await {
            Ok(response) => Ok(response),
            Err(err) => Err(self.report(err).await),
        }
    }

    /// Call the wrapped handler, converting a fault into a 500 response.
    pub async fn invoke(&self, request: &Request) -> HandlerOutcome {
        match self.handler.call(request).await {
            Ok(response) => HandlerOutcome::Completed(response),
            Err(err) => {
                let fault = Fault::from_boxed(&*err);
                tracing::warn!(
                    method = %request.method,
                    path = %request.path,
                    kind = %fault.kind,
                    error = %fault.message,
                    "request handler failed, responding with 500"
                );
                HandlerOutcome::Recovered {
                    response: Response::internal_server_error(),
                    fault,
                }
            }
        }
    }

    async fn process(&self, request: &Request) -> Result<Response, PipelineError> {
        let started = Instant::now();
        let outcome = self.invoke(request).await;
        let elapsed = started.elapsed();

        self.log_request(request, outcome.response(), elapsed).await?;
        Ok(outcome.into_response())
    }

    async fn log_request(
        &self,
        request: &Request,
        response: &Response,
        elapsed: Duration,
    ) -> Result<(), PipelineError> {
        let payload = RequestSummary::build(request, response, elapsed)?.to_payload()?;
        self.sink
            .log(Severity::Info, payload)
            .await
            .map_err(PipelineError::Sink)
    }

    /// Log a pipeline fault at error severity and hand it back.
    async fn report(&self, err: PipelineError) -> PipelineError {
        let fault = Fault::from_error(&err);
        let mut fields = Map::new();
        fields.insert("exception".into(), Value::String(fault.kind));
        fields.insert("exception_message".into(), Value::String(fault.message));
        fields.insert(
            "exception_backtrace".into(),
            if fault.backtrace.is_empty() {
                Value::Null
            } else {
                Value::from(fault.backtrace)
            },
        );

        if let Err(log_err) = self.sink.log(Severity::Error, fields.into()).await {
            tracing::error!(
                error = %err,
                log_error = %log_err,
                "failed to log request pipeline fault"
            );
        }
        err
    }
}

#[async_trait]
impl<H: Handler> Handler for RequestLogger<H> {
    async fn call(&self, request: &Request) -> Result<Response, BoxError> {
        self.handle(request).await.map_err(Into::into)
    }
}
