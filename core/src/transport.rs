//! Executes `HttpRequest` values against the network.
//!
//! # Design
//! `Transport` is the only seam that performs I/O. `UreqTransport` runs each
//! exchange with ureq's blocking agent on a worker thread through
//! `Context::run`, so the caller returns as soon as the context is cancelled
//! even while the server is still silent. The agent has status-as-error
//! turned off: 4xx/5xx answers come back as data and the operations layer
//! decides what counts as success.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::context::Context;
use crate::error::{ApiError, Cancelled};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Sends one request and returns the raw response.
///
/// Implementations must return `ApiError::Cancelled` rather than
/// `ApiError::Transport` when a failure coincides with `ctx` being done.
pub trait Transport: Send + Sync {
    fn execute(&self, ctx: &Context, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Blocking transport backed by a shared `ureq::Agent`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an agent the caller configured, e.g. with a proxy or TLS
    /// settings. The agent must be built with `http_status_as_error(false)`;
    /// otherwise every 4xx/5xx answer surfaces as `ApiError::Transport`
    /// instead of `ApiError::UnexpectedStatus`.
    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, ctx: &Context, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        ctx.check()?;
        let timeout = ctx.remaining();
        debug!(method = %request.method, url = %request.url, "sending request");

        let agent = self.agent.clone();
        let owned = request.clone();
        let response = ctx
            .run(move || exchange(&agent, &owned, timeout))?
            .map_err(|e| transport_error(ctx, e))?;
        debug!(status = response.status, url = %request.url, "received response");
        Ok(response)
    }
}

/// One blocking round-trip, body included.
fn exchange(
    agent: &ureq::Agent,
    request: &HttpRequest,
    timeout: Option<Duration>,
) -> Result<HttpResponse, ureq::Error> {
    let url = request.url.as_str();
    let mut response = match (request.method, request.body.as_deref()) {
        (HttpMethod::Get, _) => prepare(agent.get(url), request, timeout).call(),
        (HttpMethod::Delete, _) => prepare(agent.delete(url), request, timeout).call(),
        (HttpMethod::Post, Some(body)) => {
            prepare(agent.post(url), request, timeout).send(body.as_bytes())
        }
        (HttpMethod::Post, None) => prepare(agent.post(url), request, timeout).send_empty(),
    }?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = response.body_mut().read_to_string()?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn prepare<B>(
    mut builder: ureq::RequestBuilder<B>,
    request: &HttpRequest,
    timeout: Option<Duration>,
) -> ureq::RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.config().timeout_global(timeout).build()
}

/// A failure while the context is done is reported as the context's reason.
fn transport_error(ctx: &Context, err: ureq::Error) -> ApiError {
    if let Some(reason) = ctx.err() {
        return reason.into();
    }
    if matches!(err, ureq::Error::Timeout(_)) && ctx.deadline().is_some() {
        return Cancelled::DeadlineExceeded.into();
    }
    ApiError::Transport(err.to_string())
}
