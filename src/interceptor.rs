//! Response handling pipeline for API calls.
//!
//! Every exchange runs through an ordered list of [`Interceptor`]s. Each one
//! gets the exchange and a [`Next`] continuation; calling `next.run` hands the
//! exchange to the rest of the chain and, at the end, to the terminal step
//! that turns the outcome into `Ok(())` or an [`ApiError`]. Layers can look at
//! or rewrite the exchange before that, and look at or replace the result
//! after.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use tracing::{debug, error, warn};

use crate::error::{ApiError, ErrorCode};
use crate::state::SessionHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Response { status: StatusCode, body: String },
    /// No response: connection refused, DNS, TLS, timeout.
    Transport { timeout: bool, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Something the user should be told about a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Exchange {
    pub method: Method,
    pub path: String,
    pub outcome: Outcome,
    pub alerts: Vec<Alert>,
}

impl Exchange {
    pub fn new(method: Method, path: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            method,
            path: path.into(),
            outcome,
            alerts: Vec::new(),
        }
    }
}

pub trait Interceptor: Send + Sync {
    fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), ApiError>;
}

/// The rest of the chain after the current interceptor.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Interceptor>],
}

impl Next<'_> {
    pub fn run(self, exchange: &mut Exchange) -> Result<(), ApiError> {
        match self.rest.split_first() {
            Some((head, rest)) => head.handle(exchange, Next { rest }),
            None => classify(&exchange.outcome),
        }
    }
}

fn classify(outcome: &Outcome) -> Result<(), ApiError> {
    match outcome {
        Outcome::Response { status, .. } if status.is_success() => Ok(()),
        Outcome::Response { status, body } => Err(ApiError::from_response(status.as_u16(), body)),
        Outcome::Transport { timeout, message } => {
            Err(ApiError::transport(*timeout, message.clone()))
        }
    }
}

#[derive(Clone, Default)]
pub struct InterceptorChain {
    layers: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer. Earlier layers wrap later ones.
    pub fn with(mut self, layer: impl Interceptor + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn run(&self, exchange: &mut Exchange) -> Result<(), ApiError> {
        Next { rest: &self.layers }.run(exchange)
    }
}

/// Logs every exchange; failures at error level.
pub struct TraceLayer;

impl Interceptor for TraceLayer {
    fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), ApiError> {
        let result = next.run(exchange);
        match &result {
            Ok(()) => debug!(method = %exchange.method, path = %exchange.path, "api.ok"),
            Err(e) => error!(
                method = %exchange.method,
                path = %exchange.path,
                code = %e.code,
                status = e.status,
                message = %e.message,
                "api.error"
            ),
        }
        result
    }
}

/// Drops the stored session when the server rejects our credentials.
pub struct SessionLayer {
    session: SessionHandle,
}

impl SessionLayer {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }
}

impl Interceptor for SessionLayer {
    fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), ApiError> {
        let result = next.run(exchange);
        if let Err(e) = &result {
            if e.is_unauthorized() {
                warn!(path = %exchange.path, "api.session_cleared");
                if let Err(err) = self.session.clear() {
                    warn!(error = %err, "session.save_failed");
                }
            }
        }
        result
    }
}

/// Turns failures into user-facing alerts on the exchange.
pub struct AlertLayer;

impl AlertLayer {
    pub fn alert_for(e: &ApiError) -> Alert {
        let (severity, message) = match &e.code {
            ErrorCode::Unauthorized => (Severity::Error, "Session expired, please log in again"),
            ErrorCode::DbConnection => {
                (Severity::Critical, "The server could not reach its database")
            }
            ErrorCode::Network => (Severity::Error, "Network unreachable"),
            ErrorCode::InvalidArgument => {
                (Severity::Warning, "The request was rejected as invalid")
            }
            ErrorCode::DuplicateNote => (Severity::Error, "A note like this already exists"),
            ErrorCode::Timeout => (Severity::Error, "The server took too long to respond"),
            ErrorCode::Other(_) => (Severity::Error, e.message.as_str()),
        };
        Alert {
            severity,
            code: e.code.clone(),
            message: message.to_string(),
        }
    }
}

impl Interceptor for AlertLayer {
    fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), ApiError> {
        let result = next.run(exchange);
        if let Err(e) = &result {
            exchange.alerts.push(Self::alert_for(e));
        }
        result
    }
}

/// The layers every client gets, outermost first.
pub fn default_chain(session: SessionHandle) -> InterceptorChain {
    InterceptorChain::new()
        .with(TraceLayer)
        .with(SessionLayer::new(session))
        .with(AlertLayer)
}
