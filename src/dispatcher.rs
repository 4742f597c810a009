//! Message dispatcher
//!
//! Routes every message a module emits through the native callback
//! surface:
//! - `HTTP_REQUEST` goes to the relay, answers are correlated by request id
//! - `RESULT` is decoded and handed to the result callback
//! - `ERROR` tears the runtime down, then reports through the callback
//!
//! Each load is one query. Exactly one terminal outcome reaches the
//! callback per query; anything the module sends afterwards is ignored.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::error::{BridgeError, ErrorKind, Prerequisite, Result};
use crate::core::logging::ModuleLogger;
use crate::decoder::{ModuleResult, ResultDecoder};
use crate::protocol::{Action, HttpMethod, RequestPayload, ResponsePayload};
use crate::relay::RequestExecutor;
use crate::runtime::BridgeMessage;

/// Teardown hook the dispatcher uses on `ERROR` and `shouldExit`
pub trait RuntimeControl {
    fn teardown(&mut self) -> Result<()>;
}

/// Receives the terminal outcome of a query
pub type ResultCallback = Arc<dyn Fn(BridgeOutcome) + Send + Sync>;

/// Terminal outcome of one query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "payload", rename_all = "snake_case")]
pub enum BridgeOutcome {
    Result(ModuleResult),
    Error(ErrorPayload),
}

impl BridgeOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, BridgeOutcome::Error(_))
    }

    pub fn into_result(self) -> std::result::Result<ModuleResult, ErrorPayload> {
        match self {
            BridgeOutcome::Result(result) => Ok(result),
            BridgeOutcome::Error(error) => Err(error),
        }
    }

    pub fn terminal_kind(&self) -> TerminalKind {
        match self {
            BridgeOutcome::Result(_) => TerminalKind::Result,
            BridgeOutcome::Error(_) => TerminalKind::Error,
        }
    }
}

/// `ERROR`-tagged description of a failed query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Query action that failed
    pub action: Action,
    pub kind: ErrorKind,
    pub error_type: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(action: Action, err: &BridgeError) -> Self {
        Self {
            action,
            kind: err.kind(),
            error_type: err.error_type().to_string(),
            message: err.to_string(),
        }
    }
}

/// Which terminal a query ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    Result,
    Error,
}

/// Relay outcome travelling back to the engine thread
#[derive(Debug)]
pub struct RelayCompletion {
    pub generation: u64,
    pub request_id: String,
    pub outcome: Result<String>,
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub url: String,
    pub method: HttpMethod,
    pub started: Instant,
}

/// In-flight HTTP asks keyed by request id
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: HashMap<String, PendingRequest>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request; returns the entry it replaced, if any
    pub fn register(
        &mut self,
        request_id: String,
        pending: PendingRequest,
    ) -> Option<PendingRequest> {
        self.entries.insert(request_id, pending)
    }

    /// Remove and return the entry for a completed request
    pub fn complete(&mut self, request_id: &str) -> Option<PendingRequest> {
        self.entries.remove(request_id)
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.entries.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub struct Dispatcher {
    session_id: String,
    decoder: ResultDecoder,
    callback: Option<ResultCallback>,
    logger: Arc<dyn ModuleLogger>,
    relay: Arc<dyn RequestExecutor>,
    worker: Handle,
    completions: mpsc::UnboundedSender<RelayCompletion>,
    table: CorrelationTable,
    generation: u64,
    terminated: bool,
    last_terminal: Option<TerminalKind>,
}

impl Dispatcher {
    pub fn new(
        session_id: impl Into<String>,
        decoder: ResultDecoder,
        relay: Arc<dyn RequestExecutor>,
        logger: Arc<dyn ModuleLogger>,
        worker: Handle,
        completions: mpsc::UnboundedSender<RelayCompletion>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            decoder,
            callback: None,
            logger,
            relay,
            worker,
            completions,
            table: CorrelationTable::new(),
            generation: 0,
            terminated: false,
            last_terminal: None,
        }
    }

    pub fn set_callback(&mut self, callback: ResultCallback) {
        self.callback = Some(callback);
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of HTTP asks still awaiting a relay answer
    pub fn pending(&self) -> usize {
        self.table.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Start a new query
    pub fn begin(&mut self) -> Result<u64> {
        if self.callback.is_none() {
            return Err(BridgeError::illegal_state("load", Prerequisite::Callback));
        }

        self.generation += 1;
        self.table.clear();
        self.terminated = false;
        self.last_terminal = None;

        debug!(session = %self.session_id, generation = self.generation, "Query started");
        Ok(self.generation)
    }

    /// Terminal reached since the last call, if any
    pub fn take_terminal(&mut self) -> Option<TerminalKind> {
        self.last_terminal.take()
    }

    pub fn on_message(&mut self, message: BridgeMessage, control: &mut dyn RuntimeControl) {
        match message {
            BridgeMessage::Log(line) => self.logger.log(&self.session_id, &line),
            BridgeMessage::HttpRequest(raw) => self.on_request(&raw, control),
            BridgeMessage::Result(raw) => {
                if self.ignored("RESULT") {
                    return;
                }
                self.deliver_result(&raw, false, control);
            }
        }
    }

    /// Turn a relay completion into the response to post back
    ///
    /// Returns `None` for completions that belong to an earlier query, that
    /// arrive after the terminal, or whose id is not pending.
    pub fn on_completion(&mut self, completion: RelayCompletion) -> Option<ResponsePayload> {
        if completion.generation != self.generation {
            debug!(
                session = %self.session_id,
                req_id = %completion.request_id,
                "Dropping completion from an earlier query"
            );
            return None;
        }
        if self.terminated {
            debug!(
                session = %self.session_id,
                req_id = %completion.request_id,
                "Dropping completion after terminal"
            );
            return None;
        }

        let pending = match self.table.complete(&completion.request_id) {
            Some(pending) => pending,
            None => {
                warn!(
                    session = %self.session_id,
                    req_id = %completion.request_id,
                    "Completion for unknown request"
                );
                return None;
            }
        };

        let elapsed_ms = pending.started.elapsed().as_millis() as u64;
        Some(match completion.outcome {
            Ok(text) => {
                debug!(
                    session = %self.session_id,
                    req_id = %completion.request_id,
                    method = %pending.method,
                    url = %pending.url,
                    elapsed_ms,
                    "Relay answered"
                );
                ResponsePayload::ok(completion.request_id, text)
            }
            Err(e) => {
                warn!(
                    session = %self.session_id,
                    req_id = %completion.request_id,
                    url = %pending.url,
                    error = %e,
                    "Relay failed"
                );
                ResponsePayload::failed(completion.request_id, e.to_string())
            }
        })
    }

    /// Report a failure raised outside the message flow (script errors)
    pub fn fail(&mut self, err: BridgeError) {
        if self.ignored("failure") {
            return;
        }
        self.finish_error(&err);
    }

    /// Drop all pending work and the callback binding
    pub fn abort(&mut self) {
        let dropped = self.table.len();
        self.table.clear();
        self.callback = None;
        self.terminated = true;
        self.generation += 1;

        if dropped > 0 {
            debug!(session = %self.session_id, dropped, "Aborted pending requests");
        }
    }

    fn on_request(&mut self, raw: &str, control: &mut dyn RuntimeControl) {
        if self.ignored("request") {
            return;
        }

        let request = match RequestPayload::parse(raw) {
            Ok(request) => request,
            Err(e) => {
                self.finish_error(&e);
                return;
            }
        };

        match request.action {
            Action::HttpRequest => self.relay_request(request),
            Action::Result => {
                let result = request.result.unwrap_or_default();
                self.deliver_result(&result, request.should_exit, control);
            }
            Action::Error => {
                if let Err(e) = control.teardown() {
                    debug!(session = %self.session_id, error = %e, "Runtime already torn down");
                }
                let message = request
                    .result
                    .unwrap_or_else(|| "Module signalled an error".to_string());
                self.finish_error(&BridgeError::ModuleError(message));
            }
            other => self.finish_error(&BridgeError::InvalidAction(other.to_string())),
        }
    }

    fn relay_request(&mut self, request: RequestPayload) {
        let method = match request.http_method() {
            Ok(method) => method,
            Err(e) => {
                self.finish_error(&e);
                return;
            }
        };

        let pending = PendingRequest {
            url: request.url.clone(),
            method,
            started: Instant::now(),
        };
        if self.table.register(request.request_id.clone(), pending).is_some() {
            warn!(
                session = %self.session_id,
                req_id = %request.request_id,
                "Duplicate request id in flight"
            );
        }

        debug!(
            session = %self.session_id,
            req_id = %request.request_id,
            %method,
            url = %request.url,
            "Relaying request"
        );

        let relay = Arc::clone(&self.relay);
        let completions = self.completions.clone();
        let generation = self.generation;
        self.worker.spawn(async move {
            let request_id = request.request_id.clone();
            let outcome = relay.execute(request).await;
            // The engine may be gone by now; the answer is simply discarded
            let _ = completions.send(RelayCompletion {
                generation,
                request_id,
                outcome,
            });
        });
    }

    fn deliver_result(&mut self, raw: &str, should_exit: bool, control: &mut dyn RuntimeControl) {
        let outcome = match self.decoder.decode(raw) {
            Ok(result) => BridgeOutcome::Result(result),
            Err(e) => BridgeOutcome::Error(ErrorPayload::new(self.decoder.action().clone(), &e)),
        };
        self.finish(outcome);

        if should_exit {
            if let Err(e) = control.teardown() {
                debug!(session = %self.session_id, error = %e, "Runtime already torn down");
            }
        }
    }

    fn finish_error(&mut self, err: &BridgeError) {
        let payload = ErrorPayload::new(self.decoder.action().clone(), err);
        self.finish(BridgeOutcome::Error(payload));
    }

    fn finish(&mut self, outcome: BridgeOutcome) {
        self.terminated = true;
        self.last_terminal = Some(outcome.terminal_kind());

        let dropped = self.table.len();
        self.table.clear();

        match &outcome {
            BridgeOutcome::Result(_) => info!(
                session = %self.session_id,
                action = %self.decoder.action(),
                dropped,
                "Query completed"
            ),
            BridgeOutcome::Error(e) => warn!(
                session = %self.session_id,
                action = %self.decoder.action(),
                error_type = %e.error_type,
                message = %e.message,
                "Query failed"
            ),
        }

        match &self.callback {
            Some(callback) => callback(outcome),
            None => warn!(session = %self.session_id, "No callback registered, outcome dropped"),
        }
    }

    /// Whether a message must be ignored because the query already ended
    fn ignored(&self, what: &str) -> bool {
        if self.terminated {
            warn!(session = %self.session_id, "Ignoring {} after terminal", what);
        }
        self.terminated
    }
}
