//! Module bridge
//!
//! A [`Bridge`] runs one media module in its own sandboxed script context
//! and answers one query at a time. The script engine is single-threaded,
//! so each bridge owns a dedicated engine thread; the handle talks to it
//! over channels and can be shared freely across tasks.
//!
//! HTTP work the module asks for is executed on the caller's tokio
//! runtime and marshalled back to the engine thread before the module
//! sees it.

pub mod lifecycle;

use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

use crate::core::config::{Config, RelayConfig};
use crate::core::error::{BridgeError, ErrorKind, Result};
use crate::core::logging::{ModuleLogger, TracingModuleLogger};
use crate::decoder::ResultDecoder;
use crate::dispatcher::{BridgeOutcome, Dispatcher, RelayCompletion, ResultCallback};
use crate::protocol::{Action, FormatVersion, WebviewPayload};
use crate::relay::{HttpRelay, RequestExecutor};
use crate::runtime::{BootstrapSource, BridgeMessage, Capabilities, ScriptRuntime};

pub use lifecycle::{BridgeState, TerminalOutcome};

/// Host context a bridge is created with
#[derive(Clone)]
pub struct BridgeOptions {
    /// Query action this bridge decodes results for
    pub action: Action,
    /// Tag carried on every log line of this bridge
    pub session_id: String,
    pub format_version: FormatVersion,
    pub bootstrap: BootstrapSource,
    /// Values modules read through `getSwitchValue`
    pub switch_values: Map<String, Value>,
    pub relay: RelayConfig,
    pub logger: Arc<dyn ModuleLogger>,
}

impl BridgeOptions {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            session_id: uuid::Uuid::new_v4().to_string(),
            format_version: FormatVersion::LATEST,
            bootstrap: BootstrapSource::Embedded,
            switch_values: Map::new(),
            relay: RelayConfig::default(),
            logger: Arc::new(TracingModuleLogger),
        }
    }

    /// Options taken from the loaded configuration
    pub fn from_config(action: Action, config: &Config) -> Self {
        Self {
            format_version: config.bridge.format_version(),
            bootstrap: BootstrapSource::from_dir(config.bridge.bootstrap_dir.clone()),
            relay: config.relay.clone(),
            ..Self::new(action)
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_format_version(mut self, version: FormatVersion) -> Self {
        self.format_version = version;
        self
    }

    pub fn with_bootstrap(mut self, source: BootstrapSource) -> Self {
        self.bootstrap = source;
        self
    }

    pub fn with_switch_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.switch_values.insert(key.into(), value);
        self
    }

    pub fn with_relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn ModuleLogger>) -> Self {
        self.logger = logger;
        self
    }
}

/// Command sent to the engine thread
enum Command {
    Initialize {
        callback: ResultCallback,
        resp: oneshot::Sender<Result<()>>,
    },
    Load {
        code: String,
        payload: WebviewPayload,
        resp: oneshot::Sender<Result<()>>,
    },
    Destroy {
        resp: oneshot::Sender<Result<()>>,
    },
}

/// Handle to a bridge instance
///
/// Lifecycle errors (calling `load` before `initialize`, destroying twice)
/// are returned from the call. Everything the module does wrong ends up in
/// the result callback as an error outcome.
pub struct Bridge {
    session_id: String,
    action: Action,
    format_version: FormatVersion,
    tx: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<BridgeState>,
}

impl Bridge {
    /// Create a bridge relaying module HTTP asks through reqwest
    pub fn new(options: BridgeOptions) -> Result<Self> {
        let relay = Arc::new(HttpRelay::new(&options.relay)?);
        Self::with_executor(options, relay)
    }

    /// Create a bridge with a custom request executor
    ///
    /// Must be called from within a tokio runtime; relay work is spawned on it.
    pub fn with_executor(
        options: BridgeOptions,
        executor: Arc<dyn RequestExecutor>,
    ) -> Result<Self> {
        let decoder = ResultDecoder::for_action(options.action.clone())?;
        if !options.format_version.supports(&options.action) {
            return Err(BridgeError::UnsupportedAction {
                action: options.action,
                version: options.format_version,
            });
        }

        let worker = Handle::try_current().map_err(|e| {
            BridgeError::Initialization(format!("A tokio runtime is required: {}", e))
        })?;

        let (tx, commands) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(BridgeState::Uninitialized);

        let session_id = options.session_id.clone();
        let action = options.action.clone();
        let format_version = options.format_version;

        thread::Builder::new()
            .name(format!("modbridge-{}", session_id))
            .spawn(move || {
                let session_id = options.session_id.clone();
                debug!(session = %session_id, "Starting engine thread");

                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!(session = %session_id, "Failed to create engine runtime: {}", e);
                        return;
                    }
                };

                let local = tokio::task::LocalSet::new();
                local.block_on(&rt, async move {
                    let (messages_tx, messages) = mpsc::unbounded_channel();
                    let (completions_tx, completions) = mpsc::unbounded_channel();

                    let engine = Engine {
                        session_id: options.session_id.clone(),
                        action: options.action.clone(),
                        runtime: ScriptRuntime::new(
                            options.format_version,
                            options.bootstrap,
                            options.switch_values,
                        ),
                        dispatcher: Dispatcher::new(
                            options.session_id,
                            decoder,
                            executor,
                            options.logger,
                            worker,
                            completions_tx,
                        ),
                        state: BridgeState::Uninitialized,
                        state_tx,
                        messages_tx,
                    };

                    engine.run(commands, messages, completions).await;
                });

                debug!(session = %session_id, "Engine thread stopped");
            })?;

        info!(session = %session_id, %action, version = %format_version, "Bridge created");

        Ok(Self {
            session_id,
            action,
            format_version,
            tx,
            state,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn format_version(&self) -> FormatVersion {
        self.format_version
    }

    /// Current lifecycle state
    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Create the script context and register the result callback
    ///
    /// Calling it again keeps the context and replaces the callback.
    pub async fn initialize<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(BridgeOutcome) + Send + Sync + 'static,
    {
        let callback: ResultCallback = Arc::new(callback);
        self.request(|resp| Command::Initialize { callback, resp })
            .await
    }

    /// Run module code against a query payload
    pub async fn load(&self, code: impl Into<String>, payload: WebviewPayload) -> Result<()> {
        let code = code.into();
        self.request(|resp| Command::Load {
            code,
            payload,
            resp,
        })
        .await
    }

    /// Run module code against a query string for this bridge's action
    pub async fn submit_payload(
        &self,
        code: impl Into<String>,
        query: impl Into<String>,
    ) -> Result<()> {
        let payload = WebviewPayload::new(query, self.action.clone());
        self.load(code, payload).await
    }

    /// Tear down the script context, dropping pending work and the callback
    pub async fn destroy(&self) -> Result<()> {
        self.request(|resp| Command::Destroy { resp }).await
    }

    /// Initialize if needed, run one query and wait for its outcome
    pub async fn run_query(
        &self,
        code: impl Into<String>,
        query: impl Into<String>,
    ) -> Result<BridgeOutcome> {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));

        self.initialize(move |outcome| {
            if let Some(tx) = slot.lock().ok().and_then(|mut slot| slot.take()) {
                let _ = tx.send(outcome);
            }
        })
        .await?;

        self.submit_payload(code, query).await?;
        rx.await.map_err(|_| BridgeError::ChannelClosed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (resp, rx) = oneshot::channel();
        self.tx
            .send(build(resp))
            .map_err(|_| BridgeError::ChannelClosed)?;
        rx.await.map_err(|_| BridgeError::ChannelClosed)?
    }
}

/// Engine-thread side of a bridge
struct Engine {
    session_id: String,
    action: Action,
    runtime: ScriptRuntime,
    dispatcher: Dispatcher,
    state: BridgeState,
    state_tx: watch::Sender<BridgeState>,
    messages_tx: mpsc::UnboundedSender<BridgeMessage>,
}

impl Engine {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut messages: mpsc::UnboundedReceiver<BridgeMessage>,
        mut completions: mpsc::UnboundedReceiver<RelayCompletion>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, &mut messages).await,
                    None => break,
                },
                Some(message) = messages.recv() => {
                    self.dispatcher.on_message(message, &mut self.runtime);
                    self.sync_state();
                }
                Some(completion) = completions.recv() => {
                    self.handle_completion(completion, &mut messages).await
                }
            }
        }

        if self.runtime.is_alive() {
            let _ = self.runtime.destroy();
        }
        debug!(session = %self.session_id, "Bridge handle dropped, engine exiting");
    }

    async fn handle_command(
        &mut self,
        command: Command,
        messages: &mut mpsc::UnboundedReceiver<BridgeMessage>,
    ) {
        match command {
            Command::Initialize { callback, resp } => {
                let _ = resp.send(self.initialize(callback));
            }
            Command::Load { code, payload, resp } => {
                let result = self.load(&code, payload, messages).await;
                let _ = resp.send(result);
            }
            Command::Destroy { resp } => {
                let _ = resp.send(self.destroy());
            }
        }
    }

    fn initialize(&mut self, callback: ResultCallback) -> Result<()> {
        self.runtime
            .initialize(Capabilities::new(self.messages_tx.clone()))?;
        self.dispatcher.set_callback(callback);

        if !self.state.has_runtime() {
            self.set_state(BridgeState::Initialized);
        }
        Ok(())
    }

    async fn load(
        &mut self,
        code: &str,
        payload: WebviewPayload,
        messages: &mut mpsc::UnboundedReceiver<BridgeMessage>,
    ) -> Result<()> {
        self.state.check_load()?;
        if payload.action != self.action {
            return Err(BridgeError::InvalidAction(format!(
                "{} (bridge decodes {})",
                payload.action, self.action
            )));
        }

        // Whatever the previous page still had queued belongs to the previous query
        while let Ok(stale) = messages.try_recv() {
            self.dispatcher.on_message(stale, &mut self.runtime);
        }
        self.dispatcher.take_terminal();

        self.dispatcher.begin()?;
        self.set_state(BridgeState::Loaded);
        info!(session = %self.session_id, action = %payload.action, "Loading module");

        match self.runtime.load(code, &payload).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Lifecycle => {
                self.dispatcher.abort();
                self.sync_state();
                return Err(e);
            }
            Err(e) => self.fail_query(e, messages),
        }

        self.sync_state();
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.state.check_destroy()?;
        self.runtime.destroy()?;
        self.dispatcher.abort();
        self.set_state(BridgeState::Destroyed);
        Ok(())
    }

    async fn handle_completion(
        &mut self,
        completion: RelayCompletion,
        messages: &mut mpsc::UnboundedReceiver<BridgeMessage>,
    ) {
        let response = match self.dispatcher.on_completion(completion) {
            Some(response) => response,
            None => return,
        };

        match serde_json::to_string(&response) {
            Ok(json) => {
                if let Err(e) = self.runtime.post_message(&json).await {
                    self.fail_query(e, messages);
                }
            }
            Err(e) => self.dispatcher.fail(BridgeError::Parse(e.to_string())),
        }
        self.sync_state();
    }

    /// Report a script failure once the page's queued messages are delivered
    ///
    /// A terminal the module sent before failing takes precedence.
    fn fail_query(
        &mut self,
        err: BridgeError,
        messages: &mut mpsc::UnboundedReceiver<BridgeMessage>,
    ) {
        while let Ok(message) = messages.try_recv() {
            self.dispatcher.on_message(message, &mut self.runtime);
        }
        self.dispatcher.fail(err);
    }

    /// Fold terminal outcomes and runtime teardown into the lifecycle state
    fn sync_state(&mut self) {
        let mut next = self.state;
        if let Some(kind) = self.dispatcher.take_terminal() {
            next = next.terminate(kind);
        }
        if !self.runtime.is_alive() && next.has_runtime() {
            next = BridgeState::Destroyed;
        }
        self.set_state(next);
    }

    fn set_state(&mut self, next: BridgeState) {
        if next != self.state {
            debug!(session = %self.session_id, from = %self.state, to = %next, "State change");
            self.state = next;
            self.state_tx.send_replace(next);
        }
    }
}
