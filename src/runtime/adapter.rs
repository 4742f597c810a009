//! Script runtime adapter
//!
//! Wraps a deno_core `JsRuntime` as the isolated script context a module
//! runs in. Every load gets a fresh page: the previous context is dropped,
//! the native bridge and switch values are installed, then the bootstrap
//! and module code are evaluated together and the query is kicked off.
//!
//! A `JsRuntime` is not `Send`; this type lives on the engine thread.

use deno_core::{v8, JsRuntime, RuntimeOptions};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info};

use super::bootstrap::{self, BootstrapSource, PRELUDE};
use super::ops::{bridge_extension, Capabilities};
use crate::core::error::{BridgeError, ErrorContext, Prerequisite, Result};
use crate::dispatcher::RuntimeControl;
use crate::protocol::{BasePayload, FormatVersion, WebviewPayload};

/// Global entry point the bootstrap installs for host messages
const RECEIVE_FN: &str = "__bridgeReceive";

pub struct ScriptRuntime {
    version: FormatVersion,
    source: BootstrapSource,
    switch_values: Map<String, Value>,
    runtime: Option<JsRuntime>,
    common_code: Option<Arc<str>>,
    capabilities: Option<Capabilities>,
}

impl ScriptRuntime {
    pub fn new(
        version: FormatVersion,
        source: BootstrapSource,
        switch_values: Map<String, Value>,
    ) -> Self {
        Self {
            version,
            source,
            switch_values,
            runtime: None,
            common_code: None,
            capabilities: None,
        }
    }

    pub fn format_version(&self) -> FormatVersion {
        self.version
    }

    /// Whether a script context currently exists
    pub fn is_alive(&self) -> bool {
        self.runtime.is_some()
    }

    /// Create the script context if needed and (re)install the callback
    ///
    /// Idempotent with respect to the context: a second call keeps the
    /// existing page and only swaps in the new capability object.
    pub fn initialize(&mut self, capabilities: Capabilities) -> Result<()> {
        match self.runtime.as_mut() {
            Some(runtime) => {
                runtime.op_state().borrow_mut().put(capabilities.clone());
                debug!(version = %self.version, "Reinstalled bridge callback");
            }
            None => {
                let page = self.new_page(&capabilities)?;
                self.runtime = Some(page);
                info!(version = %self.version, "Script runtime initialized");
            }
        }

        self.capabilities = Some(capabilities);
        self.common_code()?;
        Ok(())
    }

    /// Bootstrap code for this runtime's format version
    pub fn common_code(&mut self) -> Result<Arc<str>> {
        if let Some(code) = &self.common_code {
            return Ok(code.clone());
        }

        let code = bootstrap::common_code(&self.source, self.version)?;
        self.common_code = Some(code.clone());
        Ok(code)
    }

    /// Evaluate bootstrap plus module code on a fresh page and post the query
    pub async fn load(&mut self, code: &str, payload: &WebviewPayload) -> Result<()> {
        if self.runtime.is_none() {
            return Err(BridgeError::illegal_state("load", Prerequisite::Runtime));
        }
        let common = self
            .common_code
            .clone()
            .ok_or_else(|| BridgeError::illegal_state("load", Prerequisite::BootstrapCode))?;
        let capabilities = self
            .capabilities
            .clone()
            .ok_or_else(|| BridgeError::illegal_state("load", Prerequisite::Callback))?;

        // Isolates must be released before the next one is created
        self.runtime = None;
        let page = self.new_page(&capabilities)?;
        let runtime = self.runtime.insert(page);

        let document = format!("{common}\n;\n{code}");
        runtime
            .execute_script("<module>", document.into())
            .map_err(script_error)?;
        runtime
            .run_event_loop(Default::default())
            .await
            .map_err(script_error)?;

        debug!(action = %payload.action, "Module evaluated, posting query");

        let kickoff = serde_json::to_string(&BasePayload::logic(payload.clone()))
            .context("Failed to serialize query payload")?;
        self.post_message(&kickoff).await
    }

    /// Deliver a JSON message to the module and drive the event loop
    pub async fn post_message(&mut self, message: &str) -> Result<()> {
        let runtime = self
            .runtime
            .as_mut()
            .ok_or_else(|| BridgeError::illegal_state("post a message", Prerequisite::Runtime))?;

        call_receive(runtime, message)?;
        runtime
            .run_event_loop(Default::default())
            .await
            .map_err(script_error)
    }

    /// Tear down the script context and drop the callback
    pub fn destroy(&mut self) -> Result<()> {
        let runtime = self
            .runtime
            .take()
            .ok_or_else(|| BridgeError::illegal_state("destroy", Prerequisite::Runtime))?;
        drop(runtime);
        self.capabilities = None;

        info!("Script runtime destroyed");
        Ok(())
    }

    fn new_page(&self, capabilities: &Capabilities) -> Result<JsRuntime> {
        let mut runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![bridge_extension()],
            ..Default::default()
        });
        runtime.op_state().borrow_mut().put(capabilities.clone());

        runtime
            .execute_script("<prelude>", PRELUDE.to_string().into())
            .map_err(script_error)?;

        let switches = serde_json::to_string(&self.switch_values)
            .context("Failed to serialize switch values")?;
        runtime
            .execute_script(
                "<switches>",
                format!("globalThis.__switchValues = Object.freeze({switches});").into(),
            )
            .map_err(script_error)?;

        Ok(runtime)
    }
}

impl RuntimeControl for ScriptRuntime {
    fn teardown(&mut self) -> Result<()> {
        self.destroy()
    }
}

fn script_error(err: impl Display) -> BridgeError {
    BridgeError::Script(err.to_string())
}

fn call_receive(runtime: &mut JsRuntime, message: &str) -> Result<()> {
    let scope = &mut runtime.handle_scope();
    let context = scope.get_current_context();
    let global = context.global(scope);

    let name = v8::String::new(scope, RECEIVE_FN)
        .ok_or_else(|| BridgeError::Script("Failed to allocate string".to_string()))?;
    let value = global
        .get(scope, name.into())
        .ok_or_else(|| BridgeError::Script(format!("{RECEIVE_FN} not found")))?;
    let receive = v8::Local::<v8::Function>::try_from(value)
        .map_err(|_| BridgeError::Script(format!("{RECEIVE_FN} is not a function")))?;

    let arg = v8::String::new(scope, message)
        .ok_or_else(|| BridgeError::Script("Message too large".to_string()))?;
    let recv = v8::undefined(scope).into();

    if receive.call(scope, recv, &[arg.into()]).is_none() {
        return Err(BridgeError::Script(format!("{RECEIVE_FN} threw")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Action, RequestPayload, ResponsePayload};
    use crate::runtime::ops::BridgeMessage;
    use tokio::sync::mpsc;

    fn runtime(version: FormatVersion) -> ScriptRuntime {
        ScriptRuntime::new(version, BootstrapSource::Embedded, Map::new())
    }

    fn search(query: &str) -> WebviewPayload {
        WebviewPayload::new(query, Action::Search)
    }

    #[tokio::test]
    async fn test_load_before_initialize() {
        let mut rt = runtime(FormatVersion::V2);
        let err = rt.load("", &search("x")).await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::IllegalState {
                missing: Prerequisite::Runtime,
                ..
            }
        ));
    }

    #[test]
    fn test_destroy_requires_runtime() {
        let mut rt = runtime(FormatVersion::V2);
        assert!(rt.destroy().is_err());

        let (tx, _rx) = mpsc::unbounded_channel();
        rt.initialize(Capabilities::new(tx)).unwrap();
        assert!(rt.is_alive());
        rt.destroy().unwrap();
        assert!(!rt.is_alive());
        assert!(rt.destroy().is_err());
    }

    #[tokio::test]
    async fn test_v2_result_uses_native_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut rt = runtime(FormatVersion::V2);
        rt.initialize(Capabilities::new(tx)).unwrap();

        let module = r#"
            function logic(payload) {
                sendResult([{ url: "/1", img: "i", title: payload.query }]);
            }
        "#;
        rt.load(module, &search("batman")).await.unwrap();

        match rx.try_recv().unwrap() {
            BridgeMessage::Result(raw) => {
                let value: Value = serde_json::from_str(&raw).unwrap();
                assert_eq!(value["action"], "SEARCH");
                assert_eq!(value["result"][0]["title"], "batman");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_v1_result_uses_request_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut rt = runtime(FormatVersion::V1);
        rt.initialize(Capabilities::new(tx)).unwrap();

        rt.load("function logic() { sendResult([]); }", &search("x"))
            .await
            .unwrap();

        match rx.try_recv().unwrap() {
            BridgeMessage::HttpRequest(raw) => {
                let request = RequestPayload::parse(&raw).unwrap();
                assert_eq!(request.action, Action::Result);
                assert!(request.result.unwrap().contains("SEARCH"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_resolves_on_response() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut rt = runtime(FormatVersion::V2);
        rt.initialize(Capabilities::new(tx)).unwrap();

        let module = r#"
            async function logic() {
                const text = await sendRequest("https://example.com/a", { "X-Test": "1" });
                sendResult({ title: text });
            }
        "#;
        rt.load(module, &WebviewPayload::new("", Action::GetInfo))
            .await
            .unwrap();

        let request = match rx.try_recv().unwrap() {
            BridgeMessage::HttpRequest(raw) => RequestPayload::parse(&raw).unwrap(),
            other => panic!("unexpected message: {:?}", other),
        };
        assert_eq!(request.action, Action::HttpRequest);
        assert_eq!(request.url, "https://example.com/a");
        assert_eq!(request.headers.get("X-Test").map(String::as_str), Some("1"));
        assert!(rx.try_recv().is_err());

        let response = ResponsePayload::ok(request.request_id, "Batman");
        rt.post_message(&serde_json::to_string(&response).unwrap())
            .await
            .unwrap();

        match rx.try_recv().unwrap() {
            BridgeMessage::Result(raw) => assert!(raw.contains("Batman")),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_module_exception_becomes_error_signal() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut rt = runtime(FormatVersion::V2);
        rt.initialize(Capabilities::new(tx)).unwrap();

        rt.load("function logic() { throw new Error('boom'); }", &search("x"))
            .await
            .unwrap();

        match rx.try_recv().unwrap() {
            BridgeMessage::HttpRequest(raw) => {
                let request = RequestPayload::parse(&raw).unwrap();
                assert_eq!(request.action, Action::Error);
                assert!(request.result.unwrap().contains("boom"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_switch_values_and_console() {
        let mut switches = Map::new();
        switches.insert("dub".to_string(), Value::Bool(true));

        let module = r#"
            function logic() {
                console.log("dub", getSwitchValue("dub"), getSwitchValue("missing"));
            }
        "#;

        for version in [FormatVersion::V1, FormatVersion::V2] {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let mut rt = ScriptRuntime::new(version, BootstrapSource::Embedded, switches.clone());
            rt.initialize(Capabilities::new(tx)).unwrap();
            rt.load(module, &search("x")).await.unwrap();

            assert_eq!(
                rx.try_recv().unwrap(),
                BridgeMessage::Log("dub true null".to_string()),
                "format version {}",
                version
            );
        }
    }

    #[tokio::test]
    async fn test_each_load_gets_fresh_page() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut rt = runtime(FormatVersion::V2);
        rt.initialize(Capabilities::new(tx)).unwrap();

        // Redeclaring a top-level const would throw on a shared page
        let module = "const seen = 1; function logic() { sendResult([]); }";
        rt.load(module, &search("a")).await.unwrap();
        rt.load(module, &search("b")).await.unwrap();

        assert!(matches!(rx.try_recv().unwrap(), BridgeMessage::Result(_)));
        assert!(matches!(rx.try_recv().unwrap(), BridgeMessage::Result(_)));
    }

    #[tokio::test]
    async fn test_reinitialize_swaps_callback() {
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        let mut rt = runtime(FormatVersion::V2);

        rt.initialize(Capabilities::new(first_tx)).unwrap();
        rt.initialize(Capabilities::new(second_tx)).unwrap();
        rt.load("function logic() { sendResult([]); }", &search("x"))
            .await
            .unwrap();

        assert!(first_rx.try_recv().is_err());
        assert!(matches!(second_rx.try_recv().unwrap(), BridgeMessage::Result(_)));
    }
}
