//! One supervised connection to one tool provider.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use strum::Display;
use tokio_util::sync::CancellationToken;

use crate::config::{BridgeSettings, ProviderConfig, TransportKind, QUALIFIED_NAME_SEPARATOR};
use crate::error::CapabilityError;
use crate::mcp::schema::{CallOutcome, CapabilityDescriptor};
use crate::mcp::transport::MCPTransport;
use crate::mcp::{MCPClient, StdioTransport};
use crate::tools::translate::translate_schema;
use crate::tools::types::ArgumentSchema;
use crate::tools::validation::JsonObject;
use crate::tools::wrapper::{CapabilityInvoker, CapabilityWrapper};
use crate::util::timeout::{run_bounded, Bounded};

/// Protocol operations a session needs from its provider connection.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Open the channel and run the initialize handshake.
    async fn connect(&mut self) -> Result<(), CapabilityError>;

    async fn list_capabilities(&self) -> Result<Vec<CapabilityDescriptor>, CapabilityError>;

    async fn call(
        &self,
        capability: &str,
        arguments: JsonObject,
    ) -> Result<CallOutcome, CapabilityError>;

    /// Tear the channel down. Must be idempotent.
    async fn close(&mut self);
}

#[async_trait]
impl ProviderClient for MCPClient {
    async fn connect(&mut self) -> Result<(), CapabilityError> {
        MCPClient::connect(self).await
    }

    async fn list_capabilities(&self) -> Result<Vec<CapabilityDescriptor>, CapabilityError> {
        MCPClient::list_tools(self).await
    }

    async fn call(
        &self,
        capability: &str,
        arguments: JsonObject,
    ) -> Result<CallOutcome, CapabilityError> {
        MCPClient::call_tool(self, capability, arguments).await
    }

    async fn close(&mut self) {
        MCPClient::close(self).await
    }
}

/// Builds the client for a provider config.
pub trait ProviderConnector: Send + Sync {
    fn client_for(&self, config: &ProviderConfig) -> Box<dyn ProviderClient>;
}

/// Connects providers over MCP using the configured transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct McpConnector;

impl ProviderConnector for McpConnector {
    fn client_for(&self, config: &ProviderConfig) -> Box<dyn ProviderClient> {
        Box::new(MCPClient::new(config.name.clone(), transport_for(config)))
    }
}

fn transport_for(config: &ProviderConfig) -> Box<dyn MCPTransport> {
    match config.transport {
        TransportKind::Stdio => Box::new(
            StdioTransport::new(config.command.clone().unwrap_or_default(), config.args.clone())
                .with_env(config.env.clone()),
        ),
        #[cfg(feature = "http")]
        TransportKind::Http => Box::new(
            crate::mcp::StreamableHttpTransport::new(config.url.clone().unwrap_or_default())
                .with_headers(config.headers.clone()),
        ),
        #[cfg(not(feature = "http"))]
        TransportKind::Http => Box::new(HttpUnavailable),
    }
}

#[cfg(not(feature = "http"))]
struct HttpUnavailable;

#[cfg(not(feature = "http"))]
#[async_trait]
impl MCPTransport for HttpUnavailable {
    async fn connect(
        &mut self,
        _client_info: rmcp::model::ClientInfo,
    ) -> Result<crate::mcp::transport::MCPRunningService, crate::mcp::transport::ConnectError> {
        Err(crate::mcp::transport::ConnectError::Open(
            "built without the `http` feature".into(),
        ))
    }

    fn target(&self) -> String {
        "http (disabled)".into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
    Failed,
    Closed,
}

/// A discovered capability with its translated schema.
#[derive(Debug, Clone)]
pub struct DiscoveredCapability {
    pub descriptor: CapabilityDescriptor,
    pub schema: Arc<ArgumentSchema>,
}

/// Snapshot of a session for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub transport: TransportKind,
    pub state: SessionState,
    pub capabilities: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct SessionTimeouts {
    handshake: Duration,
    discovery: Duration,
    call: Duration,
}

/// Owns one provider connection: handshake, discovery, invocation, teardown.
///
/// The capability list is swapped as a whole, so readers see either the old
/// list or the new one. Calls hold the client for reading; connect and close
/// hold it for writing, and cancel `in_flight` first so a stuck call cannot
/// keep the transport open.
pub struct ProviderSession {
    config: ProviderConfig,
    timeouts: SessionTimeouts,
    client: tokio::sync::RwLock<Box<dyn ProviderClient>>,
    in_flight: RwLock<CancellationToken>,
    state: RwLock<SessionState>,
    capabilities: RwLock<Arc<[DiscoveredCapability]>>,
    last_error: RwLock<Option<CapabilityError>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl ProviderSession {
    pub fn new(
        config: ProviderConfig,
        client: Box<dyn ProviderClient>,
        settings: &BridgeSettings,
    ) -> Self {
        Self {
            config,
            timeouts: SessionTimeouts {
                handshake: settings.handshake_timeout,
                discovery: settings.discovery_timeout,
                call: settings.call_timeout,
            },
            client: tokio::sync::RwLock::new(client),
            in_flight: RwLock::new(CancellationToken::new()),
            state: RwLock::new(SessionState::Disconnected),
            capabilities: RwLock::new(Arc::from(Vec::new())),
            last_error: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *read(&self.state)
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn last_error(&self) -> Option<CapabilityError> {
        read(&self.last_error).clone()
    }

    /// The most recently discovered capability list.
    pub fn capabilities(&self) -> Arc<[DiscoveredCapability]> {
        Arc::clone(&read(&self.capabilities))
    }

    pub fn status(&self) -> ProviderStatus {
        ProviderStatus {
            name: self.config.name.clone(),
            transport: self.config.transport,
            state: self.state(),
            capabilities: read(&self.capabilities).len(),
            last_error: self.last_error().map(|e| e.to_string()),
        }
    }

    /// Connect then discover. Failures are recorded and the session is left `Failed`.
    pub async fn start(&self) -> Result<(), CapabilityError> {
        self.connect().await?;
        if let Err(error) = self.discover_capabilities().await {
            self.fail(&error);
            self.client.write().await.close().await;
            return Err(error);
        }
        tracing::info!(
            provider = %self.config.name,
            tool_count = read(&self.capabilities).len(),
            "provider ready"
        );
        Ok(())
    }

    /// Spawn/open the transport and run the handshake within the handshake timeout.
    pub async fn connect(&self) -> Result<(), CapabilityError> {
        self.set_state(SessionState::Connecting);
        let mut client = self.client.write().await;
        *write(&self.in_flight) = CancellationToken::new();

        let result = match tokio::time::timeout(self.timeouts.handshake, client.connect()).await {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::handshake(
                &self.config.name,
                format!(
                    "handshake timed out after {}ms",
                    self.timeouts.handshake.as_millis()
                ),
            )),
        };

        match result {
            Ok(()) => {
                self.set_state(SessionState::Ready);
                *write(&self.last_error) = None;
                Ok(())
            }
            Err(error) => {
                client.close().await;
                self.fail(&error);
                Err(error)
            }
        }
    }

    /// Re-list capabilities. On failure the previous list is kept.
    pub async fn discover_capabilities(&self) -> Result<usize, CapabilityError> {
        let listed = {
            let client = self.client.read().await;
            match tokio::time::timeout(self.timeouts.discovery, client.list_capabilities()).await {
                Ok(result) => result,
                Err(_) => Err(CapabilityError::discovery(
                    &self.config.name,
                    format!(
                        "tools/list timed out after {}ms",
                        self.timeouts.discovery.as_millis()
                    ),
                )),
            }
        };

        let descriptors = match listed {
            Ok(descriptors) => descriptors,
            Err(error) => {
                if error.breaks_session() {
                    self.fail(&error);
                } else {
                    *write(&self.last_error) = Some(error.clone());
                }
                return Err(error);
            }
        };

        let mut discovered: Vec<DiscoveredCapability> = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if discovered
                .iter()
                .any(|known| known.descriptor.name == descriptor.name)
            {
                tracing::warn!(
                    provider = %self.config.name,
                    capability = %descriptor.name,
                    "provider listed a capability twice; keeping the first"
                );
                continue;
            }
            let schema = Arc::new(translate_schema(&descriptor.input_schema));
            discovered.push(DiscoveredCapability { descriptor, schema });
        }

        let count = discovered.len();
        *write(&self.capabilities) = Arc::from(discovered);
        Ok(count)
    }

    /// Forward one validated call to the provider.
    pub async fn invoke(
        &self,
        capability: &str,
        arguments: JsonObject,
        cancel: &CancellationToken,
    ) -> Result<String, CapabilityError> {
        let qualified = format!(
            "{}{QUALIFIED_NAME_SEPARATOR}{capability}",
            self.config.name
        );
        let state = self.state();
        if state != SessionState::Ready {
            return Err(CapabilityError::NotReady {
                provider: self.config.name.clone(),
                state: state.to_string(),
            });
        }

        tracing::debug!(provider = %self.config.name, capability, "invoking capability");
        let client = self.client.read().await;
        // Closed or failed while waiting behind a writer.
        let state = self.state();
        if state != SessionState::Ready {
            return Err(CapabilityError::NotReady {
                provider: self.config.name.clone(),
                state: state.to_string(),
            });
        }
        let stop = read(&self.in_flight).clone();
        let outcome = tokio::select! {
            biased;
            _ = stop.cancelled() => Bounded::Cancelled,
            outcome = run_bounded(self.timeouts.call, cancel, client.call(capability, arguments)) => outcome,
        };
        drop(client);

        match outcome {
            Bounded::Completed(Ok(outcome)) if outcome.is_error => {
                Err(CapabilityError::invocation(&qualified, outcome.render()))
            }
            Bounded::Completed(Ok(outcome)) => Ok(outcome.render()),
            Bounded::Completed(Err(error)) => {
                if error.breaks_session() {
                    self.fail(&error);
                }
                Err(error.for_capability(&qualified))
            }
            Bounded::TimedOut(timeout) => {
                tracing::warn!(
                    provider = %self.config.name,
                    capability,
                    timeout_ms = timeout.as_millis() as u64,
                    "capability invocation timed out"
                );
                Err(CapabilityError::InvocationTimeout {
                    capability: qualified,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Bounded::Cancelled => Err(CapabilityError::Cancelled {
                capability: qualified,
            }),
        }
    }

    /// Agent-facing wrappers for the current capability list.
    pub fn wrappers(self: &Arc<Self>) -> Vec<CapabilityWrapper> {
        let invoker: Arc<dyn CapabilityInvoker> = Arc::clone(self) as Arc<dyn CapabilityInvoker>;
        self.capabilities()
            .iter()
            .map(|discovered| {
                CapabilityWrapper::for_provider(
                    &self.config.name,
                    &discovered.descriptor,
                    Arc::clone(&discovered.schema),
                    Arc::clone(&invoker),
                )
            })
            .collect()
    }

    /// Close the current channel and run connect + discover again.
    pub async fn reconnect(&self) -> Result<(), CapabilityError> {
        read(&self.in_flight).cancel();
        self.client.write().await.close().await;
        self.set_state(SessionState::Disconnected);
        self.start().await
    }

    /// Cancel in-flight calls and terminate the transport. Idempotent.
    ///
    /// The session only counts as `Closed` once the transport is closed, so
    /// a close that was abandoned part way can be retried.
    pub async fn close(&self) {
        if self.state() == SessionState::Closed {
            return;
        }
        read(&self.in_flight).cancel();
        self.client.write().await.close().await;
        self.set_state(SessionState::Closed);
        *write(&self.capabilities) = Arc::from(Vec::new());
        tracing::info!(provider = %self.config.name, "provider closed");
    }

    fn set_state(&self, state: SessionState) {
        *write(&self.state) = state;
    }

    fn fail(&self, error: &CapabilityError) {
        {
            let mut state = write(&self.state);
            if *state != SessionState::Closed {
                *state = SessionState::Failed;
            }
        }
        *write(&self.last_error) = Some(error.clone());
        tracing::warn!(
            provider = %self.config.name,
            kind = %error.kind(),
            error = %error,
            "provider session failed"
        );
    }
}

#[async_trait]
impl CapabilityInvoker for ProviderSession {
    async fn invoke(
        &self,
        capability: &str,
        arguments: JsonObject,
        cancel: &CancellationToken,
    ) -> Result<String, CapabilityError> {
        ProviderSession::invoke(self, capability, arguments, cancel).await
    }
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::schema::ContentBlock;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Reply {
        Outcome(CallOutcome),
        Fail(CapabilityError),
        Hang,
    }

    struct ScriptedClient {
        connect: Option<CapabilityError>,
        listings: Mutex<VecDeque<Result<Vec<CapabilityDescriptor>, CapabilityError>>>,
        replies: Mutex<VecDeque<Reply>>,
        calls: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl ScriptedClient {
        fn new(listings: Vec<Result<Vec<CapabilityDescriptor>, CapabilityError>>) -> Self {
            Self {
                connect: None,
                listings: Mutex::new(listings.into()),
                replies: Mutex::new(VecDeque::new()),
                calls: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn replies(self, replies: Vec<Reply>) -> Self {
            *self.replies.lock().unwrap() = replies.into();
            self
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedClient {
        async fn connect(&mut self) -> Result<(), CapabilityError> {
            match &self.connect {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }

        async fn list_capabilities(&self) -> Result<Vec<CapabilityDescriptor>, CapabilityError> {
            self.listings
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn call(
            &self,
            _capability: &str,
            _arguments: JsonObject,
        ) -> Result<CallOutcome, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Reply::Outcome(CallOutcome::text("ok")));
            match reply {
                Reply::Outcome(outcome) => Ok(outcome),
                Reply::Fail(error) => Err(error),
                Reply::Hang => std::future::pending().await,
            }
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tool(name: &str) -> CapabilityDescriptor {
        CapabilityDescriptor::new(name, json!({ "type": "object", "properties": {} }))
    }

    fn settings() -> BridgeSettings {
        BridgeSettings::builder()
            .handshake_timeout(Duration::from_millis(200))
            .discovery_timeout(Duration::from_millis(200))
            .call_timeout(Duration::from_millis(50))
            .build()
    }

    fn session(client: ScriptedClient) -> Arc<ProviderSession> {
        Arc::new(ProviderSession::new(
            ProviderConfig::stdio("docs", "docs-server"),
            Box::new(client),
            &settings(),
        ))
    }

    #[tokio::test]
    async fn start_reaches_ready_with_capabilities() {
        let session = session(ScriptedClient::new(vec![Ok(vec![tool("search"), tool("fetch")])]));
        session.start().await.unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        let names: Vec<String> = session.wrappers().iter().map(|w| w.name().to_owned()).collect();
        assert_eq!(names, vec!["docs.search", "docs.fetch"]);
    }

    #[tokio::test]
    async fn connect_failure_marks_failed_and_records_cause() {
        let mut client = ScriptedClient::new(Vec::new());
        client.connect = Some(CapabilityError::connection("docs", "spawn failed"));
        let closes = Arc::clone(&client.closes);
        let session = session(client);

        let err = session.start().await.unwrap_err();

        assert!(matches!(err, CapabilityError::Connection { .. }));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.status().last_error.as_deref(), Some("Connection error: docs — spawn failed"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_rediscovery_keeps_previous_list() {
        let session = session(ScriptedClient::new(vec![
            Ok(vec![tool("search")]),
            Err(CapabilityError::discovery("docs", "server error")),
        ]));
        session.start().await.unwrap();

        let err = session.discover_capabilities().await.unwrap_err();

        assert!(matches!(err, CapabilityError::Discovery { .. }));
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.capabilities().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_listing_keeps_first_entry() {
        let session = session(ScriptedClient::new(vec![Ok(vec![
            tool("search"),
            tool("search"),
        ])]));
        session.start().await.unwrap();
        assert_eq!(session.capabilities().len(), 1);
    }

    #[tokio::test]
    async fn timeout_keeps_session_ready() {
        let client = ScriptedClient::new(vec![Ok(vec![tool("search")])])
            .replies(vec![Reply::Hang, Reply::Outcome(CallOutcome::text("found"))]);
        let session = session(client);
        session.start().await.unwrap();
        let cancel = CancellationToken::new();

        let err = session.invoke("search", JsonObject::new(), &cancel).await.unwrap_err();
        assert!(matches!(
            err,
            CapabilityError::InvocationTimeout { ref capability, timeout_ms: 50 } if capability == "docs.search"
        ));
        assert_eq!(session.state(), SessionState::Ready);

        let result = session.invoke("search", JsonObject::new(), &cancel).await.unwrap();
        assert_eq!(result, "found");
    }

    #[tokio::test]
    async fn cancellation_keeps_session_ready() {
        let client = ScriptedClient::new(vec![Ok(vec![tool("search")])]).replies(vec![Reply::Hang]);
        let session = session(client);
        session.start().await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            trigger.cancel();
        });

        let err = session.invoke("search", JsonObject::new(), &cancel).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Cancelled { .. }));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn broken_transport_marks_failed_and_rejects_later_calls() {
        let client = ScriptedClient::new(vec![Ok(vec![tool("search")])]).replies(vec![Reply::Fail(
            CapabilityError::transport_broken("docs", "broken pipe"),
        )]);
        let calls = Arc::clone(&client.calls);
        let session = session(client);
        session.start().await.unwrap();
        let cancel = CancellationToken::new();

        let err = session.invoke("search", JsonObject::new(), &cancel).await.unwrap_err();
        assert!(err.breaks_session());
        assert_eq!(session.state(), SessionState::Failed);

        let err = session.invoke("search", JsonObject::new(), &cancel).await.unwrap_err();
        assert!(matches!(err, CapabilityError::NotReady { ref state, .. } if state == "failed"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_error_result_is_invocation_error() {
        let client = ScriptedClient::new(vec![Ok(vec![tool("search")])]).replies(vec![Reply::Outcome(
            CallOutcome {
                content: vec![ContentBlock::text("index offline"), ContentBlock::other("resource")],
                is_error: true,
            },
        )]);
        let session = session(client);
        session.start().await.unwrap();

        let err = session
            .invoke("search", JsonObject::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CapabilityError::Invocation {
                capability: "docs.search".into(),
                message: "index offline\n[resource]".into(),
            }
        );
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_clears_capabilities() {
        let client = ScriptedClient::new(vec![Ok(vec![tool("search")])]);
        let closes = Arc::clone(&client.closes);
        let session = session(client);
        session.start().await.unwrap();

        session.close().await;
        session.close().await;

        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.capabilities().is_empty());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_cancels_a_stuck_call_and_closes_the_client() {
        let client = ScriptedClient::new(vec![Ok(vec![tool("search")])]).replies(vec![Reply::Hang]);
        let closes = Arc::clone(&client.closes);
        let session = Arc::new(ProviderSession::new(
            ProviderConfig::stdio("docs", "docs-server"),
            Box::new(client),
            &BridgeSettings::builder()
                .call_timeout(Duration::from_secs(30))
                .build(),
        ));
        session.start().await.unwrap();

        let caller = Arc::clone(&session);
        let call = tokio::spawn(async move {
            caller
                .invoke("search", JsonObject::new(), &CancellationToken::new())
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), session.close())
            .await
            .expect("close should not wait for the stuck call");

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SessionState::Closed);
        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, CapabilityError::Cancelled { ref capability } if capability == "docs.search"));

        let err = session
            .invoke("search", JsonObject::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::NotReady { ref state, .. } if state == "closed"));
    }

    #[tokio::test]
    async fn reconnect_recovers_a_failed_session() {
        let client = ScriptedClient::new(vec![Ok(vec![tool("search")]), Ok(vec![tool("search"), tool("fetch")])])
            .replies(vec![Reply::Fail(CapabilityError::transport_broken("docs", "eof"))]);
        let session = session(client);
        session.start().await.unwrap();
        let _ = session
            .invoke("search", JsonObject::new(), &CancellationToken::new())
            .await;
        assert_eq!(session.state(), SessionState::Failed);

        session.reconnect().await.unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.capabilities().len(), 2);
        assert!(session.last_error().is_none());
    }
}
