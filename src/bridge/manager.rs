//! Process-wide coordinator for every provider session.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::join_all;
use serde::Serialize;
use strum::Display;

use super::policy::{AgentPolicySource, AgentToolPolicy};
use super::session::{McpConnector, ProviderConnector, ProviderSession, ProviderStatus};
use crate::config::{provider_config_issue, BridgeSettings, ProviderConfig};
use crate::error::{BridgeError, CapabilityError, Result};
use crate::tools::builtin::builtin_capabilities;
use crate::tools::wrapper::CapabilityWrapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
    Closed,
}

/// Per-provider outcome of [`BridgeManager::initialize`].
#[derive(Debug, Clone, Default)]
pub struct InitReport {
    pub ready: Vec<String>,
    pub failed: Vec<(String, CapabilityError)>,
    /// Configs refused before start, with the reason. Names are as given.
    pub rejected: Vec<(String, String)>,
}

/// Per-provider outcome of [`BridgeManager::shutdown`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub closed: Vec<String>,
    pub errors: Vec<(String, String)>,
}

type SessionList = Arc<Vec<Arc<ProviderSession>>>;

/// Owns every provider session and hands out filtered capability sets.
///
/// Construct one at service start and share it by `Arc`. Readers take a
/// snapshot of the session list; `initialize`/`shutdown` replace it whole,
/// and only one lifecycle operation runs at a time.
pub struct BridgeManager {
    connector: Arc<dyn ProviderConnector>,
    settings: BridgeSettings,
    state: RwLock<ManagerState>,
    lifecycle: tokio::sync::Mutex<()>,
    sessions: RwLock<SessionList>,
    builtins: Vec<CapabilityWrapper>,
}

impl BridgeManager {
    pub fn new(settings: BridgeSettings) -> Self {
        Self::with_connector(settings, Arc::new(McpConnector))
    }

    pub fn with_connector(settings: BridgeSettings, connector: Arc<dyn ProviderConnector>) -> Self {
        Self {
            connector,
            settings,
            state: RwLock::new(ManagerState::Uninitialized),
            lifecycle: tokio::sync::Mutex::new(()),
            sessions: RwLock::new(Arc::new(Vec::new())),
            builtins: builtin_capabilities(),
        }
    }

    /// Replace the built-in capabilities offered alongside provider ones.
    pub fn with_builtins(mut self, builtins: Vec<CapabilityWrapper>) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn state(&self) -> ManagerState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ManagerState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn snapshot(&self) -> SessionList {
        Arc::clone(&self.sessions.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn replace_sessions(&self, sessions: Vec<Arc<ProviderSession>>) {
        *self.sessions.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(sessions);
    }

    /// Read the provider config file once and initialize from it.
    pub async fn initialize_from_store(&self) -> Result<InitReport> {
        let configs = self.settings.config_store().load()?;
        self.initialize(configs).await
    }

    /// Start every provider concurrently and wait for all of them.
    ///
    /// Individual provider failures are reported, not returned as errors;
    /// the manager is `Ready` afterwards even if every provider failed.
    /// A config with an empty, dotted or repeated name is rejected on its
    /// own and the rest still start.
    pub async fn initialize(&self, configs: Vec<ProviderConfig>) -> Result<InitReport> {
        let _lifecycle = self.lifecycle.lock().await;
        let state = self.state();
        if state != ManagerState::Uninitialized {
            return Err(BridgeError::InvalidState(format!(
                "initialize requires an uninitialized manager (state: {state})"
            )));
        }
        self.set_state(ManagerState::Initializing);

        let mut report = InitReport::default();
        let mut accepted = HashSet::new();
        let mut sessions: Vec<Arc<ProviderSession>> = Vec::with_capacity(configs.len());
        for mut config in configs {
            if let Some(reason) = provider_config_issue(&config, &accepted) {
                tracing::warn!(provider = %config.name, reason = %reason, "rejecting provider config");
                report.rejected.push((config.name, reason));
                continue;
            }
            config.name = config.name.trim().to_owned();
            accepted.insert(config.name.clone());
            let client = self.connector.client_for(&config);
            sessions.push(Arc::new(ProviderSession::new(config, client, &self.settings)));
        }

        let outcomes = join_all(sessions.iter().map(|session| async move {
            (session.name().to_owned(), session.start().await)
        }))
        .await;

        for (name, outcome) in outcomes {
            match outcome {
                Ok(()) => report.ready.push(name),
                Err(error) => report.failed.push((name, error)),
            }
        }

        self.replace_sessions(sessions);
        self.set_state(ManagerState::Ready);
        tracing::info!(
            ready = report.ready.len(),
            failed = report.failed.len(),
            rejected = report.rejected.len(),
            "tool bridge initialized"
        );
        Ok(report)
    }

    /// Capabilities from every `Ready` provider plus built-ins, filtered by `policy`.
    ///
    /// Built-ins marked always-available bypass the filter.
    pub fn capabilities_for(&self, policy: &AgentToolPolicy) -> Vec<CapabilityWrapper> {
        let sessions = self.snapshot();
        sessions
            .iter()
            .filter(|session| session.is_ready())
            .flat_map(|session| session.wrappers())
            .chain(self.builtins.iter().cloned())
            .filter(|wrapper| {
                wrapper.is_always_available() || policy.permits(wrapper.name(), wrapper.capability())
            })
            .collect()
    }

    /// Resolve the agent's allow-list, then [`Self::capabilities_for`].
    pub fn capabilities_for_agent(
        &self,
        source: &dyn AgentPolicySource,
        agent_id: &str,
    ) -> Vec<CapabilityWrapper> {
        self.capabilities_for(&source.policy_for(agent_id))
    }

    pub fn provider_statuses(&self) -> Vec<ProviderStatus> {
        self.snapshot().iter().map(|session| session.status()).collect()
    }

    pub fn session(&self, name: &str) -> Option<Arc<ProviderSession>> {
        self.snapshot()
            .iter()
            .find(|session| session.name() == name)
            .cloned()
    }

    /// Close and restart one provider.
    pub async fn reconnect(&self, name: &str) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let session = self.ready_manager_session(name)?;
        session.reconnect().await?;
        Ok(())
    }

    /// Re-run discovery for one provider. The previous list survives a failure.
    pub async fn refresh(&self, name: &str) -> Result<usize> {
        let _lifecycle = self.lifecycle.lock().await;
        let session = self.ready_manager_session(name)?;
        Ok(session.discover_capabilities().await?)
    }

    fn ready_manager_session(&self, name: &str) -> Result<Arc<ProviderSession>> {
        let state = self.state();
        if state != ManagerState::Ready {
            return Err(BridgeError::InvalidState(format!(
                "manager is not ready (state: {state})"
            )));
        }
        self.session(name)
            .ok_or_else(|| BridgeError::UnknownProvider(name.to_owned()))
    }

    /// Close every session concurrently. Safe to call in any state, and again.
    pub async fn shutdown(&self) -> ShutdownReport {
        let _lifecycle = self.lifecycle.lock().await;
        let mut report = ShutdownReport::default();
        if self.state() == ManagerState::Closed {
            return report;
        }
        self.set_state(ManagerState::ShuttingDown);

        let sessions = self.snapshot();
        let close_timeout = self.settings.handshake_timeout;
        let handles: Vec<_> = sessions
            .iter()
            .map(|session| {
                let session = Arc::clone(session);
                let name = session.name().to_owned();
                let handle = tokio::spawn(async move {
                    tokio::time::timeout(close_timeout, session.close()).await
                });
                (name, handle)
            })
            .collect();

        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(Ok(())) => report.closed.push(name),
                Ok(Err(_)) => report.errors.push((
                    name,
                    format!("close timed out after {}ms", close_timeout.as_millis()),
                )),
                Err(join_error) => report.errors.push((name, join_error.to_string())),
            }
        }
        for (name, error) in &report.errors {
            tracing::warn!(provider = %name, error = %error, "provider did not close cleanly");
        }

        self.replace_sessions(Vec::new());
        self.set_state(ManagerState::Closed);
        tracing::info!(closed = report.closed.len(), "tool bridge shut down");
        report
    }
}

impl std::fmt::Debug for BridgeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeManager")
            .field("state", &self.state())
            .field("providers", &self.snapshot().len())
            .finish()
    }
}
