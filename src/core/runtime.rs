//! Server session lifecycle.
//!
//! [`ServerSession::start`] runs the startup sequence as one unit:
//! - directory engine start
//! - changeset import and admin password override
//! - extension registration and transport binding
//!
//! A failure unwinds whatever already started and no session is returned.
//! Shutdown stops every transport and then the engine, reporting all
//! failures together.

use crate::core::config::Config;
use crate::core::error::{DirectoryError, ServerError, ServerResult, ShutdownFailure};
use crate::directory::dn::Dn;
use crate::directory::engine::{admin_dn, AdminSession, BoundTransport, DirectoryEngine};
use crate::net::transport::{register_extensions, resolve_transports, TransportSpec};
use crate::provision::importer::{ChangeSource, ChangesetImporter, ImportSummary};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle state of a server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing started yet.
    Created,
    /// Directory engine running.
    DirectoryStarted,
    /// Seed data imported.
    Provisioned,
    /// All transports bound.
    TransportsBound,
    /// Serving clients.
    Running,
    /// Startup failed and was unwound.
    Failed,
    /// Stopped.
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::DirectoryStarted => "directory-started",
            Self::Provisioned => "provisioned",
            Self::TransportsBound => "transports-bound",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

fn transition(state: &mut LifecycleState, next: LifecycleState) {
    tracing::debug!(from = %state, to = %next, "lifecycle transition");
    *state = next;
}

/// A running directory server.
pub struct ServerSession {
    /// Configuration the session was started with.
    config: Arc<Config>,

    /// Directory engine.
    engine: Arc<dyn DirectoryEngine>,

    /// Bound transports, plain first.
    transports: Vec<Box<dyn BoundTransport>>,

    /// Client-facing URLs, one per transport.
    urls: Vec<String>,

    /// Import results.
    import_summary: ImportSummary,

    /// Current state.
    state: LifecycleState,
}

impl ServerSession {
    /// Start a server, importing the configured LDIF files (or the built-in
    /// dataset). Must be called within a tokio runtime.
    pub fn start(config: Config, engine: Arc<dyn DirectoryEngine>) -> ServerResult<Self> {
        let sources: Vec<ChangeSource> = config
            .import
            .ldif_files
            .iter()
            .cloned()
            .map(ChangeSource::File)
            .collect();
        Self::start_with_sources(config, engine, sources)
    }

    /// Start a server importing `sources` instead of the configured files.
    pub fn start_with_sources(
        config: Config,
        engine: Arc<dyn DirectoryEngine>,
        sources: Vec<ChangeSource>,
    ) -> ServerResult<Self> {
        let started_at = Instant::now();
        let mut state = LifecycleState::Created;

        config.validate().map_err(|e| ServerError::Config {
            message: format!("{:#}", e),
        })?;

        if let Err(e) = engine.start() {
            transition(&mut state, LifecycleState::Failed);
            tracing::error!(error = %e, "directory engine failed to start");
            return Err(ServerError::Directory(e));
        }
        transition(&mut state, LifecycleState::DirectoryStarted);
        engine.set_allow_anonymous(config.server.allow_anonymous);

        let import_summary = match provision(&config, &engine, &sources) {
            Ok(summary) => summary,
            Err(e) => {
                transition(&mut state, LifecycleState::Failed);
                tracing::error!(error = %e, "provisioning failed");
                shutdown_engine(engine.as_ref());
                return Err(e);
            }
        };
        transition(&mut state, LifecycleState::Provisioned);

        let transports = match bind_transports(&config, engine.as_ref()) {
            Ok(transports) => transports,
            Err(e) => {
                transition(&mut state, LifecycleState::Failed);
                tracing::error!(error = %e, "transport startup failed");
                shutdown_engine(engine.as_ref());
                return Err(e);
            }
        };
        transition(&mut state, LifecycleState::TransportsBound);

        let urls: Vec<String> = transports
            .iter()
            .map(|t| t.spec().url_with_port(t.local_addr().port()))
            .collect();

        transition(&mut state, LifecycleState::Running);
        tracing::info!(
            urls = %urls.join(", "),
            admin = %admin_dn(),
            records = import_summary.records(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "directory server running"
        );

        Ok(Self {
            config: Arc::new(config),
            engine,
            transports,
            urls,
            import_summary,
            state,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Client-facing URLs.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Administrator DN.
    pub fn admin_dn(&self) -> Dn {
        admin_dn()
    }

    /// Bound transports.
    pub fn transports(&self) -> &[Box<dyn BoundTransport>] {
        &self.transports
    }

    /// Local address of the transport called `name`.
    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.transports
            .iter()
            .find(|t| t.spec().name == name)
            .map(|t| t.local_addr())
    }

    /// Import results.
    pub fn import_summary(&self) -> &ImportSummary {
        &self.import_summary
    }

    /// Directory engine.
    pub fn engine(&self) -> &Arc<dyn DirectoryEngine> {
        &self.engine
    }

    /// Configuration the session was started with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A new admin session on the engine.
    pub fn admin_session(&self) -> AdminSession {
        AdminSession::new(self.engine.clone())
    }

    /// Stop all transports, then the engine. Every step is attempted; the
    /// failures are reported together. Stopping again is a no-op.
    pub fn stop(&mut self) -> ServerResult<()> {
        if self.state == LifecycleState::Stopped {
            return Ok(());
        }

        let mut failures = Vec::new();
        for transport in self.transports.iter_mut() {
            if let Err(source) = transport.stop() {
                tracing::warn!(transport = %transport.spec().name, error = %source, "transport failed to stop");
                failures.push(ShutdownFailure {
                    component: transport.spec().name.clone(),
                    source,
                });
            }
        }
        self.transports.clear();

        if self.engine.is_started() {
            if let Err(source) = self.engine.shutdown() {
                tracing::warn!(error = %source, "directory engine failed to stop");
                failures.push(ShutdownFailure {
                    component: "directory".to_string(),
                    source,
                });
            }
        }

        transition(&mut self.state, LifecycleState::Stopped);
        tracing::info!(failures = failures.len(), "directory server stopped");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ServerError::Shutdown { failures })
        }
    }
}

impl Drop for ServerSession {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "shutdown on drop incomplete");
        }
    }
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("state", &self.state)
            .field("urls", &self.urls)
            .finish_non_exhaustive()
    }
}

fn provision(
    config: &Config,
    engine: &Arc<dyn DirectoryEngine>,
    sources: &[ChangeSource],
) -> ServerResult<ImportSummary> {
    let session = AdminSession::new(engine.clone());
    let importer = ChangesetImporter::new(&session);
    let summary = importer.import_sources(sources)?;
    if let Some(password) = &config.admin.password {
        importer.override_admin_password(password)?;
    }
    Ok(summary)
}

fn bind_transports(
    config: &Config,
    engine: &dyn DirectoryEngine,
) -> ServerResult<Vec<Box<dyn BoundTransport>>> {
    let plain_failure = |source: DirectoryError| {
        let plain = TransportSpec::plain(config.server.bind_address.clone(), config.server.port);
        ServerError::TransportStart {
            name: plain.name.clone(),
            url: plain.url(),
            source,
        }
    };

    let (specs, start_tls) = resolve_transports(config).map_err(plain_failure)?;
    register_extensions(engine, start_tls).map_err(plain_failure)?;

    let mut bound: Vec<Box<dyn BoundTransport>> = Vec::with_capacity(specs.len());
    for spec in &specs {
        match engine.bind_transport(spec) {
            Ok(transport) => bound.push(transport),
            Err(source) => {
                for transport in bound.iter_mut() {
                    if let Err(e) = transport.stop() {
                        tracing::warn!(transport = %transport.spec().name, error = %e, "failed to stop transport during unwind");
                    }
                }
                return Err(ServerError::TransportStart {
                    name: spec.name.clone(),
                    url: spec.url(),
                    source,
                });
            }
        }
    }
    Ok(bound)
}

fn shutdown_engine(engine: &dyn DirectoryEngine) {
    if let Err(e) = engine.shutdown() {
        tracing::warn!(error = %e, "failed to stop directory engine during unwind");
    }
}
