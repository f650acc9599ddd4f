//! Orchestrator - ties configuration, triggers, scheduling and deployment
//! together
//!
//! The orchestrator owns the immutable registry built from the project
//! file, per-configuration build counters, the worker pool, and the async
//! pump that feeds VCS change events into the trigger engines. Launching a
//! pipeline walks the dependency graph upstream-first; a fail-to-start
//! upstream that did not succeed skips the downstream run before it ever
//! starts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::build::{BuildConfiguration, DependencyPolicy};
use crate::core::config::ProjectConfig;
use crate::core::error::OrchestratorError;
use crate::core::graph::DependencyGraph;
use crate::core::run::{BuildRun, CommitRef, RunStatus};
use crate::core::secrets::SecretResolver;
use crate::deploy::DeploymentDispatcher;
use crate::execution::{ConfigurationLocks, PipelineScheduler, WorkerPool};
use crate::history::{InMemoryHistory, RunHistory};
use crate::notify::{BuildNotification, LogNotifier, NotificationKind, Notifier};
use crate::trigger::{TriggerEngine, TriggerFire};

const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

/// Events that can occur while the orchestrator is running
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    RunStarted {
        run_id: Uuid,
        configuration_id: String,
        build_number: u64,
    },
    RunFinished {
        run_id: Uuid,
        configuration_id: String,
        build_number: u64,
        status: RunStatus,
    },
    RunSkipped {
        configuration_id: String,
        build_number: u64,
        upstream: String,
    },
    DeploymentDispatched {
        configuration_id: String,
        deployment_id: Option<String>,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(OrchestratorEvent) + Send + Sync>;

/// The orchestrator
pub struct Orchestrator {
    project_name: String,
    configurations: HashMap<String, Arc<BuildConfiguration>>,
    graph: DependencyGraph,
    scheduler: PipelineScheduler,
    dispatcher: DeploymentDispatcher,
    secrets: Arc<dyn SecretResolver>,
    history: Arc<dyn RunHistory>,
    notifier: Arc<dyn Notifier>,
    pool: WorkerPool,
    locks: ConfigurationLocks,
    workdir: PathBuf,
    counters: Mutex<HashMap<String, u64>>,
    cancelled: Arc<AtomicBool>,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl Orchestrator {
    /// Build an orchestrator from a validated project configuration
    pub fn new(
        project: &ProjectConfig,
        secrets: Arc<dyn SecretResolver>,
        workdir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let (configurations, graph) = project.build_registry()?;

        Ok(Self {
            project_name: project.name.clone(),
            configurations: configurations
                .into_iter()
                .map(|c| (c.id.clone(), Arc::new(c)))
                .collect(),
            graph,
            scheduler: PipelineScheduler::default(),
            dispatcher: DeploymentDispatcher::new(),
            secrets,
            history: Arc::new(InMemoryHistory::new()),
            notifier: Arc::new(LogNotifier),
            pool: WorkerPool::new(
                project
                    .max_concurrent_runs
                    .unwrap_or(DEFAULT_MAX_CONCURRENT_RUNS),
            ),
            locks: ConfigurationLocks::new(),
            workdir: workdir.into(),
            counters: Mutex::new(HashMap::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
            event_handlers: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn with_history(mut self, history: Arc<dyn RunHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn configuration(&self, id: &str) -> Option<&Arc<BuildConfiguration>> {
        self.configurations.get(id)
    }

    pub fn history(&self) -> &Arc<dyn RunHistory> {
        &self.history
    }

    /// Add an event handler. Registration completes before this returns,
    /// so a handler added before a run sees that run's events from the start.
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(OrchestratorEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: OrchestratorEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Tear down all active runs. Steps in flight are killed; their runs
    /// finish as Failed, never stuck Pending or Running.
    pub fn cancel(&self) {
        warn!("Cancellation requested, tearing down active runs");
        self.cancelled.store(true, Ordering::SeqCst);
    }

    async fn next_build_number(&self, configuration_id: &str) -> u64 {
        let mut counters = self.counters.lock().await;
        let counter = counters.entry(configuration_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Run the pipeline ending at `target`: every transitive upstream in
    /// dependency order, then the target itself. Returns all runs created,
    /// including skipped ones.
    pub async fn run_pipeline(
        &self,
        target: &str,
        commit: Option<CommitRef>,
    ) -> Result<Vec<BuildRun>, OrchestratorError> {
        let order = self.graph.order_for(target)?;
        info!(
            "Launching pipeline for '{}': {}",
            target,
            order.join(" -> ")
        );

        let mut statuses: HashMap<String, RunStatus> = HashMap::new();
        let mut runs = Vec::new();

        for id in order {
            let config = self
                .configurations
                .get(&id)
                .cloned()
                .ok_or_else(|| OrchestratorError::UnknownConfiguration(id.clone()))?;

            // Fail-to-start gating against this walk's own results
            let blocking_upstream = self
                .graph
                .upstreams(&id)
                .iter()
                .filter(|e| e.policy == DependencyPolicy::FailToStart)
                .find(|e| statuses.get(&e.upstream) != Some(&RunStatus::Success));

            let run = match blocking_upstream {
                Some(edge) => {
                    let build_number = self.next_build_number(&id).await;
                    let reason = OrchestratorError::DependencyNotSatisfied {
                        configuration: id.clone(),
                        upstream: edge.upstream.clone(),
                    };
                    warn!("Skipping run #{}: {}", build_number, reason);
                    self.emit_event(OrchestratorEvent::RunSkipped {
                        configuration_id: id.clone(),
                        build_number,
                        upstream: edge.upstream.clone(),
                    })
                    .await;
                    BuildRun::skipped(&id, build_number, commit.clone())
                }
                None => self.execute_configuration(&config, commit.clone()).await,
            };

            if let Err(e) = self.history.record(&run).await {
                error!("Failed to record run of '{}': {}", id, e);
            }
            statuses.insert(id, run.status);
            runs.push(run);
        }

        Ok(runs)
    }

    /// Execute one configuration end to end: secrets, steps, deploy hook,
    /// notifications. Always returns a terminal run.
    async fn execute_configuration(
        &self,
        config: &BuildConfiguration,
        commit: Option<CommitRef>,
    ) -> BuildRun {
        let _permit = self.pool.acquire().await;
        let _guard = if config.allow_concurrent_runs {
            None
        } else {
            let lock = self.locks.lock_for(&config.id).await;
            Some(lock.lock_owned().await)
        };

        let build_number = self.next_build_number(&config.id).await;
        let mut run = BuildRun::new(&config.id, build_number, commit);

        self.emit_event(OrchestratorEvent::RunStarted {
            run_id: run.id,
            configuration_id: config.id.clone(),
            build_number,
        })
        .await;
        self.notify(config, build_number, NotificationKind::Started);

        match self.resolve_secrets(config) {
            Ok(resolved) => {
                let env = config.step_env(build_number, &resolved);
                self.scheduler
                    .execute_run(
                        config,
                        &mut run,
                        &env,
                        &self.workdir,
                        self.cancelled.clone(),
                    )
                    .await;

                if run.status == RunStatus::Success {
                    self.dispatch_deploy(config, &mut run).await;
                }
            }
            Err(e) => {
                error!("Run #{} of '{}' cannot start: {}", build_number, config.id, e);
                run.start();
                run.finish(RunStatus::Failed);
            }
        }

        self.emit_event(OrchestratorEvent::RunFinished {
            run_id: run.id,
            configuration_id: config.id.clone(),
            build_number,
            status: run.status,
        })
        .await;
        if let Some(kind) = NotificationKind::for_status(run.status) {
            self.notify(config, build_number, kind);
        }

        run
    }

    fn resolve_secrets(
        &self,
        config: &BuildConfiguration,
    ) -> Result<HashMap<String, String>, OrchestratorError> {
        config
            .secret_params
            .iter()
            .map(|(env_name, key)| {
                self.secrets
                    .resolve(key)
                    .map(|value| (env_name.clone(), value))
            })
            .collect()
    }

    /// Fire the deploy hook of a successful run, if configured. A failed
    /// dispatch fails the run.
    async fn dispatch_deploy(&self, config: &BuildConfiguration, run: &mut BuildRun) {
        let Some(secret) = &config.deploy_hook_secret else {
            return;
        };

        let hook_url = match self.secrets.resolve(secret) {
            Ok(url) => url,
            Err(e) => {
                error!("Deploy for '{}' cannot start: {}", config.id, e);
                run.status = RunStatus::Failed;
                return;
            }
        };

        match self.dispatcher.dispatch(&config.id, &hook_url).await {
            Ok(outcome) => {
                if let Some(warning) = &outcome.warning {
                    warn!("Deploy for '{}': {}", config.id, warning);
                }
                self.emit_event(OrchestratorEvent::DeploymentDispatched {
                    configuration_id: config.id.clone(),
                    deployment_id: outcome.deployment_id.clone(),
                })
                .await;
                run.deployment_id = outcome.deployment_id;
            }
            Err(e) => {
                error!("Deploy for '{}' failed: {}", config.id, e);
                run.status = RunStatus::Failed;
            }
        }
    }

    fn notify(&self, config: &BuildConfiguration, build_number: u64, kind: NotificationKind) {
        let rules = &config.notifications;
        let wanted = match kind {
            NotificationKind::Started => rules.on_start,
            NotificationKind::Succeeded => rules.on_success,
            NotificationKind::Failed => rules.on_failure,
        };
        if !wanted || rules.recipients.is_empty() {
            return;
        }

        let notification = BuildNotification {
            configuration_id: config.id.clone(),
            build_number,
            kind,
            recipients: rules.recipients.clone(),
        };
        let notifier = self.notifier.clone();
        // Fire and forget; delivery must never affect the run
        tokio::spawn(async move {
            notifier.notify(notification).await;
        });
    }

    /// Pump VCS change events into the per-configuration trigger engines
    /// and launch pipelines when they fire. Runs until the channel closes.
    pub async fn watch_changes(self: Arc<Self>, mut changes: mpsc::Receiver<CommitRef>) {
        let mut engines: Vec<(String, TriggerEngine)> = self
            .configurations
            .values()
            .filter_map(|c| {
                c.trigger
                    .clone()
                    .map(|policy| (c.id.clone(), TriggerEngine::new(policy)))
            })
            .collect();
        engines.sort_by(|a, b| a.0.cmp(&b.0));

        if engines.is_empty() {
            warn!("No configuration has a trigger; change events will be ignored");
        }

        // After the channel closes, keep draining open debounce windows so
        // already-observed commits still fire.
        let mut open = true;
        loop {
            let next_deadline = engines.iter().filter_map(|(_, e)| e.next_deadline()).min();
            if !open && next_deadline.is_none() {
                break;
            }
            let window_closes = async {
                match next_deadline {
                    Some(deadline) => {
                        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
                    }
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                maybe_commit = changes.recv(), if open => {
                    match maybe_commit {
                        Some(commit) => {
                            let now = Instant::now();
                            for (id, engine) in engines.iter_mut() {
                                for fire in engine.observe(commit.clone(), now) {
                                    self.launch(id.clone(), fire);
                                }
                            }
                        }
                        None => open = false,
                    }
                }
                _ = window_closes => {
                    let now = Instant::now();
                    for (id, engine) in engines.iter_mut() {
                        for fire in engine.poll(now) {
                            self.launch(id.clone(), fire);
                        }
                    }
                }
            }
        }

        info!("Change event channel closed, trigger pump stopping");
    }

    fn launch(self: &Arc<Self>, target: String, fire: TriggerFire) {
        let orchestrator = self.clone();
        let commit = fire.head().clone();
        info!(
            "Trigger fired for '{}' at {} ({} commits)",
            target,
            commit.revision,
            fire.commits.len()
        );
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run_pipeline(&target, Some(commit)).await {
                error!("Triggered pipeline for '{}' failed to launch: {}", target, e);
            }
        });
    }
}
