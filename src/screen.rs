//! Per-screen operation state machine.
//!
//! [`PackageScreen::spawn`] starts an actor task that owns all screen state.
//! Intents go in through a [`ScreenHandle`]; snapshots come out through a
//! [`watch`] channel as whole-value replacements. Because only the actor task
//! mutates state, concurrent completions can never race on it; effects
//! (searches, brew verbs, timers) run on their own tasks and report back as
//! messages.
//!
//! Search is debounced and last-write-wins: every query change bumps a
//! generation counter, and a debounce timer or search completion carrying a
//! stale generation is discarded rather than applied. At most one search is
//! ever in flight from the screen's point of view.
//!
//! Per-package operation status lives in one canonical map keyed by package
//! identity; the formula/cask splits are computed on read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;

use crate::config::Config;
use crate::error::Result;
use crate::package::{Package, PackageKind};
use crate::services::PackageService;
use crate::upgrade::UpgradeEvent;

/// Aggregate screen status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    Loading,
    Success,
    Failure,
}

/// What a successful per-package operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Installed,
    Updated,
    Removed,
}

/// Lifecycle of one package row. Monotonic within a single operation:
/// Idle → Loading → Success/Failure, then back to Idle on the next refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationStatus {
    #[default]
    Idle,
    Loading,
    Success(Option<ActionKind>),
    Failure,
}

/// Read-only projection of the screen, published after every change.
#[derive(Debug, Clone, Default)]
pub struct ScreenState {
    pub query: String,
    pub results: Vec<Package>,
    pub status: Status,
    /// Package id awaiting delete confirmation, if any.
    pub pending_delete: Option<String>,
    /// Message from the most recent failure, passed through unmodified.
    pub last_error: Option<String>,
    statuses: HashMap<String, OperationStatus>,
}

impl ScreenState {
    /// Status for one package row; rows without an entry are idle.
    pub fn status_of(&self, id: &str) -> OperationStatus {
        self.statuses.get(id).copied().unwrap_or_default()
    }

    pub fn formula_results(&self) -> impl Iterator<Item = &Package> {
        self.results
            .iter()
            .filter(|p| p.kind == PackageKind::Formula)
    }

    pub fn cask_results(&self) -> impl Iterator<Item = &Package> {
        self.results.iter().filter(|p| p.kind == PackageKind::Cask)
    }

    fn row(&self, id: &str) -> Option<&Package> {
        self.results.iter().find(|p| p.id() == id)
    }

    /// Resolve an upgrade-event package name against known rows.
    fn row_by_package_name(&self, name: &str) -> Option<&Package> {
        self.results
            .iter()
            .find(|p| p.name == name || p.token.as_deref() == Some(name))
    }
}

/// Timer tuning, taken from [`Config`] by default.
#[derive(Debug, Clone)]
pub struct ScreenTuning {
    pub debounce: Duration,
    pub resync_delay: Duration,
}

impl Default for ScreenTuning {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            resync_delay: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for ScreenTuning {
    fn from(config: &Config) -> Self {
        Self {
            debounce: config.debounce,
            resync_delay: config.resync_delay,
        }
    }
}

enum Msg {
    QueryChanged(String),
    DebounceFired { generation: u64 },
    SearchFinished {
        generation: u64,
        outcome: Result<Vec<Package>>,
    },
    OperationRequested {
        id: String,
        kind: ActionKind,
        force: bool,
    },
    OperationFinished {
        id: String,
        kind: ActionKind,
        ok: bool,
    },
    DeleteRequested(String),
    DeleteConfirmed,
    DeleteCancelled,
    UpgradeAllRequested,
    UpgradeProgress(UpgradeEvent),
    UpgradeAllFinished(bool),
    RefreshRequested,
    RefreshFinished(Result<Vec<Package>>),
}

/// Entry point for one screen's state machine.
pub struct PackageScreen;

impl PackageScreen {
    /// Spawn the actor task and return its handle.
    ///
    /// The actor stops when every handle (and every watch receiver obtained
    /// from them) has been dropped.
    pub fn spawn<S: PackageService>(service: Arc<S>, tuning: ScreenTuning) -> ScreenHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ScreenState::default());

        let driver = Driver {
            service,
            tuning,
            state: ScreenState::default(),
            state_tx,
            tx: tx.clone(),
            debounce: None,
            generation: 0,
        };
        tokio::spawn(driver.run(rx));

        ScreenHandle {
            tx,
            state: state_rx,
        }
    }
}

/// Cheaply cloneable handle: intents in, state snapshots out.
#[derive(Clone)]
pub struct ScreenHandle {
    tx: mpsc::UnboundedSender<Msg>,
    state: watch::Receiver<ScreenState>,
}

impl ScreenHandle {
    /// The user edited the search field.
    pub fn query_changed(&self, query: impl Into<String>) {
        self.send(Msg::QueryChanged(query.into()));
    }

    pub fn install(&self, id: &str, force: bool) {
        self.send(Msg::OperationRequested {
            id: id.to_string(),
            kind: ActionKind::Installed,
            force,
        });
    }

    pub fn upgrade(&self, id: &str) {
        self.send(Msg::OperationRequested {
            id: id.to_string(),
            kind: ActionKind::Updated,
            force: false,
        });
    }

    /// First step of the delete protocol: marks the package as awaiting
    /// confirmation. Nothing runs until [`ScreenHandle::confirm_delete`].
    pub fn request_delete(&self, id: &str) {
        self.send(Msg::DeleteRequested(id.to_string()));
    }

    pub fn confirm_delete(&self) {
        self.send(Msg::DeleteConfirmed);
    }

    /// Abandon a pending delete; no side effect.
    pub fn cancel_delete(&self) {
        self.send(Msg::DeleteCancelled);
    }

    pub fn upgrade_all(&self) {
        self.send(Msg::UpgradeAllRequested);
    }

    /// Re-read the installed list and resynchronize row versions.
    pub fn refresh(&self) {
        self.send(Msg::RefreshRequested);
    }

    /// Current snapshot.
    pub fn state(&self) -> ScreenState {
        self.state.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    pub fn watch(&self) -> watch::Receiver<ScreenState> {
        self.state.clone()
    }

    fn send(&self, msg: Msg) {
        // A closed channel means the actor is gone; intents become no-ops.
        let _ = self.tx.send(msg);
    }
}

struct Driver<S> {
    service: Arc<S>,
    tuning: ScreenTuning,
    state: ScreenState,
    state_tx: watch::Sender<ScreenState>,
    tx: mpsc::UnboundedSender<Msg>,
    debounce: Option<AbortHandle>,
    generation: u64,
}

impl<S: PackageService> Driver<S> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Msg>) {
        while let Some(msg) = rx.recv().await {
            self.handle(msg);
        }
        if let Some(timer) = self.debounce.take() {
            timer.abort();
        }
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::QueryChanged(query) => self.on_query_changed(query),
            Msg::DebounceFired { generation } => self.on_debounce_fired(generation),
            Msg::SearchFinished {
                generation,
                outcome,
            } => self.on_search_finished(generation, outcome),
            Msg::OperationRequested { id, kind, force } => self.on_operation(id, kind, force),
            Msg::OperationFinished { id, kind, ok } => self.on_operation_finished(id, kind, ok),
            Msg::DeleteRequested(id) => self.on_delete_requested(id),
            Msg::DeleteConfirmed => self.on_delete_confirmed(),
            Msg::DeleteCancelled => {
                self.state.pending_delete = None;
                self.publish();
            }
            Msg::UpgradeAllRequested => self.on_upgrade_all(),
            Msg::UpgradeProgress(event) => self.on_upgrade_progress(event),
            Msg::UpgradeAllFinished(ok) => self.on_upgrade_all_finished(ok),
            Msg::RefreshRequested => self.on_refresh(),
            Msg::RefreshFinished(outcome) => self.on_refresh_finished(outcome),
        }
    }

    fn publish(&self) {
        let _ = self.state_tx.send(self.state.clone());
    }

    fn on_query_changed(&mut self, query: String) {
        if query == self.state.query {
            return;
        }

        self.state.query = query.clone();
        // Any pending debounce or in-flight search is now stale.
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.debounce.take() {
            timer.abort();
        }

        if query.is_empty() {
            self.state.results.clear();
            self.state.statuses.clear();
            self.state.status = Status::Idle;
            self.publish();
            return;
        }

        let generation = self.generation;
        let delay = self.tuning.debounce;
        let tx = self.tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Msg::DebounceFired { generation });
        });
        self.debounce = Some(timer.abort_handle());
        self.publish();
    }

    fn on_debounce_fired(&mut self, generation: u64) {
        if generation != self.generation {
            return;
        }

        self.state.status = Status::Loading;
        self.publish();

        let service = Arc::clone(&self.service);
        let query = self.state.query.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = service.search(&query).await;
            let _ = tx.send(Msg::SearchFinished {
                generation,
                outcome,
            });
        });
    }

    fn on_search_finished(&mut self, generation: u64, outcome: Result<Vec<Package>>) {
        if generation != self.generation {
            tracing::debug!("discarding stale search result");
            return;
        }

        match outcome {
            Ok(results) => {
                self.state.results = results;
                self.state.statuses.clear();
                self.state.last_error = None;
                // Zero results is still a completed search, distinct from idle.
                self.state.status = Status::Success;
            }
            Err(err) => {
                self.state.last_error = Some(err.to_string());
                self.state.status = Status::Failure;
            }
        }
        self.publish();
    }

    fn on_operation(&mut self, id: String, kind: ActionKind, force: bool) {
        let Some(package) = self.state.row(&id).cloned() else {
            return;
        };

        self.state.statuses.insert(id.clone(), OperationStatus::Loading);
        self.publish();

        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let ok = match kind {
                ActionKind::Installed => service.install(&package, force).await,
                ActionKind::Updated => service.upgrade(&package).await,
                ActionKind::Removed => service.uninstall(&package).await,
            };
            let _ = tx.send(Msg::OperationFinished { id, kind, ok });
        });
    }

    fn on_operation_finished(&mut self, id: String, kind: ActionKind, ok: bool) {
        let status = if ok {
            OperationStatus::Success(Some(kind))
        } else {
            OperationStatus::Failure
        };
        self.state.statuses.insert(id, status);
        self.publish();

        // Upgrade and delete mutate the installed set, so resynchronize.
        // The upgrade resync waits a beat for brew to finalize its state.
        match kind {
            ActionKind::Updated => {
                let delay = self.tuning.resync_delay;
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Msg::RefreshRequested);
                });
            }
            ActionKind::Removed => {
                let _ = self.tx.send(Msg::RefreshRequested);
            }
            ActionKind::Installed => {}
        }
    }

    fn on_delete_requested(&mut self, id: String) {
        if self.state.row(&id).is_none() {
            return;
        }
        self.state.pending_delete = Some(id);
        self.publish();
    }

    fn on_delete_confirmed(&mut self) {
        let Some(id) = self.state.pending_delete.take() else {
            return;
        };
        self.publish();
        self.on_operation(id, ActionKind::Removed, false);
    }

    fn on_upgrade_all(&mut self) {
        self.state.status = Status::Loading;
        self.publish();

        let (event_tx, mut event_rx) = mpsc::channel(64);

        let forward = self.tx.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let _ = forward.send(Msg::UpgradeProgress(event));
            }
        });

        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let ok = service.upgrade_all(event_tx).await;
            let _ = tx.send(Msg::UpgradeAllFinished(ok));
        });
    }

    fn on_upgrade_progress(&mut self, event: UpgradeEvent) {
        let Some(id) = self
            .state
            .row_by_package_name(event.package())
            .map(|p| p.id().to_string())
        else {
            tracing::trace!(package = event.package(), "progress for unknown package");
            return;
        };

        let status = match event {
            UpgradeEvent::Fetching { .. } | UpgradeEvent::Upgrading { .. } => {
                OperationStatus::Loading
            }
            UpgradeEvent::Completed { .. } => OperationStatus::Success(Some(ActionKind::Updated)),
        };
        self.state.statuses.insert(id, status);
        self.publish();
    }

    fn on_upgrade_all_finished(&mut self, ok: bool) {
        self.state.status = if ok { Status::Success } else { Status::Failure };
        self.publish();
        let _ = self.tx.send(Msg::RefreshRequested);
    }

    fn on_refresh(&mut self) {
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = service.list_installed().await;
            let _ = tx.send(Msg::RefreshFinished(outcome));
        });
    }

    fn on_refresh_finished(&mut self, outcome: Result<Vec<Package>>) {
        match outcome {
            Ok(installed) => {
                let versions: HashMap<&str, &str> = installed
                    .iter()
                    .filter_map(|p| Some((p.id(), p.installed_version.as_deref()?)))
                    .collect();
                for row in &mut self.state.results {
                    let version = versions.get(row.id()).map(|v| v.to_string());
                    row.installed_version = version;
                }
                // A fresh installed list closes out finished operations.
                self.state.statuses.clear();
            }
            Err(err) => {
                self.state.last_error = Some(err.to_string());
            }
        }
        self.publish();
    }
}
