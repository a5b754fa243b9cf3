// State machine tests against a mock backend.
//
// Time is paused (`start_paused = true`) so debounce and resync timers are
// driven by tokio's auto-advancing virtual clock; no test sleeps for real.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use brewmate::error::Result;
use brewmate::screen::{
    ActionKind, OperationStatus, PackageScreen, ScreenState, ScreenTuning, Status,
};
use brewmate::services::PackageService;
use brewmate::{Package, PackageKind, UpgradeEvent};

mod common;

fn formula(name: &str, installed: Option<&str>) -> Package {
    Package {
        name: name.to_string(),
        token: None,
        installed_version: installed.map(str::to_string),
        latest_version: Some("2.0".to_string()),
        homepage: Some("https://example.com".to_string()),
        desc: None,
        tap: None,
        kind: PackageKind::Formula,
    }
}

#[derive(Default)]
struct MockService {
    catalog: Vec<Package>,
    installed: Mutex<Vec<Package>>,
    slow_queries: HashMap<String, Duration>,
    failing_queries: HashSet<String>,
    op_result: bool,
    upgrade_events: Vec<UpgradeEvent>,
    upgrade_all_delay: Duration,
    search_calls: AtomicUsize,
    install_calls: AtomicUsize,
    upgrade_calls: AtomicUsize,
    uninstall_calls: AtomicUsize,
}

impl MockService {
    fn new(catalog: Vec<Package>, installed: Vec<Package>) -> Self {
        common::init_tracing();
        Self {
            catalog,
            installed: Mutex::new(installed),
            op_result: true,
            ..Self::default()
        }
    }
}

impl PackageService for MockService {
    async fn search(&self, query: &str) -> Result<Vec<Package>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.slow_queries.get(query) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_queries.contains(query) {
            return Err(anyhow::anyhow!("search backend unavailable").into());
        }

        let installed = self.installed.lock().unwrap().clone();
        let results = self
            .catalog
            .iter()
            .filter(|p| p.name.contains(query))
            .cloned()
            .map(|mut p| {
                p.installed_version = installed
                    .iter()
                    .find(|i| i.id() == p.id())
                    .and_then(|i| i.installed_version.clone());
                p
            })
            .collect();
        Ok(results)
    }

    async fn list_installed(&self) -> Result<Vec<Package>> {
        Ok(self.installed.lock().unwrap().clone())
    }

    async fn install(&self, package: &Package, _force: bool) -> bool {
        self.install_calls.fetch_add(1, Ordering::SeqCst);
        if self.op_result {
            let mut installed = self.installed.lock().unwrap();
            let mut added = package.clone();
            added.installed_version = added.latest_version.clone();
            installed.push(added);
        }
        self.op_result
    }

    async fn upgrade(&self, package: &Package) -> bool {
        self.upgrade_calls.fetch_add(1, Ordering::SeqCst);
        if self.op_result {
            let mut installed = self.installed.lock().unwrap();
            for p in installed.iter_mut() {
                if p.id() == package.id() {
                    p.installed_version = p.latest_version.clone();
                }
            }
        }
        self.op_result
    }

    async fn uninstall(&self, package: &Package) -> bool {
        self.uninstall_calls.fetch_add(1, Ordering::SeqCst);
        if self.op_result {
            let mut installed = self.installed.lock().unwrap();
            installed.retain(|p| p.id() != package.id());
        }
        self.op_result
    }

    async fn upgrade_all(&self, events: mpsc::Sender<UpgradeEvent>) -> bool {
        for event in self.upgrade_events.clone() {
            let _ = events.send(event).await;
        }
        if !self.upgrade_all_delay.is_zero() {
            tokio::time::sleep(self.upgrade_all_delay).await;
        }
        self.op_result
    }
}

async fn wait_until(
    rx: &mut watch::Receiver<ScreenState>,
    pred: impl Fn(&ScreenState) -> bool,
) -> ScreenState {
    let fut = async {
        loop {
            {
                let state = rx.borrow_and_update();
                if pred(&state) {
                    return state.clone();
                }
            }
            rx.changed().await.expect("screen actor stopped");
        }
    };
    tokio::time::timeout(Duration::from_secs(120), fut)
        .await
        .expect("state never matched predicate")
}

fn tuning() -> ScreenTuning {
    ScreenTuning {
        debounce: Duration::from_millis(500),
        resync_delay: Duration::from_secs(1),
    }
}

#[tokio::test(start_paused = true)]
async fn rapid_query_changes_trigger_one_search_for_latest() {
    let service = Arc::new(MockService::new(
        vec![formula("wget", None), formula("curl", None)],
        vec![],
    ));
    let screen = PackageScreen::spawn(Arc::clone(&service), tuning());
    let mut rx = screen.watch();

    screen.query_changed("w");
    screen.query_changed("wg");

    let state = wait_until(&mut rx, |s| s.status == Status::Success).await;
    assert_eq!(state.query, "wg");
    assert_eq!(state.results.len(), 1);
    assert_eq!(state.results[0].name, "wget");
    assert_eq!(service.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn unchanged_query_is_a_noop() {
    let service = Arc::new(MockService::new(vec![formula("wget", None)], vec![]));
    let screen = PackageScreen::spawn(Arc::clone(&service), tuning());
    let mut rx = screen.watch();

    screen.query_changed("wget");
    wait_until(&mut rx, |s| s.status == Status::Success).await;

    screen.query_changed("wget");
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(service.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_query_clears_results_and_goes_idle() {
    let service = Arc::new(MockService::new(vec![formula("wget", None)], vec![]));
    let screen = PackageScreen::spawn(Arc::clone(&service), tuning());
    let mut rx = screen.watch();

    screen.query_changed("wget");
    wait_until(&mut rx, |s| s.status == Status::Success).await;

    screen.query_changed("");
    let state = wait_until(&mut rx, |s| s.status == Status::Idle).await;
    assert!(state.results.is_empty());
    // Clearing never invokes the backend.
    assert_eq!(service.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_results_is_success_not_idle() {
    let service = Arc::new(MockService::new(vec![formula("wget", None)], vec![]));
    let screen = PackageScreen::spawn(service, tuning());
    let mut rx = screen.watch();

    screen.query_changed("nosuchpackage");
    let state = wait_until(&mut rx, |s| s.status == Status::Success).await;
    assert!(state.results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn search_failure_surfaces_error() {
    let mut service = MockService::new(vec![formula("wget", None)], vec![]);
    service.failing_queries.insert("wget".to_string());
    let screen = PackageScreen::spawn(Arc::new(service), tuning());
    let mut rx = screen.watch();

    screen.query_changed("wget");
    let state = wait_until(&mut rx, |s| s.status == Status::Failure).await;
    assert!(state.last_error.as_deref().unwrap().contains("unavailable"));
}

#[tokio::test(start_paused = true)]
async fn stale_search_result_never_overwrites_newer_one() {
    let mut service = MockService::new(
        vec![formula("slowpoke", None), formula("fastball", None)],
        vec![],
    );
    service
        .slow_queries
        .insert("slow".to_string(), Duration::from_secs(5));
    let service = Arc::new(service);
    let screen = PackageScreen::spawn(Arc::clone(&service), tuning());
    let mut rx = screen.watch();

    screen.query_changed("slow");
    wait_until(&mut rx, |s| s.status == Status::Loading).await;

    screen.query_changed("fast");
    let state = wait_until(&mut rx, |s| {
        s.status == Status::Success && !s.results.is_empty()
    })
    .await;
    assert_eq!(state.results[0].name, "fastball");

    // Let the slow search complete; its result must be discarded.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let state = screen.state();
    assert_eq!(state.results.len(), 1);
    assert_eq!(state.results[0].name, "fastball");
    assert_eq!(service.search_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn install_success_marks_row_installed_status() {
    let service = Arc::new(MockService::new(vec![formula("wget", None)], vec![]));
    let screen = PackageScreen::spawn(Arc::clone(&service), tuning());
    let mut rx = screen.watch();

    screen.query_changed("wget");
    wait_until(&mut rx, |s| s.status == Status::Success).await;

    screen.install("wget", false);
    let state = wait_until(&mut rx, |s| {
        s.status_of("wget") == OperationStatus::Success(Some(ActionKind::Installed))
    })
    .await;
    assert_eq!(state.status, Status::Success);
    assert_eq!(service.install_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_install_marks_row_failure() {
    let mut service = MockService::new(vec![formula("wget", None)], vec![]);
    service.op_result = false;
    let screen = PackageScreen::spawn(Arc::new(service), tuning());
    let mut rx = screen.watch();

    screen.query_changed("wget");
    wait_until(&mut rx, |s| s.status == Status::Success).await;

    screen.install("wget", false);
    wait_until(&mut rx, |s| s.status_of("wget") == OperationStatus::Failure).await;
}

#[tokio::test(start_paused = true)]
async fn operation_on_unknown_row_is_ignored() {
    let service = Arc::new(MockService::new(vec![formula("wget", None)], vec![]));
    let screen = PackageScreen::spawn(Arc::clone(&service), tuning());
    let mut rx = screen.watch();

    screen.query_changed("wget");
    wait_until(&mut rx, |s| s.status == Status::Success).await;

    screen.install("nosuchrow", false);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(service.install_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        screen.state().status_of("nosuchrow"),
        OperationStatus::Idle
    );
}

#[tokio::test(start_paused = true)]
async fn cancelled_delete_has_no_side_effect() {
    let service = Arc::new(MockService::new(
        vec![formula("wget", Some("1.0"))],
        vec![formula("wget", Some("1.0"))],
    ));
    let screen = PackageScreen::spawn(Arc::clone(&service), tuning());
    let mut rx = screen.watch();

    screen.query_changed("wget");
    wait_until(&mut rx, |s| s.status == Status::Success).await;

    screen.request_delete("wget");
    let state = wait_until(&mut rx, |s| s.pending_delete.is_some()).await;
    assert_eq!(state.pending_delete.as_deref(), Some("wget"));

    screen.cancel_delete();
    let state = wait_until(&mut rx, |s| s.pending_delete.is_none()).await;
    assert!(state.results[0].is_installed());
    assert_eq!(service.uninstall_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn confirmed_delete_removes_and_resyncs() {
    let service = Arc::new(MockService::new(
        vec![formula("wget", None)],
        vec![formula("wget", Some("1.0"))],
    ));
    let screen = PackageScreen::spawn(Arc::clone(&service), tuning());
    let mut rx = screen.watch();

    screen.query_changed("wget");
    wait_until(&mut rx, |s| s.status == Status::Success && s.results[0].is_installed()).await;

    screen.request_delete("wget");
    wait_until(&mut rx, |s| s.pending_delete.is_some()).await;
    screen.confirm_delete();

    // After the uninstall and the follow-up refresh the row is no longer
    // installed and its status is back to idle.
    let state = wait_until(&mut rx, |s| {
        !s.results[0].is_installed() && s.status_of("wget") == OperationStatus::Idle
    })
    .await;
    assert!(state.pending_delete.is_none());
    assert_eq!(service.uninstall_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn upgrade_resyncs_versions_after_delay() {
    let service = Arc::new(MockService::new(
        vec![formula("wget", None)],
        vec![formula("wget", Some("1.0"))],
    ));
    let screen = PackageScreen::spawn(Arc::clone(&service), tuning());
    let mut rx = screen.watch();

    screen.query_changed("wget");
    wait_until(&mut rx, |s| s.status == Status::Success).await;
    assert_eq!(
        screen.state().results[0].installed_version.as_deref(),
        Some("1.0")
    );

    screen.upgrade("wget");
    let state = wait_until(&mut rx, |s| {
        s.results[0].installed_version.as_deref() == Some("2.0")
    })
    .await;
    assert_eq!(state.status_of("wget"), OperationStatus::Idle);
    assert_eq!(service.upgrade_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn upgrade_all_fans_out_progress_and_resyncs() {
    let mut service = MockService::new(
        vec![formula("openssl", None), formula("sqlite", None)],
        vec![
            formula("openssl", Some("1.0")),
            formula("sqlite", Some("1.0")),
        ],
    );
    service.upgrade_events = vec![
        UpgradeEvent::Fetching {
            name: "openssl".to_string(),
        },
        UpgradeEvent::Upgrading {
            name: "openssl".to_string(),
            from: "1.0".to_string(),
            to: "2.0".to_string(),
        },
        UpgradeEvent::Completed {
            name: "openssl".to_string(),
        },
        UpgradeEvent::Upgrading {
            name: "sqlite".to_string(),
            from: String::new(),
            to: String::new(),
        },
    ];
    service.upgrade_all_delay = Duration::from_secs(2);
    let screen = PackageScreen::spawn(Arc::new(service), tuning());
    let mut rx = screen.watch();

    // Match everything so both rows are known to the screen.
    screen.query_changed("l");
    wait_until(&mut rx, |s| s.status == Status::Success && s.results.len() == 2).await;

    screen.upgrade_all();

    // While the stream is open: openssl completed, sqlite still loading.
    wait_until(&mut rx, |s| {
        s.status == Status::Loading
            && s.status_of("openssl") == OperationStatus::Success(Some(ActionKind::Updated))
            && s.status_of("sqlite") == OperationStatus::Loading
    })
    .await;

    let state = wait_until(&mut rx, |s| s.status == Status::Success).await;
    assert_eq!(state.status, Status::Success);
}
