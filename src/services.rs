//! Service seam between the screen state machine and the brew backend.
//!
//! [`PackageService`] is the trait the screen drives; [`BrewServices`] is the
//! production implementation composing the gateway and the catalog search.
//! Tests substitute their own implementations to exercise the state machine
//! without touching brew or the network.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::brew::{Homebrew, UpdateOutcome};
use crate::config::Config;
use crate::error::Result;
use crate::package::{Package, PackageKind};
use crate::search::CatalogSearch;
use crate::upgrade::UpgradeEvent;

/// Everything a package screen needs from the backend.
pub trait PackageService: Send + Sync + 'static {
    /// Catalog search with installed-state overlay.
    fn search(&self, query: &str) -> impl Future<Output = Result<Vec<Package>>> + Send;

    /// Fresh installed-package list.
    fn list_installed(&self) -> impl Future<Output = Result<Vec<Package>>> + Send;

    fn install(&self, package: &Package, force: bool) -> impl Future<Output = bool> + Send;

    fn upgrade(&self, package: &Package) -> impl Future<Output = bool> + Send;

    fn uninstall(&self, package: &Package) -> impl Future<Output = bool> + Send;

    /// Bulk upgrade; progress events go out on `events` in emission order.
    fn upgrade_all(&self, events: mpsc::Sender<UpgradeEvent>)
    -> impl Future<Output = bool> + Send;
}

/// Production wiring: [`Homebrew`] for the tool verbs, [`CatalogSearch`] for
/// catalog queries.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use brewmate::config::Config;
/// use brewmate::screen::{PackageScreen, ScreenTuning};
/// use brewmate::services::BrewServices;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = Config::default();
///     let services = Arc::new(BrewServices::new(&config)?);
///     let screen = PackageScreen::spawn(services, ScreenTuning::from(&config));
///     screen.query_changed("wget");
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct BrewServices {
    brew: Arc<Homebrew>,
    search: CatalogSearch,
}

impl BrewServices {
    pub fn new(config: &Config) -> Result<Self> {
        let brew = Arc::new(Homebrew::new(config));
        let search = CatalogSearch::new(config, Arc::clone(&brew))?;
        Ok(Self { brew, search })
    }

    /// The underlying gateway, for verbs outside the screen's scope
    /// (version query, catalog refresh, installed counts).
    pub fn brew(&self) -> &Homebrew {
        &self.brew
    }

    /// Installed brew version, if brew is present and answers.
    pub async fn brew_version(&self) -> Option<String> {
        self.brew.version().await
    }

    /// Run `brew update` and drop the cached catalog when it changed.
    pub async fn update_catalog(&self) -> UpdateOutcome {
        let outcome = self.brew.update().await;
        if outcome.success && !outcome.already_up_to_date {
            self.search.invalidate().await;
        }
        outcome
    }

    pub async fn installed_count(&self, kind: PackageKind) -> usize {
        self.brew.installed_count(kind).await
    }
}

impl PackageService for BrewServices {
    async fn search(&self, query: &str) -> Result<Vec<Package>> {
        self.search.search(query).await
    }

    async fn list_installed(&self) -> Result<Vec<Package>> {
        self.brew.list_installed().await
    }

    async fn install(&self, package: &Package, force: bool) -> bool {
        self.brew.install(package, force).await
    }

    async fn upgrade(&self, package: &Package) -> bool {
        self.brew.upgrade(package).await
    }

    async fn uninstall(&self, package: &Package) -> bool {
        self.brew.uninstall(package).await
    }

    async fn upgrade_all(&self, events: mpsc::Sender<UpgradeEvent>) -> bool {
        self.brew.upgrade_all(events).await
    }
}
