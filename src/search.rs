//! Catalog search with installed-state reconciliation.
//!
//! [`CatalogSearch`] owns the merged remote catalog and answers substring
//! queries against it. The catalog is fetched lazily on the first search and
//! held in a TTL cache with manual invalidation; the installed-package list
//! is refetched on every search so local state never goes stale against
//! recent installs, upgrades, or removals.

use std::sync::Arc;

use crate::api::CatalogApi;
use crate::brew::Homebrew;
use crate::config::Config;
use crate::error::Result;
use crate::package::{Package, PackageKind};

/// Searches the remote catalog and overlays local install status.
#[derive(Clone)]
pub struct CatalogSearch {
    api: CatalogApi,
    brew: Arc<Homebrew>,
    // Single-entry cache for the merged catalog. TTL plus invalidate() is the
    // whole staleness policy; nobody mutates the cached value in place.
    catalog: moka::future::Cache<(), Arc<Vec<Package>>>,
}

impl CatalogSearch {
    pub fn new(config: &Config, brew: Arc<Homebrew>) -> Result<Self> {
        let api = CatalogApi::new(config)?;
        let catalog = moka::future::Cache::builder()
            .max_capacity(1)
            .time_to_live(config.catalog_ttl)
            .build();

        Ok(Self { api, brew, catalog })
    }

    /// Search the catalog, overlaying installed versions.
    ///
    /// Filter: case-insensitive substring match on name or token. Results are
    /// ordered by similarity to the query, best first. A catalog package with
    /// no matching installed record keeps an unset version (not installed).
    ///
    /// # Errors
    ///
    /// Propagates catalog fetch failures and installed-list failures; the
    /// cached catalog is never replaced by a partial result.
    pub async fn search(&self, query: &str) -> Result<Vec<Package>> {
        let catalog = self.catalog_packages().await?;
        let installed = self.brew.list_installed().await?;

        let needle = query.to_lowercase();
        let mut results: Vec<Package> = catalog
            .iter()
            .filter(|pkg| matches_query(pkg, &needle))
            .cloned()
            .collect();
        overlay_installed(&mut results, &installed);

        results.sort_by(|a, b| {
            let a_score = strsim::jaro_winkler(&needle, &a.id().to_lowercase());
            let b_score = strsim::jaro_winkler(&needle, &b.id().to_lowercase());
            b_score
                .partial_cmp(&a_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(query, results = results.len(), "search completed");
        Ok(results)
    }

    /// Drop the cached catalog so the next search refetches it.
    pub async fn invalidate(&self) {
        self.catalog.invalidate(&()).await;
    }

    async fn catalog_packages(&self) -> Result<Arc<Vec<Package>>> {
        if let Some(cached) = self.catalog.get(&()).await {
            return Ok(cached);
        }

        let catalog = self.api.fetch_catalog().await?;
        let mut packages: Vec<Package> = catalog.formulae.iter().map(Package::from_formula).collect();
        packages.extend(catalog.casks.iter().map(Package::from_cask));

        let packages = Arc::new(packages);
        self.catalog.insert((), Arc::clone(&packages)).await;
        Ok(packages)
    }
}

fn matches_query(pkg: &Package, needle: &str) -> bool {
    pkg.name.to_lowercase().contains(needle)
        || pkg
            .token
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(needle))
}

/// Copy installed versions onto catalog packages: formulae match by name,
/// casks by token. Everything else keeps an unset version.
fn overlay_installed(results: &mut [Package], installed: &[Package]) {
    for pkg in results.iter_mut() {
        let matched = installed.iter().find(|inst| match pkg.kind {
            PackageKind::Formula => inst.kind == PackageKind::Formula && inst.name == pkg.name,
            PackageKind::Cask => inst.kind == PackageKind::Cask && inst.token == pkg.token,
        });
        pkg.installed_version = matched.and_then(|inst| inst.installed_version.clone());
    }
}
