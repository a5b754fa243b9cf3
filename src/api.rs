//! Homebrew JSON catalog client.
//!
//! [`CatalogApi`] fetches the two public catalog documents, `formula.json`
//! and `cask.json`, from the Homebrew API. The fetches run concurrently and
//! the pair is all-or-nothing: a non-2xx status or an undecodable body on
//! either branch fails the whole catalog, so callers never see a half-merged
//! package list.
//!
//! Caching policy lives one layer up in
//! [`CatalogSearch`](crate::search::CatalogSearch); this client only does
//! network I/O.
//!
//! # Examples
//!
//! ```no_run
//! use brewmate::api::CatalogApi;
//! use brewmate::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let api = CatalogApi::new(&Config::default())?;
//!     let catalog = api.fetch_catalog().await?;
//!     println!(
//!         "{} formulae, {} casks",
//!         catalog.formulae.len(),
//!         catalog.casks.len()
//!     );
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One formula entry from `formula.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaRecord {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub versions: CatalogVersions,
    #[serde(default)]
    pub tap: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogVersions {
    #[serde(default)]
    pub stable: Option<String>,
}

/// One cask entry from `cask.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaskRecord {
    pub token: String,
    #[serde(default)]
    pub name: Vec<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tap: Option<String>,
}

/// The full remote catalog, both kinds, fetched as one unit.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub formulae: Vec<FormulaRecord>,
    pub casks: Vec<CaskRecord>,
}

/// HTTP client for the catalog endpoints.
#[derive(Debug, Clone)]
pub struct CatalogApi {
    client: reqwest::Client,
    base: String,
}

impl CatalogApi {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(format!("brewmate/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base: config.api_base.clone(),
        })
    }

    /// Fetch both catalog documents concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`BrewError::Network`](crate::error::BrewError::Network) when
    /// either endpoint responds with a non-success status or its body cannot
    /// be decoded. No partial catalog is ever returned.
    pub async fn fetch_catalog(&self) -> Result<Catalog> {
        let (formulae, casks) =
            futures::future::try_join(self.fetch_formulae(), self.fetch_casks()).await?;

        tracing::debug!(
            formulae = formulae.len(),
            casks = casks.len(),
            "catalog fetched"
        );

        Ok(Catalog { formulae, casks })
    }

    async fn fetch_formulae(&self) -> Result<Vec<FormulaRecord>> {
        let url = format!("{}/formula.json", self.base);
        let records = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(records)
    }

    async fn fetch_casks(&self) -> Result<Vec<CaskRecord>> {
        let url = format!("{}/cask.json", self.base);
        let records = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(records)
    }
}
