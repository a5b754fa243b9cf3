//! Async orchestration library for the Homebrew CLI.
//!
//! brewmate drives the `brew` executable as a subprocess and reconciles its
//! output into typed state a frontend can render: a merged remote catalog,
//! installed-package overlays, debounced search, and per-package operation
//! lifecycles with streaming upgrade progress.
//!
//! # Architecture
//!
//! - **[`command`]**: subprocess capture, blocking and line-streaming
//! - **[`upgrade`]**: parser turning upgrade output into progress events
//! - **[`api`]**: Homebrew JSON catalog client
//! - **[`brew`]**: gateway exposing brew verbs over the runner and parser
//! - **[`search`]**: cached catalog + installed-state reconciliation
//! - **[`screen`]**: per-screen state machine (debounce, cancellation, status fan-out)
//! - **[`services`]**: wiring and the [`PackageService`] seam
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use brewmate::{BrewServices, Config, PackageScreen, ScreenTuning};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let services = Arc::new(BrewServices::new(&config)?);
//!     let screen = PackageScreen::spawn(services, ScreenTuning::from(&config));
//!
//!     let mut state = screen.watch();
//!     screen.query_changed("wget");
//!
//!     while state.changed().await.is_ok() {
//!         let snapshot = state.borrow().clone();
//!         println!("{:?}: {} results", snapshot.status, snapshot.results.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod brew;
pub mod command;
pub mod config;
pub mod error;
pub mod package;
pub mod screen;
pub mod search;
pub mod services;
pub mod upgrade;

pub use brew::{Homebrew, UpdateOutcome};
pub use command::{CommandOutput, CommandRunner, StreamingCommand};
pub use config::Config;
pub use error::{BrewError, Result};
pub use package::{Package, PackageKind};
pub use screen::{
    ActionKind, OperationStatus, PackageScreen, ScreenHandle, ScreenState, ScreenTuning, Status,
};
pub use search::CatalogSearch;
pub use services::{BrewServices, PackageService};
pub use upgrade::{UpgradeEvent, UpgradeParser};
