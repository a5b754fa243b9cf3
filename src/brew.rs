//! High-level gateway to the brew executable.
//!
//! [`Homebrew`] wraps [`CommandRunner`] with package-manager verbs: version
//! query, catalog refresh, installed-package introspection, install, upgrade,
//! uninstall, and a streaming bulk upgrade. Brew speaks to humans, so each
//! verb has to tolerate free-form phrasing in its output.
//!
//! Success for mutating verbs is judged by the process exit status first. A
//! past-tense marker in stdout ("Upgraded", "Uninstalled", ...) rescues a
//! nonzero exit, because brew occasionally fails in post-operation cleanup
//! after the operation itself went through. An output with neither a clear
//! positive nor negative signal and a zero exit counts as success; this bias
//! is deliberate and logged.
//!
//! # Examples
//!
//! ```no_run
//! use brewmate::brew::Homebrew;
//! use brewmate::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let brew = Homebrew::new(&Config::default());
//!
//!     if let Some(version) = brew.version().await {
//!         println!("brew {version}");
//!     }
//!
//!     for pkg in brew.list_installed().await? {
//!         println!("{} {}", pkg.name, pkg.installed_version.unwrap_or_default());
//!     }
//!     Ok(())
//! }
//! ```

use serde::Deserialize;
use tokio::sync::mpsc;

use crate::command::{CommandOutput, CommandRunner};
use crate::config::Config;
use crate::error::Result;
use crate::package::{Package, PackageKind};
use crate::upgrade::{UpgradeEvent, UpgradeParser};

/// Outcome of a `brew update` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub success: bool,
    /// Human-readable summary, passed through for the presentation layer.
    pub message: String,
    /// The catalog was already current; nothing changed.
    pub already_up_to_date: bool,
}

// `brew info --json=v2 --installed` document. Every field is optional at the
// record level; records missing what we need are skipped, not fatal.

#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(default)]
    formulae: Vec<InstalledFormula>,
    #[serde(default)]
    casks: Vec<InstalledCask>,
}

#[derive(Debug, Deserialize)]
struct InstalledFormula {
    name: Option<String>,
    #[serde(default)]
    versions: InstalledVersions,
    #[serde(default)]
    installed: Vec<InstalledKeg>,
    homepage: Option<String>,
    desc: Option<String>,
    tap: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InstalledVersions {
    stable: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstalledKeg {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstalledCask {
    token: Option<String>,
    #[serde(default)]
    name: Vec<String>,
    homepage: Option<String>,
    desc: Option<String>,
    tap: Option<String>,
    installed: Option<String>,
    version: Option<String>,
}

/// Gateway to the brew CLI.
#[derive(Debug, Clone)]
pub struct Homebrew {
    runner: CommandRunner,
}

impl Homebrew {
    pub fn new(config: &Config) -> Self {
        Self {
            runner: CommandRunner::new(config.brew_path.clone()),
        }
    }

    /// Query the installed brew version.
    ///
    /// Parses the second whitespace-separated token of the first output line
    /// ("Homebrew 4.2.21-42-gdeadbee" → "4.2.21") and returns `None` when the
    /// output is absent or malformed.
    pub async fn version(&self) -> Option<String> {
        let output = self.runner.run(["--version"]).await;
        parse_version(output.stdout.as_deref()?)
    }

    /// Refresh brew's own catalog (`brew update`).
    ///
    /// An "already up to date" phrase in stdout wins over everything else,
    /// including stderr noise. Otherwise the exit status decides, with an
    /// "Updated" marker as a fallback when the status is unavailable.
    pub async fn update(&self) -> UpdateOutcome {
        let output = self.runner.run(["update"]).await;
        classify_update(&output)
    }

    /// List installed packages via `brew info --json=v2 --installed`.
    ///
    /// Records missing a required field (name, stable version, homepage, or
    /// installed version for formulae; token, version, homepage, or installed
    /// version for casks) are skipped individually: brew routinely emits
    /// partial entries and one bad record must not abort the listing.
    ///
    /// # Errors
    ///
    /// Returns [`BrewError::Decode`](crate::error::BrewError::Decode) when
    /// the top-level document is structurally invalid, and
    /// [`BrewError::Launch`](crate::error::BrewError::Launch) when brew
    /// cannot be started at all. Absent output yields an empty list.
    pub async fn list_installed(&self) -> Result<Vec<Package>> {
        let output = self.runner.run(["info", "--json=v2", "--installed"]).await;

        if output.status.is_none() {
            return Err(crate::error::BrewError::Launch {
                program: self.runner.program().display().to_string(),
                message: output.stderr.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let Some(json) = output.stdout else {
            tracing::warn!(stderr = output.stderr.as_deref(), "no output from brew info");
            return Ok(Vec::new());
        };

        packages_from_info(&json)
    }

    /// Install a package (`brew install`), `--cask` and `--force` as needed.
    pub async fn install(&self, package: &Package, force: bool) -> bool {
        let mut args = vec!["install"];
        if package.kind == PackageKind::Cask {
            args.push("--cask");
        }
        args.push(package.id());
        if force {
            args.push("--force");
        }

        let output = self.runner.run(&args).await;
        operation_succeeded(&output, "Installed")
    }

    /// Upgrade one package to its latest version.
    pub async fn upgrade(&self, package: &Package) -> bool {
        let output = self.runner.run(["upgrade", package.id()]).await;
        operation_succeeded(&output, "Upgraded")
    }

    /// Uninstall a package, `--cask` for casks.
    pub async fn uninstall(&self, package: &Package) -> bool {
        let mut args = vec!["uninstall"];
        if package.kind == PackageKind::Cask {
            args.push("--cask");
        }
        args.push(package.id());

        let output = self.runner.run(&args).await;
        operation_succeeded(&output, "Uninstalled")
    }

    /// Upgrade everything, streaming progress events as brew reports them.
    ///
    /// Each stdout line runs through [`UpgradeParser`]; events go out on
    /// `events` in emission order. The channel closing early does not abort
    /// the upgrade: the run always completes and its outcome is returned.
    pub async fn upgrade_all(&self, events: mpsc::Sender<UpgradeEvent>) -> bool {
        let mut stream = self.runner.stream(["upgrade"]);
        let mut parser = UpgradeParser::new();

        while let Some(line) = stream.next_line().await {
            if let Some(event) = parser.push_line(&line) {
                if events.send(event).await.is_err() {
                    tracing::debug!("upgrade event receiver dropped, continuing unobserved");
                    break;
                }
            }
        }

        let output = stream.wait().await;
        operation_succeeded(&output, "Upgraded")
    }

    /// Count installed packages of one kind via `brew list`.
    pub async fn installed_count(&self, kind: PackageKind) -> usize {
        let scope = match kind {
            PackageKind::Formula => "--formula",
            PackageKind::Cask => "--cask",
        };
        let output = self.runner.run(["list", scope]).await;

        output
            .stdout
            .as_deref()
            .map(|s| s.lines().filter(|l| !l.trim().is_empty()).count())
            .unwrap_or(0)
    }
}

/// Extract "4.2.21" from "Homebrew 4.2.21-42-gdeadbee\n...".
fn parse_version(stdout: &str) -> Option<String> {
    let first_line = stdout.lines().next()?;
    let token = first_line.split_whitespace().nth(1)?;
    let version = token.split('-').next().unwrap_or(token);
    (!version.is_empty()).then(|| version.to_string())
}

fn classify_update(output: &CommandOutput) -> UpdateOutcome {
    let stdout = output.stdout.as_deref().unwrap_or("");

    if stdout.contains("Already up-to-date") || stdout.contains("already up to date") {
        return UpdateOutcome {
            success: true,
            message: "Homebrew is already up to date".to_string(),
            already_up_to_date: true,
        };
    }

    let marker = stdout.contains("Updated") || stdout.contains("updated");
    if output.succeeded() || marker {
        return UpdateOutcome {
            success: true,
            message: "Homebrew updated successfully".to_string(),
            already_up_to_date: false,
        };
    }

    let message = output
        .stderr
        .as_deref()
        .map(|err| format!("Update failed: {}", err.trim()))
        .unwrap_or_else(|| "Update failed with unknown error".to_string());

    UpdateOutcome {
        success: false,
        message,
        already_up_to_date: false,
    }
}

/// Success rule shared by the mutating verbs: exit status first, past-tense
/// marker as a rescue. Spawn failure is always failure.
fn operation_succeeded(output: &CommandOutput, marker: &str) -> bool {
    if output.status.is_none() {
        return false;
    }
    if output.succeeded() {
        return true;
    }

    let stdout = output.stdout.as_deref().unwrap_or("");
    let rescued = stdout.contains(marker) || stdout.contains(&marker.to_lowercase());
    if rescued {
        tracing::debug!(marker, "nonzero exit but output reports completion, treating as success");
    }
    rescued
}

/// Decode the installed-info document into packages, skipping partial records.
fn packages_from_info(json: &str) -> Result<Vec<Package>> {
    let info: InfoResponse = serde_json::from_str(json)?;
    let mut packages = Vec::new();

    for formula in &info.formulae {
        let (Some(name), Some(stable), Some(homepage)) =
            (&formula.name, &formula.versions.stable, &formula.homepage)
        else {
            tracing::debug!(name = formula.name.as_deref(), "skipping partial formula record");
            continue;
        };
        let Some(installed) = formula.installed.first().and_then(|k| k.version.clone()) else {
            tracing::debug!(name = %name, "skipping formula record without installed version");
            continue;
        };

        packages.push(Package {
            name: name.clone(),
            token: None,
            installed_version: Some(installed),
            latest_version: Some(stable.clone()),
            homepage: Some(homepage.clone()),
            desc: formula.desc.clone(),
            tap: formula.tap.clone(),
            kind: PackageKind::Formula,
        });
    }

    for cask in &info.casks {
        let (Some(token), Some(homepage), Some(installed), Some(version)) =
            (&cask.token, &cask.homepage, &cask.installed, &cask.version)
        else {
            tracing::debug!(token = cask.token.as_deref(), "skipping partial cask record");
            continue;
        };

        packages.push(Package {
            name: cask.name.first().cloned().unwrap_or_else(|| token.clone()),
            token: Some(token.clone()),
            installed_version: Some(installed.clone()),
            latest_version: Some(version.clone()),
            homepage: Some(homepage.clone()),
            desc: cask.desc.clone(),
            tap: cask.tap.clone(),
            kind: PackageKind::Cask,
        });
    }

    Ok(packages)
}
