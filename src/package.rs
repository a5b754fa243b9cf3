//! The `Package` value object shared by every layer.

use serde::{Deserialize, Serialize};

use crate::api::{CaskRecord, FormulaRecord};

/// The two package kinds Homebrew distinguishes. Formulae are identified by
/// name, casks by token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Formula,
    Cask,
}

/// A package as seen by the orchestrator: a merge key plus display data.
///
/// Packages are plain values. Each layer holds its own copies and merges them
/// by [`Package::id`]; nothing shares ownership of a package across layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub token: Option<String>,
    /// Version currently installed locally, `None` when not installed.
    pub installed_version: Option<String>,
    /// Newest version the catalog or tool reports.
    pub latest_version: Option<String>,
    pub homepage: Option<String>,
    pub desc: Option<String>,
    pub tap: Option<String>,
    pub kind: PackageKind,
}

impl Package {
    /// Stable identity key: the cask token when present, else the name.
    pub fn id(&self) -> &str {
        self.token.as_deref().unwrap_or(&self.name)
    }

    pub fn is_installed(&self) -> bool {
        self.installed_version.is_some()
    }

    /// Build from a remote formula record. The installed version is unknown
    /// at this stage and left unset until the reconciler overlays it.
    pub fn from_formula(record: &FormulaRecord) -> Self {
        Self {
            name: record.name.clone(),
            token: None,
            installed_version: None,
            latest_version: record.versions.stable.clone(),
            homepage: record.homepage.clone(),
            desc: record.desc.clone(),
            tap: record.tap.clone(),
            kind: PackageKind::Formula,
        }
    }

    /// Build from a remote cask record. Display name falls back to the token
    /// when the record carries no name.
    pub fn from_cask(record: &CaskRecord) -> Self {
        Self {
            name: record
                .name
                .first()
                .cloned()
                .unwrap_or_else(|| record.token.clone()),
            token: Some(record.token.clone()),
            installed_version: None,
            latest_version: record.version.clone(),
            homepage: record.homepage.clone(),
            desc: record.desc.clone(),
            tap: record.tap.clone(),
            kind: PackageKind::Cask,
        }
    }
}
