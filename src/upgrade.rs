//! Parser for `brew upgrade` progress output.
//!
//! Brew narrates a bulk upgrade with human-readable section markers:
//!
//! ```text
//! ==> Fetching downloads for: wget, curl
//! ==> Upgrading wget
//!   1.21.3 -> 1.21.4
//! 🍺  /opt/homebrew/Cellar/wget/1.21.4: 92 files, 4.5MB
//! ```
//!
//! [`UpgradeParser`] turns those lines into [`UpgradeEvent`]s. Version
//! numbers live on the line *after* the `==> Upgrading` header, so the parser
//! keeps the package from the most recent header and stitches the two lines
//! together: the header emits an event with empty versions immediately, and
//! the arrow line emits a second, enriched event for the same package.
//!
//! Classification is deterministic per line. Callers that receive raw chunks
//! rather than whole lines feed [`UpgradeParser::push_chunk`], which buffers
//! partial lines across chunk boundaries, and call
//! [`UpgradeParser::finish`] at end of stream.

const FETCHING_MARKER: &str = "==> Fetching";
const UPGRADING_MARKER: &str = "==> Upgrading";
const SECTION_MARKER: &str = "==>";
const COMPLETED_MARKER: &str = "🍺";
const CELLAR_SEGMENT: &str = "/Cellar/";

/// One step of progress during a streaming upgrade. Transient, not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeEvent {
    /// Downloads started; `name` is the first package of the batch.
    Fetching { name: String },
    /// A package upgrade began. `from`/`to` are empty on the header-line
    /// event and filled on the follow-up event built from the version line.
    Upgrading {
        name: String,
        from: String,
        to: String,
    },
    /// A package finished installing into the Cellar.
    Completed { name: String },
}

impl UpgradeEvent {
    /// The package this event refers to.
    pub fn package(&self) -> &str {
        match self {
            Self::Fetching { name } | Self::Upgrading { name, .. } | Self::Completed { name } => {
                name
            }
        }
    }
}

/// Stateful line classifier for upgrade output.
#[derive(Debug, Default)]
pub struct UpgradeParser {
    /// Package named by the most recent `==> Upgrading` header, awaiting its
    /// version line.
    pending: Option<String>,
    /// Partial line carried over between chunks.
    partial: String,
}

impl UpgradeParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one complete output line.
    pub fn push_line(&mut self, line: &str) -> Option<UpgradeEvent> {
        let line = line.trim();

        if line.starts_with(FETCHING_MARKER) || line.contains("Fetching downloads") {
            let packages = line.split_once(':')?.1;
            let first = packages.split(',').map(str::trim).find(|p| !p.is_empty())?;
            return Some(UpgradeEvent::Fetching {
                name: first.to_string(),
            });
        }

        if line.starts_with(UPGRADING_MARKER) {
            let name = line.split_whitespace().nth(2)?.to_string();
            self.pending = Some(name.clone());
            return Some(UpgradeEvent::Upgrading {
                name,
                from: String::new(),
                to: String::new(),
            });
        }

        if line.contains("->") && !line.starts_with(SECTION_MARKER) {
            let name = self.pending.take()?;
            let (from, to) = line.split_once("->")?;
            return Some(UpgradeEvent::Upgrading {
                name,
                from: from.trim().to_string(),
                to: to.trim().to_string(),
            });
        }

        if line.contains(COMPLETED_MARKER) {
            let after_cellar = line.split_once(CELLAR_SEGMENT)?.1;
            let name = after_cellar.split(['/', ':']).next()?;
            if name.is_empty() {
                return None;
            }
            return Some(UpgradeEvent::Completed {
                name: name.to_string(),
            });
        }

        None
    }

    /// Feed a raw chunk that may start or end mid-line.
    ///
    /// Complete lines are classified immediately; a trailing fragment is held
    /// until the newline arrives in a later chunk. Event order matches line
    /// order.
    pub fn push_chunk(&mut self, chunk: &str) -> Vec<UpgradeEvent> {
        self.partial.push_str(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=newline).collect();
            if let Some(event) = self.push_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing unterminated line at end of stream.
    pub fn finish(&mut self) -> Option<UpgradeEvent> {
        if self.partial.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.partial);
        self.push_line(&line)
    }
}
