//! nearguard-filterd: per-flow allow/drop decisions against the shared
//! policy store.
//!
//! The agent never caches the store. Every new flow re-reads both keys, so a
//! domain learned by the daemon applies to the next flow opened after the
//! write lands. A store directory that cannot be opened yet is retried on
//! each flow; until then the fail mode answers.

use std::path::PathBuf;
use std::sync::OnceLock;

use nearguard_core::config::{FailMode, PolicyConfig};
use nearguard_core::{decide, PolicySnapshot, Verdict};
use nearguard_services::{PolicyStore, StoreError};

/// What the platform tells us about a new outbound flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowDescriptor {
    /// Destination host name, when the platform could resolve one.
    pub host: Option<String>,
    /// Identifier of the process or app that opened the flow.
    pub source: Option<String>,
}

impl FlowDescriptor {
    /// Parse one `host [source]` line. `-` stands for "no host".
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let host = parts.next()?;
        Some(Self {
            host: (host != "-").then(|| host.to_string()),
            source: parts.next().map(str::to_string),
        })
    }
}

enum StoreHandle {
    Ready(PolicyStore),
    Lazy {
        dir: PathBuf,
        opened: OnceLock<PolicyStore>,
    },
}

impl StoreHandle {
    fn get(&self) -> Result<&PolicyStore, StoreError> {
        match self {
            Self::Ready(store) => Ok(store),
            Self::Lazy { dir, opened } => {
                if let Some(store) = opened.get() {
                    return Ok(store);
                }
                let store = PolicyStore::open(dir.clone())?;
                tracing::info!(dir = %dir.display(), "policy store opened");
                Ok(opened.get_or_init(|| store))
            }
        }
    }
}

pub struct FilterHook {
    store: StoreHandle,
    defaults: Vec<String>,
    exempt_sources: Vec<String>,
    fail_mode: FailMode,
}

impl FilterHook {
    pub fn new(
        store: PolicyStore,
        defaults: Vec<String>,
        exempt_sources: Vec<String>,
        fail_mode: FailMode,
    ) -> Self {
        Self::with_handle(StoreHandle::Ready(store), defaults, exempt_sources, fail_mode)
    }

    /// Hook over the file store in `dir`, opened on first use.
    pub fn lazy(
        dir: impl Into<PathBuf>,
        defaults: Vec<String>,
        exempt_sources: Vec<String>,
        fail_mode: FailMode,
    ) -> Self {
        let handle = StoreHandle::Lazy {
            dir: dir.into(),
            opened: OnceLock::new(),
        };
        Self::with_handle(handle, defaults, exempt_sources, fail_mode)
    }

    fn with_handle(
        store: StoreHandle,
        defaults: Vec<String>,
        exempt_sources: Vec<String>,
        fail_mode: FailMode,
    ) -> Self {
        Self {
            store,
            defaults,
            exempt_sources,
            fail_mode,
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self::lazy(
            config.store_dir.clone(),
            config.default_domains.clone(),
            config.exempt_sources.clone(),
            config.fail_mode,
        )
    }

    /// Decide one flow at open time.
    pub fn handle_new_flow(&self, flow: &FlowDescriptor) -> Verdict {
        if let Some(source) = &flow.source {
            if self.exempt_sources.iter().any(|s| s == source) {
                tracing::trace!(source = %source, "exempt source allowed");
                return Verdict::Allow;
            }
        }

        let snapshot = match self.snapshot() {
            Ok(s) => s,
            Err(e) => {
                let verdict = match self.fail_mode {
                    FailMode::Open => Verdict::Allow,
                    FailMode::Closed => Verdict::Drop,
                };
                tracing::warn!(error = %e, verdict = ?verdict, "policy store unreadable, applying fail mode");
                return verdict;
            }
        };

        let verdict = decide(flow.host.as_deref(), &snapshot);
        if verdict == Verdict::Drop {
            tracing::debug!(
                host = flow.host.as_deref().unwrap_or("-"),
                matched = ?snapshot.matching_domain(flow.host.as_deref().unwrap_or("")),
                "flow dropped"
            );
        }
        verdict
    }

    fn snapshot(&self) -> Result<PolicySnapshot, StoreError> {
        self.store.get()?.snapshot(&self.defaults)
    }
}
