//! Learning pipeline: turns chat messages that look like domains into
//! policy store entries.

use crate::policy_store::{PolicyStore, StoreError};

/// What a single observation did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnOutcome {
    /// The domain was appended and persisted.
    Learned(String),
    /// Shaped like a domain, but the store already holds it.
    AlreadyKnown,
    NotADomain,
}

pub struct LearningPipeline {
    store: PolicyStore,
    suffixes: Vec<String>,
}

impl LearningPipeline {
    pub fn new(store: PolicyStore, suffixes: &[String]) -> Self {
        Self {
            store,
            suffixes: suffixes
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Candidate domain in `text`, lowercased, if it qualifies.
    pub fn candidate(&self, text: &str) -> Option<String> {
        let text = text.trim().to_lowercase();
        if text.chars().any(char::is_whitespace) {
            return None;
        }
        self.suffixes
            .iter()
            .any(|suffix| text.len() > suffix.len() && text.ends_with(suffix.as_str()))
            .then_some(text)
    }

    /// Inspect one message and persist it if it is a new domain.
    pub fn observe(&self, text: &str) -> Result<LearnOutcome, StoreError> {
        let Some(domain) = self.candidate(text) else {
            return Ok(LearnOutcome::NotADomain);
        };
        if self.store.add_domain(&domain)? {
            tracing::info!(domain = %domain, "learned blocked domain");
            Ok(LearnOutcome::Learned(domain))
        } else {
            tracing::debug!(domain = %domain, "domain already blocked");
            Ok(LearnOutcome::AlreadyKnown)
        }
    }
}
