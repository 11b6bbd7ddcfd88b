//! Filter decision engine.
//!
//! A flow is dropped when the filter is enabled and its destination host
//! ends with one of the blocked domain suffixes. Suffix matching is plain
//! string suffix on the lowercased host, so `youtube.com` blocks
//! `m.youtube.com`. Empty entries never match anything.

use serde::{Deserialize, Serialize};

/// Per-flow outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Drop,
}

/// Everything the decision needs, read once per flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySnapshot {
    /// Built-in defaults followed by stored entries. Not deduplicated.
    pub domains: Vec<String>,
    pub enabled: bool,
}

impl PolicySnapshot {
    /// Concatenate defaults and stored entries, lowercasing both.
    pub fn new(defaults: &[String], stored: &[String], enabled: bool) -> Self {
        let domains = defaults
            .iter()
            .chain(stored.iter())
            .map(|d| d.trim().to_ascii_lowercase())
            .collect();
        Self { domains, enabled }
    }

    /// The first non-empty entry `host` ends with, if any.
    pub fn matching_domain(&self, host: &str) -> Option<&str> {
        let host = host.to_ascii_lowercase();
        self.domains
            .iter()
            .find(|d| !d.is_empty() && host.ends_with(d.as_str()))
            .map(String::as_str)
    }
}

/// Decide a flow from its (optional) destination host.
pub fn decide(host: Option<&str>, policy: &PolicySnapshot) -> Verdict {
    if !policy.enabled {
        return Verdict::Allow;
    }
    match host {
        Some(h) if !h.is_empty() && policy.matching_domain(h).is_some() => Verdict::Drop,
        _ => Verdict::Allow,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("domain entry is empty")]
    Empty,
    #[error("malformed domain entry {0:?}")]
    Malformed(String),
}

/// Validate and normalize a user-supplied domain: trimmed, lowercased,
/// trailing dot removed. Wildcards, whitespace and URL syntax are refused.
pub fn normalize_domain(input: &str) -> Result<String, DomainError> {
    let domain = input.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return Err(DomainError::Empty);
    }
    let well_formed = domain
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
        && !domain.contains("..");
    if !well_formed {
        return Err(DomainError::Malformed(input.to_string()));
    }
    Ok(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(domains: &[&str]) -> PolicySnapshot {
        let stored: Vec<String> = domains.iter().map(|d| d.to_string()).collect();
        PolicySnapshot::new(&[], &stored, true)
    }

    #[test]
    fn suffix_match_drops_subdomains() {
        let p = policy(&["youtube.com"]);
        assert_eq!(decide(Some("m.youtube.com"), &p), Verdict::Drop);
        assert_eq!(decide(Some("youtube.com"), &p), Verdict::Drop);
        assert_eq!(decide(Some("vimeo.com"), &p), Verdict::Allow);
    }

    #[test]
    fn empty_blocklist_allows_everything() {
        let p = policy(&[]);
        assert_eq!(decide(Some("example.com"), &p), Verdict::Allow);
    }

    #[test]
    fn empty_entries_never_match() {
        let p = policy(&["", "   "]);
        assert_eq!(decide(Some("example.com"), &p), Verdict::Allow);
        assert_eq!(p.matching_domain("example.com"), None);
    }

    #[test]
    fn missing_host_is_allowed() {
        let p = policy(&["youtube.com"]);
        assert_eq!(decide(None, &p), Verdict::Allow);
        assert_eq!(decide(Some(""), &p), Verdict::Allow);
    }

    #[test]
    fn host_case_is_ignored() {
        let p = policy(&["YouTube.com"]);
        assert_eq!(decide(Some("M.YOUTUBE.COM"), &p), Verdict::Drop);
    }

    #[test]
    fn disabled_filter_allows_blocked_hosts() {
        let stored = vec!["youtube.com".to_string()];
        let p = PolicySnapshot::new(&[], &stored, false);
        assert_eq!(decide(Some("m.youtube.com"), &p), Verdict::Allow);
    }

    #[test]
    fn defaults_come_before_stored_entries() {
        let defaults = vec!["youtube.com".to_string()];
        let stored = vec!["youtube.com".to_string(), "spam.com".to_string()];
        let p = PolicySnapshot::new(&defaults, &stored, true);
        assert_eq!(p.domains, vec!["youtube.com", "youtube.com", "spam.com"]);
        assert_eq!(decide(Some("www.spam.com"), &p), Verdict::Drop);
    }

    #[test]
    fn drop_iff_some_entry_is_a_suffix() {
        let hosts = ["a.example.org", "example.org", "org", "b.test", "test.b", ""];
        let lists: [&[&str]; 4] = [&[], &["org"], &["example.org", ""], &["test", "b"]];
        for list in lists {
            let p = policy(list);
            for host in hosts {
                let expected = list.iter().any(|d| !d.is_empty() && host.ends_with(d));
                let verdict = decide(Some(host), &p);
                assert_eq!(verdict == Verdict::Drop, expected, "host {host:?} list {list:?}");
            }
        }
    }

    #[test]
    fn normalize_accepts_plain_domains() {
        assert_eq!(normalize_domain("  Spam.COM. ").unwrap(), "spam.com");
        assert_eq!(normalize_domain("a-b.example").unwrap(), "a-b.example");
    }

    #[test]
    fn normalize_rejects_bad_entries() {
        assert_eq!(normalize_domain(""), Err(DomainError::Empty));
        assert_eq!(normalize_domain("  "), Err(DomainError::Empty));
        assert!(matches!(normalize_domain("*.spam.com"), Err(DomainError::Malformed(_))));
        assert!(matches!(normalize_domain("spam com"), Err(DomainError::Malformed(_))));
        assert!(matches!(normalize_domain("http://spam.com"), Err(DomainError::Malformed(_))));
        assert!(matches!(normalize_domain("spam..com"), Err(DomainError::Malformed(_))));
    }
}
