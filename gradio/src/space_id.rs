use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel value that disables all Gradio endpoints when it appears in a
/// space list.
pub const DISABLE_SENTINEL: &str = "none";

/// A hosted space identified by `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpaceId {
    pub owner: String,
    pub name: String,
}

impl SpaceId {
    /// Parse a single `owner/name` token. The token must contain exactly one
    /// `/` with non-empty sides.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let mut parts = raw.split('/');
        let owner = parts.next()?.trim();
        let name = parts.next()?.trim();
        if parts.next().is_some() || owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Cache key for both cache levels.
    pub fn key(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Parse a comma-separated space list. `none` entries are filtered out;
/// invalid entries are logged and skipped.
pub fn parse_space_list(raw: &str) -> Vec<SpaceId> {
    let mut out = Vec::new();
    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() || token.eq_ignore_ascii_case(DISABLE_SENTINEL) {
            continue;
        }
        match SpaceId::parse(token) {
            Some(id) if !out.contains(&id) => out.push(id),
            Some(_) => {}
            None => {
                tracing::warn!("skipping invalid space identifier: '{}'", token);
            }
        }
    }
    out
}

/// True when the raw header value disables all Gradio endpoints.
pub fn is_disable_sentinel(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case(DISABLE_SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let id = SpaceId::parse("acme/foo").unwrap();
        assert_eq!(id.owner, "acme");
        assert_eq!(id.name, "foo");
        assert_eq!(id.to_string(), "acme/foo");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let id = SpaceId::parse("  acme / foo ").unwrap();
        assert_eq!(id.key(), "acme/foo");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(SpaceId::parse("acme").is_none());
        assert!(SpaceId::parse("acme/").is_none());
        assert!(SpaceId::parse("/foo").is_none());
        assert!(SpaceId::parse("a/b/c").is_none());
        assert!(SpaceId::parse("").is_none());
    }

    #[test]
    fn test_parse_space_list_filters_and_dedups() {
        let ids = parse_space_list("acme/foo, none, bad-entry, acme/foo, other/bar");
        assert_eq!(
            ids.iter().map(|i| i.key()).collect::<Vec<_>>(),
            vec!["acme/foo", "other/bar"]
        );
    }

    #[test]
    fn test_disable_sentinel() {
        assert!(is_disable_sentinel("none"));
        assert!(is_disable_sentinel(" NONE "));
        assert!(!is_disable_sentinel("acme/none"));
        assert_eq!(parse_space_list("none"), Vec::<SpaceId>::new());
    }
}
