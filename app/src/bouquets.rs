//! Named tool presets ("bouquets").
//!
//! The set is closed: unknown names fall through the selection strategy
//! silently. `search`/`docs`/`spaces`/`hf_api`/`jobs`/`all` are the
//! production presets; `nothing` and `readme` exist for tests.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::catalog::{
    self, DYNAMIC_SPACE, HF_DOC_FETCH, HF_DOC_SEARCH, HUB_INSPECT, HUB_JOBS, HUB_SEARCH,
    README_MARKER, USE_SPACE,
};

pub static BOUQUETS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, Vec<&'static str>> = HashMap::new();
    map.insert("search", vec![HUB_SEARCH, HUB_INSPECT]);
    map.insert("docs", vec![HF_DOC_SEARCH, HF_DOC_FETCH]);
    map.insert("spaces", vec![USE_SPACE, DYNAMIC_SPACE]);
    map.insert("hf_api", vec![HUB_SEARCH, HUB_INSPECT, README_MARKER]);
    map.insert("jobs", vec![HUB_JOBS]);
    map.insert("all", catalog::all_tool_ids());
    // test presets
    map.insert("nothing", vec![]);
    map.insert("readme", vec![HUB_INSPECT, README_MARKER]);
    map
});

pub fn lookup(name: &str) -> Option<&'static Vec<&'static str>> {
    BOUQUETS.get(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_presets() {
        assert_eq!(lookup("search").unwrap(), &vec![HUB_SEARCH, HUB_INSPECT]);
        assert!(lookup("all").unwrap().contains(&HUB_JOBS));
        assert!(lookup("nothing").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_preset_is_none() {
        assert!(lookup("flowers").is_none());
        assert!(lookup("").is_none());
        // lookup is case-sensitive
        assert!(lookup("Search").is_none());
    }

    #[test]
    fn test_hf_api_carries_readme_marker() {
        assert!(lookup("hf_api").unwrap().contains(&README_MARKER));
    }
}
