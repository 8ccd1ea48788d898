//! Outward tool-name synthesis.
//!
//! Discovered tools are registered under `gr{index}_{name}` (public spaces)
//! or `grp{index}_{name}` (private spaces), where `index` is the 1-based
//! position of the space within the current discovery. Names are capped at 49
//! characters; overlong names are middle-truncated with the tool's index
//! folded in to keep them unique within the space.

pub const MAX_TOOL_NAME_LEN: usize = 49;

const TRUNCATION_HEAD: usize = 20;

/// Lowercase and collapse runs of separators and other specials to a single
/// underscore. The result is plain ASCII.
pub fn sanitize_tool_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_underscore = false;
        } else if c == '_' || c == '-' || c == ' ' || c == '.' {
            if !last_was_underscore {
                out.push('_');
                last_was_underscore = true;
            }
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }
    out
}

/// Synthesize the outward name for `(space_index, tool_index, tool_name)`.
/// `space_index` is 1-based; `tool_index` is the tool's 0-based position
/// within its space and only appears when truncation is required.
pub fn outward_tool_name(
    private: bool,
    space_index: usize,
    tool_index: usize,
    tool_name: &str,
) -> String {
    let prefix = format!("{}{}_", if private { "grp" } else { "gr" }, space_index);
    let sanitized = sanitize_tool_name(tool_name);
    let budget = MAX_TOOL_NAME_LEN.saturating_sub(prefix.len());

    if sanitized.len() <= budget {
        return format!("{prefix}{sanitized}");
    }

    // Middle truncation: tool index, the first 20 chars, an underscore, then
    // as much of the tail as still fits.
    let index_part = format!("{tool_index}_");
    let head: String = sanitized.chars().take(TRUNCATION_HEAD).collect();
    let tail_budget = budget
        .saturating_sub(index_part.len())
        .saturating_sub(head.len())
        .saturating_sub(1);
    let tail: String = sanitized
        .chars()
        .skip(sanitized.len().saturating_sub(tail_budget))
        .collect();
    format!("{prefix}{index_part}{head}_{tail}")
}

/// The outward-name shape, used by the transports to decide whether a
/// `tools/call` targets a Gradio-proxied tool.
pub fn is_gradio_tool_name(name: &str) -> bool {
    let rest = match name.strip_prefix("grp").or_else(|| name.strip_prefix("gr")) {
        Some(rest) => rest,
        None => return false,
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    !digits.is_empty() && rest[digits.len()..].starts_with('_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_tool_name("Fetch-HTML"), "fetch_html");
        assert_eq!(sanitize_tool_name("get.current time"), "get_current_time");
        assert_eq!(sanitize_tool_name("a--b..c"), "a_b_c");
        assert_eq!(sanitize_tool_name("weird✨chars"), "weird_chars");
    }

    #[test]
    fn test_short_names_pass_through() {
        assert_eq!(outward_tool_name(false, 1, 0, "infer"), "gr1_infer");
        assert_eq!(outward_tool_name(true, 2, 0, "infer"), "grp2_infer");
        assert_eq!(outward_tool_name(false, 12, 3, "Fetch-HTML"), "gr12_fetch_html");
    }

    #[test]
    fn test_cap_is_honored() {
        let long = "a_very_long_gradio_endpoint_name_that_keeps_going_and_going_forever";
        for (space_index, tool_index) in [(1usize, 0usize), (9, 3), (120, 17)] {
            for private in [false, true] {
                let name = outward_tool_name(private, space_index, tool_index, long);
                assert!(
                    name.len() <= MAX_TOOL_NAME_LEN,
                    "{name} exceeds cap at {} chars",
                    name.len()
                );
            }
        }
    }

    #[test]
    fn test_truncation_keeps_head_and_tail() {
        let long = "summarize_document_with_extremely_detailed_output_formatting";
        let name = outward_tool_name(false, 1, 2, long);
        assert!(name.starts_with("gr1_2_summarize_document_w"));
        assert!(name.ends_with("formatting"));
        assert_eq!(name.len(), MAX_TOOL_NAME_LEN);
    }

    #[test]
    fn test_no_collisions_within_a_space() {
        // names that agree on their first 20 and last characters collide
        // unless the tool index is folded in
        let base = "transcribe_audio_file_with_full_timestamps_and_speaker_labels";
        let variants: Vec<String> = (0..8).map(|i| format!("{base}_{i}")).collect();

        let mut seen = HashSet::new();
        for (tool_index, tool_name) in variants.iter().enumerate() {
            let name = outward_tool_name(false, 1, tool_index, tool_name);
            assert!(name.len() <= MAX_TOOL_NAME_LEN);
            assert!(seen.insert(name.clone()), "collision on {name}");
        }
    }

    #[test]
    fn test_prefix_shape_detection() {
        assert!(is_gradio_tool_name("gr1_infer"));
        assert!(is_gradio_tool_name("grp12_fetch_html"));
        assert!(!is_gradio_tool_name("gradio_tool"));
        assert!(!is_gradio_tool_name("gr_infer"));
        assert!(!is_gradio_tool_name("hub_search"));
        assert!(!is_gradio_tool_name("grp_x"));
    }
}
