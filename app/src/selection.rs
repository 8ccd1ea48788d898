//! Tool-selection strategy.
//!
//! Precedence, first match wins: bouquet override > mix > user settings >
//! fallback. The Gradio endpoint overlay is orthogonal and computed from the
//! same inputs.

use hfmcp_gradio::space_id::{self, SpaceId};
use serde::Serialize;

use crate::bouquets;
use crate::catalog;
use crate::headers::McpHeaders;
use crate::settings::{ResolvedSettings, SettingsSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SelectionMode {
    BouquetOverride,
    Mix,
    ExternalApi,
    InternalApi,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub mode: SelectionMode,
    pub enabled_tool_ids: Vec<String>,
    pub reason: String,
    /// Gradio endpoints to register, already deduplicated.
    pub gradio_spaces: Vec<SpaceId>,
}

fn dedup_preserving_order(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Apply the precedence rules to produce the enabled tool set.
pub fn select_tools(
    headers: &McpHeaders,
    settings: Option<&ResolvedSettings>,
    search_enables_fetch: bool,
) -> SelectionResult {
    let (mode, mut enabled, reason, applied_bouquet) = base_selection(headers, settings);

    if search_enables_fetch
        && enabled.iter().any(|id| id == catalog::HF_DOC_SEARCH)
        && !enabled.iter().any(|id| id == catalog::HF_DOC_FETCH)
    {
        enabled.push(catalog::HF_DOC_FETCH.to_string());
    }

    let gradio_spaces = gradio_overlay(headers, settings, applied_bouquet);

    SelectionResult {
        mode,
        enabled_tool_ids: enabled,
        reason,
        gradio_spaces,
    }
}

/// Returns (mode, enabled ids, reason, applied bouquet name).
fn base_selection<'a>(
    headers: &'a McpHeaders,
    settings: Option<&ResolvedSettings>,
) -> (SelectionMode, Vec<String>, String, Option<&'a str>) {
    // 1. bouquet override ignores user settings entirely
    if let Some(name) = headers.bouquet.as_deref() {
        if let Some(preset) = bouquets::lookup(name) {
            return (
                SelectionMode::BouquetOverride,
                preset.iter().map(|s| s.to_string()).collect(),
                format!("bouquet '{name}' override"),
                Some(name),
            );
        }
        tracing::debug!("unknown bouquet '{}', falling through", name);
    }

    // 2. mix: user tools first, then the preset, deduplicated
    if let (Some(name), Some(resolved)) = (headers.mix.as_deref(), settings) {
        if let Some(preset) = bouquets::lookup(name) {
            let merged = dedup_preserving_order(
                resolved
                    .settings
                    .built_in_tools
                    .iter()
                    .cloned()
                    .chain(preset.iter().map(|s| s.to_string())),
            );
            return (
                SelectionMode::Mix,
                merged,
                format!("user settings mixed with bouquet '{name}'"),
                None,
            );
        }
        tracing::debug!("unknown mix bouquet '{}', falling through", name);
    }

    // 3. user settings
    if let Some(resolved) = settings {
        let mode = match resolved.source {
            SettingsSource::External => SelectionMode::ExternalApi,
            SettingsSource::Internal => SelectionMode::InternalApi,
        };
        return (
            mode,
            dedup_preserving_order(resolved.settings.built_in_tools.iter().cloned()),
            "user settings".to_string(),
            None,
        );
    }

    // 4. fallback: every known built-in tool
    (
        SelectionMode::Fallback,
        catalog::all_tool_ids()
            .into_iter()
            .map(str::to_string)
            .collect(),
        "no settings available, enabling all tools".to_string(),
        None,
    )
}

/// Orthogonal Gradio endpoint overlay.
///
/// `none` disables everything, an explicit list is used verbatim, and a
/// non-`all` bouquet without an explicit list suppresses settings-provided
/// endpoints so the override stays exclusive.
fn gradio_overlay(
    headers: &McpHeaders,
    settings: Option<&ResolvedSettings>,
    applied_bouquet: Option<&str>,
) -> Vec<SpaceId> {
    if let Some(raw) = headers.gradio.as_deref() {
        if space_id::is_disable_sentinel(raw) {
            return Vec::new();
        }
        return space_id::parse_space_list(raw);
    }

    if matches!(applied_bouquet, Some(name) if name != "all") {
        return Vec::new();
    }

    settings
        .map(|resolved| {
            let joined = resolved.settings.gradio.join(",");
            space_id::parse_space_list(&joined)
        })
        .unwrap_or_default()
}
