//! Response post-processing for proxied tool results.
//!
//! Two transforms run after an upstream result is received, in order:
//! image-content stripping (opt-in per request) and first-URL extraction into
//! `structuredContent` for the `openai-mcp` client. Tools carrying the
//! `_mcpui` marker additionally embed a playable UI resource when their sole
//! result block is a URL.

use base64::Engine;
use rmcp::model::{CallToolResult, Content, RawContent};
use serde_json::json;

/// Client name that receives `structuredContent` URL extraction.
pub const OPENAI_CLIENT_NAME: &str = "openai-mcp";

/// Tool-name marker for spaces that return playable UI resources.
pub const MCPUI_MARKER: &str = "_mcpui";

const IMAGES_OMITTED_TEXT: &str =
    "The tool returned only image content, which was omitted because image output is disabled \
     for this connection. Re-run without the no-image option to receive it.";

/// Drop all image blocks. An all-image result is replaced with a single
/// explanatory text block.
pub fn strip_image_content(result: &mut CallToolResult) {
    let had_content = !result.content.is_empty();
    result
        .content
        .retain(|c| !matches!(c.raw, RawContent::Image(_)));
    if had_content && result.content.is_empty() {
        result.content.push(Content::text(IMAGES_OMITTED_TEXT));
    }
}

/// Scan content blocks for the first URL: a text block that is a bare
/// `http(s)://` URL, optionally prefixed with `Image URL:`.
pub fn extract_first_url(content: &[Content]) -> Option<String> {
    for block in content {
        if let RawContent::Text(text) = &block.raw {
            let candidate = text
                .text
                .trim()
                .strip_prefix("Image URL:")
                .map(str::trim)
                .unwrap_or_else(|| text.text.trim());
            if (candidate.starts_with("https://") || candidate.starts_with("http://"))
                && !candidate.contains(char::is_whitespace)
            {
                return Some(candidate.to_string());
            }
        }
    }
    None
}

/// For the `openai-mcp` client: lift the first URL in the result into
/// `structuredContent` so the client can render it without parsing text.
pub fn attach_url_structured_content(result: &mut CallToolResult, space_name: &str) {
    if let Some(url) = extract_first_url(&result.content) {
        result.structured_content = Some(json!({
            "url": url,
            "spaceName": space_name,
        }));
    }
}

fn audio_player_html(src: &str) -> String {
    format!(
        "<!DOCTYPE html><html><body style=\"margin:0\">\
         <audio controls autoplay style=\"width:100%\" src=\"{src}\"></audio>\
         </body></html>"
    )
}

/// Build a UI resource content block from the wire shape. Constructed through
/// serde so the block matches what clients expect byte-for-byte.
fn ui_resource_content(uri: &str, html: String) -> Option<Content> {
    serde_json::from_value(json!({
        "type": "resource",
        "resource": {
            "uri": uri,
            "mimeType": "text/html",
            "text": html,
        }
    }))
    .ok()
}

/// `_mcpui` tools that return a single URL block get the target embedded as
/// an audio-player UI resource. If the fetch fails the player references the
/// URL directly.
pub async fn embed_mcpui_audio(result: &mut CallToolResult, tool_name: &str, http: &reqwest::Client) {
    if !tool_name.contains(MCPUI_MARKER) || result.content.len() != 1 {
        return;
    }
    let Some(url) = extract_first_url(&result.content) else {
        return;
    };

    let uri = format!("ui://{}/audio-player", tool_name.trim_start_matches('_'));
    let html = match fetch_audio_data_url(http, &url).await {
        Ok(data_url) => audio_player_html(&data_url),
        Err(e) => {
            tracing::debug!("mcpui audio fetch failed for {}: {}, referencing url", url, e);
            audio_player_html(&url)
        }
    };

    if let Some(block) = ui_resource_content(&uri, html) {
        result.content.push(block);
    }
}

async fn fetch_audio_data_url(http: &reqwest::Client, url: &str) -> Result<String, reqwest::Error> {
    let response = http
        .get(url)
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await?
        .error_for_status()?;
    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("audio/wav")
        .to_string();
    let bytes = response.bytes().await?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:{mime};base64,{encoded}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_result(blocks: &[&str]) -> CallToolResult {
        CallToolResult::success(blocks.iter().map(|t| Content::text(*t)).collect())
    }

    fn image_content() -> Content {
        serde_json::from_value(json!({
            "type": "image",
            "data": "aGVsbG8=",
            "mimeType": "image/png"
        }))
        .expect("image content")
    }

    #[test]
    fn test_strip_removes_only_images() {
        let mut result = CallToolResult::success(vec![
            Content::text("caption"),
            image_content(),
            Content::text("tail"),
        ]);
        strip_image_content(&mut result);

        assert_eq!(result.content.len(), 2);
        assert!(result
            .content
            .iter()
            .all(|c| !matches!(c.raw, RawContent::Image(_))));
    }

    #[test]
    fn test_strip_all_images_leaves_placeholder() {
        let mut result = CallToolResult::success(vec![image_content(), image_content()]);
        strip_image_content(&mut result);

        assert_eq!(result.content.len(), 1);
        match &result.content[0].raw {
            RawContent::Text(text) => assert!(text.text.contains("omitted")),
            other => panic!("expected text placeholder, got {other:?}"),
        }
    }

    #[test]
    fn test_strip_on_empty_result_stays_empty() {
        let mut result = CallToolResult::success(vec![]);
        strip_image_content(&mut result);
        assert!(result.content.is_empty());
    }

    #[test]
    fn test_extract_plain_url() {
        let result = text_result(&["https://acme-foo.hf.space/file/out.wav"]);
        assert_eq!(
            extract_first_url(&result.content).as_deref(),
            Some("https://acme-foo.hf.space/file/out.wav")
        );
    }

    #[test]
    fn test_extract_image_url_prefix() {
        let result = text_result(&["Image URL: https://cdn.example/img.png"]);
        assert_eq!(
            extract_first_url(&result.content).as_deref(),
            Some("https://cdn.example/img.png")
        );
    }

    #[test]
    fn test_extract_skips_prose() {
        let result = text_result(&[
            "The generated file is available at the link below.",
            "https://host/file.png",
        ]);
        assert_eq!(
            extract_first_url(&result.content).as_deref(),
            Some("https://host/file.png")
        );
        assert_eq!(
            extract_first_url(&text_result(&["no links here"]).content),
            None
        );
    }

    #[test]
    fn test_attach_structured_content() {
        let mut result = text_result(&["https://host/file.png"]);
        attach_url_structured_content(&mut result, "acme/foo");

        let sc = result.structured_content.expect("structured content");
        assert_eq!(sc["url"], "https://host/file.png");
        assert_eq!(sc["spaceName"], "acme/foo");
    }

    #[test]
    fn test_attach_without_url_is_noop() {
        let mut result = text_result(&["just text"]);
        attach_url_structured_content(&mut result, "acme/foo");
        assert!(result.structured_content.is_none());
    }

    #[test]
    fn test_ui_resource_block_shape() {
        let block = ui_resource_content("ui://demo/audio-player", audio_player_html("x")).unwrap();
        match &block.raw {
            RawContent::Resource(resource) => {
                let value = serde_json::to_value(resource).unwrap();
                assert_eq!(value["resource"]["uri"], "ui://demo/audio-player");
                assert_eq!(value["resource"]["mimeType"], "text/html");
            }
            other => panic!("expected resource block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mcpui_requires_marker_and_single_url_block() {
        let http = reqwest::Client::new();

        let mut plain = text_result(&["https://host/audio.wav"]);
        embed_mcpui_audio(&mut plain, "gr1_generate", &http).await;
        assert_eq!(plain.content.len(), 1);

        let mut multi = text_result(&["https://host/a.wav", "extra"]);
        embed_mcpui_audio(&mut multi, "gr1_tts_mcpui", &http).await;
        assert_eq!(multi.content.len(), 2);
    }
}
