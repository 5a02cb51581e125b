//! Assemble a reminder broadcast: an ordered list of Discord-sized message
//! chunks carrying the campaign header and a mention for every opt-in.
//!
//! Pure apart from reading the store; no Discord I/O happens here.

use serde::Serialize;

use crate::discord::MAX_MESSAGE_CODEPOINTS;
use crate::error::ToolError;
use crate::store::{Campaign, Store};

use super::require_campaign;

const MENTIONS_PLACEHOLDER: &str = "{mentions}";
const CONTINUATION_MARKER: &str = " (cont.)";

#[derive(Debug, Clone, Serialize)]
pub struct BuiltReminder {
    pub chunks: Vec<String>,
    pub recipient_count: usize,
}

/// Build the broadcast for a campaign.
///
/// Mentions appear in opt-in insertion order and concatenating them across
/// chunks reproduces the opt-in list exactly. With zero opt-ins the result
/// is an empty chunk list.
///
/// A template may use `{title}`, `{total_optins}`, and `{mentions}`; without
/// a `{mentions}` placeholder the mentions follow the rendered header on a
/// new line. Without a template the header is `Reminder: {title}`.
pub async fn build_reminder(
    store: &Store,
    campaign_id: i64,
    template: Option<&str>,
) -> Result<BuiltReminder, ToolError> {
    let campaign = require_campaign(store, campaign_id).await?;
    let optins = store.list_optins(campaign_id).await?;

    if optins.is_empty() {
        return Ok(BuiltReminder {
            chunks: Vec::new(),
            recipient_count: 0,
        });
    }

    let mentions: Vec<String> = optins.iter().map(|o| format!("<@{}>", o.user_id)).collect();
    let header = render_header(&campaign, template, optins.len());
    Ok(BuiltReminder {
        chunks: chunk_mentions(&header, &mentions),
        recipient_count: optins.len(),
    })
}

fn render_header(campaign: &Campaign, template: Option<&str>, total_optins: usize) -> String {
    let title = campaign
        .title
        .clone()
        .unwrap_or_else(|| format!("Campaign {}", campaign.id));
    match template {
        Some(t) => t
            .replace("{title}", &title)
            .replace("{total_optins}", &total_optins.to_string()),
        None => format!("Reminder: {}", title),
    }
}

/// Code points a chunk spends before any mention text: the header plus the
/// newline separating it from the mentions, or the header minus its
/// `{mentions}` placeholder when it has one.
fn chunk_overhead(header: &str) -> usize {
    let len = header.chars().count();
    if header.contains(MENTIONS_PLACEHOLDER) {
        len - MENTIONS_PLACEHOLDER.chars().count()
    } else {
        len + 1
    }
}

/// Continuation header: the marker lands at the end of the header's first
/// line so multi-line templates keep their shape.
fn with_continuation(header: &str) -> String {
    match header.find('\n') {
        Some(idx) => format!(
            "{}{}{}",
            &header[..idx],
            CONTINUATION_MARKER,
            &header[idx..]
        ),
        None => format!("{}{}", header, CONTINUATION_MARKER),
    }
}

fn render_chunk(header: &str, mentions: &[&str]) -> String {
    let joined = mentions.join(" ");
    if header.contains(MENTIONS_PLACEHOLDER) {
        header.replace(MENTIONS_PLACEHOLDER, &joined)
    } else {
        format!("{}\n{}", header, joined)
    }
}

/// Greedy chunking under the code-point ceiling. Appending a mention that
/// would push the current chunk past the ceiling closes it and opens a
/// continuation chunk. A mention too large to share a chunk even with its
/// header goes out as a bare chunk of its own, so the ceiling holds for
/// everything else.
fn chunk_mentions(header: &str, mentions: &[String]) -> Vec<String> {
    let cont_header = with_continuation(header);
    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_mentions_len = 0usize;

    for mention in mentions {
        let mention_len = mention.chars().count();
        loop {
            let head = if chunks.is_empty() { header } else { &cont_header };
            let separator = usize::from(!current.is_empty());
            if chunk_overhead(head) + current_mentions_len + separator + mention_len
                <= MAX_MESSAGE_CODEPOINTS
            {
                current.push(mention);
                current_mentions_len += separator + mention_len;
                break;
            }
            if current.is_empty() {
                chunks.push(mention.clone());
                break;
            }
            chunks.push(render_chunk(head, &current));
            current.clear();
            current_mentions_len = 0;
        }
    }

    if !current.is_empty() {
        let head = if chunks.is_empty() { header } else { &cont_header };
        chunks.push(render_chunk(head, &current));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_store;
    use chrono::Utc;

    fn extract_mentions(chunks: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        for chunk in chunks {
            let mut rest = chunk.as_str();
            while let Some(start) = rest.find("<@") {
                let tail = &rest[start..];
                let end = tail.find('>').expect("unterminated mention");
                out.push(tail[..=end].to_string());
                rest = &tail[end + 1..];
            }
        }
        out
    }

    fn mentions_for(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| format!("<@{}>", id)).collect()
    }

    #[test]
    fn everything_fits_in_one_chunk() {
        let mentions = mentions_for(&["1", "2", "3"]);
        let chunks = chunk_mentions("Reminder: Game night", &mentions);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "Reminder: Game night\n<@1> <@2> <@3>");
    }

    #[test]
    fn chunk_boundary_at_210_mentions() {
        // Header of exactly 40 code points; 18-digit snowflakes make each
        // mention 21 code points plus a separating space.
        let header = format!("Reminder: {}", "x".repeat(30));
        assert_eq!(header.chars().count(), 40);

        let ids: Vec<String> = (0..210)
            .map(|i| format!("{:018}", 100_000_000_000_000_000u64 + i))
            .collect();
        let mentions: Vec<String> = ids.iter().map(|id| format!("<@{}>", id)).collect();

        let chunks = chunk_mentions(&header, &mentions);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= MAX_MESSAGE_CODEPOINTS);
        }
        assert!(chunks[1].starts_with(&format!("{} (cont.)", header)));

        // Concatenated mention tokens reproduce the opt-in order exactly.
        assert_eq!(extract_mentions(&chunks), mentions);
    }

    #[test]
    fn oversized_mention_gets_its_own_chunk() {
        // One mention too large to share a chunk with its header.
        let huge_id = "9".repeat(1990);
        let mentions = mentions_for(&["1", &huge_id, "2"]);
        let chunks = chunk_mentions("Reminder: stress", &mentions);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], format!("<@{}>", huge_id));
        for chunk in &chunks {
            assert!(chunk.chars().count() <= MAX_MESSAGE_CODEPOINTS);
        }
        assert_eq!(extract_mentions(&chunks), mentions);
    }

    #[test]
    fn template_placeholder_positions_mentions() {
        let mentions = mentions_for(&["1", "2"]);
        let chunks = chunk_mentions("Hey {mentions}, game time!", &mentions);
        assert_eq!(chunks, vec!["Hey <@1> <@2>, game time!"]);
    }

    #[test]
    fn continuation_marker_lands_on_first_line_of_multiline_header() {
        let header = "Title line\nsecond line";
        assert_eq!(with_continuation(header), "Title line (cont.)\nsecond line");
    }

    #[tokio::test]
    async fn build_renders_default_header_and_counts_recipients() {
        let (store, _db) = temp_store().await;
        let campaign = store
            .create_campaign(Some("Game night"), "1", "2", "✅", Utc::now())
            .await
            .unwrap();
        store.upsert_optin(campaign.id, "11", None).await.unwrap();
        store.upsert_optin(campaign.id, "22", None).await.unwrap();

        let built = build_reminder(&store, campaign.id, None).await.unwrap();
        assert_eq!(built.recipient_count, 2);
        assert_eq!(built.chunks, vec!["Reminder: Game night\n<@11> <@22>"]);
    }

    #[tokio::test]
    async fn build_with_template_variables() {
        let (store, _db) = temp_store().await;
        let campaign = store
            .create_campaign(Some("Raid"), "1", "2", "✅", Utc::now())
            .await
            .unwrap();
        store.upsert_optin(campaign.id, "11", None).await.unwrap();

        let built = build_reminder(
            &store,
            campaign.id,
            Some("{title} starts now ({total_optins} signed up): {mentions}"),
        )
        .await
        .unwrap();
        assert_eq!(built.chunks, vec!["Raid starts now (1 signed up): <@11>"]);
    }

    #[tokio::test]
    async fn build_with_no_optins_yields_no_chunks() {
        let (store, _db) = temp_store().await;
        let campaign = store
            .create_campaign(None, "1", "2", "✅", Utc::now())
            .await
            .unwrap();

        let built = build_reminder(&store, campaign.id, None).await.unwrap();
        assert!(built.chunks.is_empty());
        assert_eq!(built.recipient_count, 0);
    }

    #[tokio::test]
    async fn untitled_campaign_falls_back_to_id() {
        let (store, _db) = temp_store().await;
        let campaign = store
            .create_campaign(None, "1", "2", "✅", Utc::now())
            .await
            .unwrap();
        store.upsert_optin(campaign.id, "11", None).await.unwrap();

        let built = build_reminder(&store, campaign.id, None).await.unwrap();
        assert_eq!(
            built.chunks[0],
            format!("Reminder: Campaign {}\n<@11>", campaign.id)
        );
    }
}
