// src/ingest/mod.rs
pub mod crawl;
pub mod fetch;
pub mod ladder;
pub mod providers;
pub mod session;
pub mod text;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// Texts are cut to this many characters before analysis.
pub const MAX_TEXT_CHARS: usize = 3000;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("crawl_raw_seen_total", "Raw URLs seen for the first time.");
        describe_counter!(
            "crawl_non_content_total",
            "Raw URLs dropped as avatars/icons."
        );
        describe_counter!(
            "crawl_fetch_failed_total",
            "Assets whose every ladder candidate failed to fetch."
        );
        describe_counter!(
            "crawl_rejected_total",
            "Fetched assets rejected by the relevance gate."
        );
        describe_counter!("crawl_accepted_total", "Assets accepted and stored.");
        describe_counter!("frames_sampled_total", "Video frames read at the sampling interval.");
        describe_counter!(
            "frames_duplicate_total",
            "Sampled frames dropped by histogram correlation."
        );
        describe_counter!("frames_accepted_total", "Frames accepted by the relevance gate.");
        describe_counter!(
            "videos_rejected_total",
            "Videos discarded by the minimum-frames gate."
        );
        describe_counter!("videos_accepted_total", "Videos that passed the frames gate.");
        describe_counter!(
            "evidence_visual_votes_total",
            "Votes added from visual evidence."
        );
        describe_counter!("evidence_text_votes_total", "Votes added from text evidence.");
        describe_counter!("market_queries_total", "Trend oracle queries issued.");
        describe_counter!("market_errors_total", "Trend oracle queries that failed.");
        describe_counter!(
            "pipeline_source_errors_total",
            "Sources that failed to start during a run."
        );
        describe_histogram!("pipeline_run_ms", "Pipeline run time in milliseconds.");
        describe_histogram!("rss_parse_ms", "RSS parse time in milliseconds.");
        describe_gauge!("pipeline_last_run_ts", "Unix ts when the pipeline last finished.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags =
        RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("valid tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize curly quotes and guillemets to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("valid ws regex"));
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Strip trailing sentence punctuation (keep quotes)
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    // 6) Length cap
    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_collapses_ws_and_punct() {
        let s = "  Hello,&nbsp;&nbsp; world!!!  ";
        let out = normalize_text(s);
        assert_eq!(out, "Hello, world");
    }

    #[test]
    fn normalize_text_strips_tags_and_caps() {
        assert_eq!(normalize_text("<p>Velvet <b>is</b> back</p>"), "Velvet is back");
        let long = "a".repeat(MAX_TEXT_CHARS + 50);
        assert_eq!(normalize_text(&long).chars().count(), MAX_TEXT_CHARS);
    }
}
