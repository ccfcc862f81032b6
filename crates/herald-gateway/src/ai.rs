//! Content suggestions for the compose flow.

use async_trait::async_trait;

const MAX_SUGGESTIONS: usize = 3;
const TAGGED_PREFIX_CHARS: usize = 180;
const SHOUT_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 120;
const DEFAULT_DESCRIPTION: &str = "Document attachment";

/// Produces alternative wordings for a piece of content.
#[async_trait]
pub trait ContentImprover: Send + Sync {
    async fn improve(&self, text: &str) -> Vec<String>;

    /// Short description for an uploaded attachment.
    async fn describe(&self, hint: Option<&str>) -> String;
}

/// Deterministic, offline improver: the original text, a tagged excerpt for
/// long texts, and an upper-cased variant.
pub struct HeuristicImprover;

#[async_trait]
impl ContentImprover for HeuristicImprover {
    async fn improve(&self, text: &str) -> Vec<String> {
        let base = text.trim();
        if base.is_empty() {
            return Vec::new();
        }

        let mut out = vec![base.to_string()];
        if base.chars().count() > TAGGED_PREFIX_CHARS {
            out.push(format!("{} #update", take_chars(base, TAGGED_PREFIX_CHARS)));
        }
        out.push(take_chars(base, SHOUT_CHARS).to_uppercase());

        out.retain(|s| !s.is_empty());
        out.truncate(MAX_SUGGESTIONS);
        out
    }

    async fn describe(&self, hint: Option<&str>) -> String {
        let hint = hint.map(str::trim).unwrap_or_default();
        if hint.is_empty() {
            return DEFAULT_DESCRIPTION.to_string();
        }
        take_chars(hint, MAX_DESCRIPTION_CHARS).to_string()
    }
}

fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn short_text_yields_original_and_upper() {
        let out = HeuristicImprover.improve("  release notes  ").await;
        assert_eq!(out, vec!["release notes", "RELEASE NOTES"]);
    }

    #[tokio::test]
    async fn long_text_gets_tagged_excerpt() {
        let text = "é".repeat(250);
        let out = HeuristicImprover.improve(&text).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], format!("{} #update", "é".repeat(180)));
        assert_eq!(out[2], "É".repeat(200));
    }

    #[tokio::test]
    async fn blank_text_yields_nothing() {
        assert!(HeuristicImprover.improve(" \n ").await.is_empty());
    }

    #[tokio::test]
    async fn description_defaults_and_truncates() {
        assert_eq!(HeuristicImprover.describe(None).await, "Document attachment");
        assert_eq!(HeuristicImprover.describe(Some("  ")).await, "Document attachment");
        assert_eq!(HeuristicImprover.describe(Some(&"x".repeat(300))).await.len(), 120);
    }
}
