// src/ingest/ladder.rs
//! URL quality ladder: rewrite a thumbnail URL into progressively better
//! candidates, raw URL last.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LadderRules {
    /// Size token marking a low-resolution URL.
    pub low_res_token: String,
    /// Replacement tokens, best first.
    pub upgrades: Vec<String>,
    /// Tokens that mark non-content images (avatars, icons).
    pub blocked_tokens: Vec<String>,
}

impl Default for LadderRules {
    fn default() -> Self {
        Self {
            low_res_token: "/236x/".into(),
            upgrades: vec!["/originals/".into(), "/564x/".into()],
            blocked_tokens: vec!["/75x75/".into(), "/60x60/".into()],
        }
    }
}

impl LadderRules {
    pub fn is_non_content(&self, url: &str) -> bool {
        self.blocked_tokens
            .iter()
            .any(|t| !t.is_empty() && url.contains(t.as_str()))
    }

    pub fn candidates(&self, raw: &str) -> CandidateUrlSet {
        let mut urls = Vec::with_capacity(self.upgrades.len() + 1);
        if !self.low_res_token.is_empty() && raw.contains(self.low_res_token.as_str()) {
            for up in &self.upgrades {
                let u = raw.replacen(self.low_res_token.as_str(), up, 1);
                if !urls.contains(&u) && u != raw {
                    urls.push(u);
                }
            }
        }
        urls.push(raw.to_string());
        CandidateUrlSet { urls }
    }
}

/// Ordered rewrites for one raw reference. Never empty; the raw URL is last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateUrlSet {
    urls: Vec<String>,
}

impl CandidateUrlSet {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn raw(&self) -> &str {
        self.urls.last().map(String::as_str).unwrap_or_default()
    }
}
