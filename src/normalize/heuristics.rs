//! Content-sniffing defaults for `max_tokens` and `temperature`.
//!
//! Keyword matching is a plain case-insensitive substring test over all
//! request text. There is no word-boundary or language detection, so the
//! keyword lists are configuration rather than fixed behaviour.

use serde::Deserialize;

use crate::types::{ModelEntry, ModelTrait};

/// Keyword lists and floors for the request heuristics.
///
/// ```toml
/// [heuristics]
/// detail_keywords = ["explain", "in detail"]
/// code_keywords = ["code", "function"]
/// detail_max_tokens = 1500
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeuristicsConfig {
    /// Phrases that ask for a long, detailed answer.
    pub detail_keywords: Vec<String>,
    /// Phrases that ask for code.
    pub code_keywords: Vec<String>,
    /// `max_tokens` floor for detailed answers.
    pub detail_max_tokens: u32,
    /// `max_tokens` floor for code answers.
    pub code_max_tokens: u32,
    /// Temperature used for code answers.
    pub code_temperature: f64,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            detail_keywords: to_strings(&[
                "explique",
                "expliquer",
                "explication",
                "détail",
                "detail",
                "explain",
                "étape par étape",
                "step by step",
                "en profondeur",
                "in depth",
            ]),
            code_keywords: to_strings(&[
                "code",
                "fonction",
                "function",
                "programme",
                "script",
                "python",
                "javascript",
                "rust",
                "sql",
                "algorithme",
                "algorithm",
            ]),
            detail_max_tokens: 1500,
            code_max_tokens: 2000,
            code_temperature: 0.2,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// What the heuristics concluded about one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Assessment {
    pub detailed: bool,
    pub code: bool,
}

impl HeuristicsConfig {
    /// Assess request text for the given model.
    pub fn assess(&self, entry: &ModelEntry, text: &str) -> Assessment {
        let haystack = text.to_lowercase();
        let mentions = |keywords: &[String]| {
            keywords
                .iter()
                .filter(|k| !k.is_empty())
                .any(|k| haystack.contains(&k.to_lowercase()))
        };
        Assessment {
            detailed: mentions(&self.detail_keywords),
            code: entry.has_trait(ModelTrait::Code) || mentions(&self.code_keywords),
        }
    }

    /// Raise a defaulted `max_tokens` to the applicable floors. Never lowers it.
    pub fn max_tokens_floor(&self, assessment: Assessment, current: u32) -> u32 {
        let mut max_tokens = current;
        if assessment.detailed {
            max_tokens = max_tokens.max(self.detail_max_tokens);
        }
        if assessment.code {
            max_tokens = max_tokens.max(self.code_max_tokens);
        }
        max_tokens
    }

    /// Temperature for a request whose caller did not set one.
    pub fn temperature(&self, assessment: Assessment, default: f64) -> f64 {
        if assessment.code {
            self.code_temperature.min(default)
        } else {
            default
        }
    }
}
