// src/services/scorer.rs

//! Calendar-root scoring of homepage links.
//!
//! Scores are additive over independent signals, each worth a configured
//! weight. Links scoring zero are never candidates.

use crate::models::{CandidateLink, PageLink, ScoreReason, ScoringConfig};

/// Ranks homepage anchors by how likely they lead to the events calendar.
#[derive(Debug, Clone)]
pub struct CalendarScorer {
    text_keywords: Vec<String>,
    url_keywords: Vec<String>,
    button_classes: Vec<String>,
    platform_signatures: Vec<String>,
    weights: Weights,
}

#[derive(Debug, Clone, Copy)]
struct Weights {
    text: u32,
    url: u32,
    button: u32,
    platform: u32,
}

fn lowered(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

impl CalendarScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            text_keywords: lowered(&config.text_keywords),
            url_keywords: lowered(&config.url_keywords),
            button_classes: lowered(&config.button_classes),
            platform_signatures: lowered(&config.platform_signatures),
            weights: Weights {
                text: config.text_keyword_weight,
                url: config.url_keyword_weight,
                button: config.button_weight,
                platform: config.platform_weight,
            },
        }
    }

    /// Score one link, returning the total and the signals that fired.
    pub fn score(&self, link: &PageLink) -> (u32, Vec<ScoreReason>) {
        let text = link.text.trim().to_lowercase();
        let url = link.url.to_lowercase();
        let class = link.class.to_lowercase();

        let signals = [
            (
                self.text_keywords.iter().any(|k| text.contains(k.as_str())),
                self.weights.text,
                ScoreReason::KeywordInText,
            ),
            (
                self.url_keywords.iter().any(|k| url.contains(k.as_str())),
                self.weights.url,
                ScoreReason::KeywordInUrl,
            ),
            (
                self.button_classes.iter().any(|c| class.contains(c.as_str())),
                self.weights.button,
                ScoreReason::ButtonStyle,
            ),
            (
                self.matches_platform(&link.url),
                self.weights.platform,
                ScoreReason::CalendarPlatform,
            ),
        ];

        signals
            .into_iter()
            .filter(|(fired, _, _)| *fired)
            .fold((0, Vec::new()), |(total, mut reasons), (_, weight, reason)| {
                reasons.push(reason);
                (total + weight, reasons)
            })
    }

    /// Whether the URL's host or path carries a known calendar platform signature.
    fn matches_platform(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        let host = parsed.host_str().unwrap_or_default().to_lowercase();
        let path = parsed.path().to_lowercase();
        self.platform_signatures
            .iter()
            .any(|sig| host.contains(sig.as_str()) || path.contains(sig.as_str()))
    }

    /// Candidates with a positive score, best first.
    ///
    /// The sort is stable, so equal scores keep document order.
    pub fn score_candidates(&self, links: &[PageLink]) -> Vec<CandidateLink> {
        let mut candidates: Vec<CandidateLink> = links
            .iter()
            .filter_map(|link| {
                let (score, reasons) = self.score(link);
                (score > 0).then(|| CandidateLink {
                    text: link.text.clone(),
                    url: link.url.clone(),
                    score,
                    reasons,
                })
            })
            .collect();
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates
    }

    /// URL of the top candidate, or `None` when no link scores above zero.
    pub fn best(&self, links: &[PageLink]) -> Option<String> {
        self.score_candidates(links)
            .into_iter()
            .next()
            .map(|c| c.url)
    }
}

impl Default for CalendarScorer {
    fn default() -> Self {
        Self::new(&ScoringConfig::default())
    }
}
