// src/services/adapters/generic.rs

//! Lowest-confidence fallback: program-like anchors on the calendar page.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::EventAdapter;
use crate::error::Result;
use crate::models::{Config, GenericConfig, GenericLink, PageLink, RawEvent};
use crate::services::links::extract_links;
use crate::utils::http::PageFetcher;

/// Keep anchors that read like an event or program listing.
pub fn select_program_links(links: &[PageLink], settings: &GenericConfig) -> Vec<GenericLink> {
    links
        .iter()
        .filter(|link| link.text.chars().count() >= settings.min_text_len)
        .filter(|link| {
            let url = link.url.to_lowercase();
            !settings
                .excluded_url_markers
                .iter()
                .any(|marker| url.contains(marker.as_str()))
        })
        .filter(|link| {
            let text = link.text.to_lowercase();
            settings
                .keywords
                .iter()
                .any(|keyword| text.contains(keyword.as_str()))
        })
        .take(settings.max_events)
        .map(|link| GenericLink {
            title: link.text.chars().take(settings.max_title_len).collect(),
            url: link.url.clone(),
        })
        .collect()
}

/// Scans the calendar root for program-like anchors.
pub struct GenericHtmlAdapter {
    config: Arc<Config>,
    fetcher: Arc<dyn PageFetcher>,
}

impl GenericHtmlAdapter {
    pub fn new(config: Arc<Config>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { config, fetcher }
    }
}

#[async_trait]
impl EventAdapter for GenericHtmlAdapter {
    async fn extract(&self, calendar_root: &str) -> Result<Vec<RawEvent>> {
        let page = self
            .fetcher
            .fetch(calendar_root, self.config.crawler.timeout())
            .await?;
        if page.status >= 400 {
            log::debug!("Generic scan of {} skipped (HTTP {})", calendar_root, page.status);
            return Ok(Vec::new());
        }

        let base = Url::parse(&page.final_url).or_else(|_| Url::parse(calendar_root))?;
        let links = extract_links(page.text(), base.as_str(), usize::MAX)?;
        Ok(select_program_links(&links, &self.config.generic)
            .into_iter()
            .map(RawEvent::Generic)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http::ScriptedFetcher;

    const PAGE: &str = r#"<html><body>
        <a href="/events/story-time-jan">Preschool Story Time</a>
        <a href="/events/feed/rss">Events RSS</a>
        <a href="/calendar?ical=1">Export calendar</a>
        <a href="/programs">Event</a>
        <a href="/hours">Opening hours</a>
        <a href="/workshops/resume">Resume Workshop: build a CV that lands interviews in today's market, with one-on-one help from our career librarians and plenty of time for questions about cover letters and applications</a>
    </body></html>"#;

    #[test]
    fn test_select_program_links() {
        let links = extract_links(PAGE, "https://lib.org/", 200).unwrap();
        let selected = select_program_links(&links, &GenericConfig::default());

        let urls: Vec<_> = selected.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://lib.org/events/story-time-jan",
                "https://lib.org/workshops/resume",
            ]
        );
        assert_eq!(selected[0].title, "Preschool Story Time");
        assert_eq!(selected[1].title.chars().count(), 140);
    }

    #[test]
    fn test_max_events_caps_output() {
        let links: Vec<PageLink> = (0..10)
            .map(|i| PageLink {
                text: format!("Story time #{i}"),
                url: format!("https://lib.org/e/{i}"),
                class: String::new(),
            })
            .collect();
        let settings = GenericConfig {
            max_events: 3,
            ..GenericConfig::default()
        };
        assert_eq!(select_program_links(&links, &settings).len(), 3);
    }

    #[tokio::test]
    async fn test_missing_page_yields_nothing() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let adapter = GenericHtmlAdapter::new(Arc::new(Config::default()), fetcher);
        assert!(adapter.extract("https://lib.org/events").await.unwrap().is_empty());
    }
}
