// src/services/links.rs

//! Anchor extraction from HTML pages.

use scraper::{Html, Selector};
use url::Url;

use crate::error::Result;
use crate::models::PageLink;
use crate::utils::{collapse_whitespace, parse_selector, resolve_http};

/// Extract up to `cap` anchors from `html`, in document order.
///
/// Hrefs are resolved against `base_url`; anything that does not resolve to
/// an http(s) URL (mailto, tel, javascript, fragments of broken markup) is
/// dropped before the cap is applied.
pub fn extract_links(html: &str, base_url: &str, cap: usize) -> Result<Vec<PageLink>> {
    let base = Url::parse(base_url)?;
    let document = Html::parse_document(html);
    let anchor = parse_selector("a[href]")?;
    Ok(collect_links(&document, &anchor, &base, cap))
}

/// Same as [`extract_links`] over an already parsed document.
fn collect_links(document: &Html, anchor: &Selector, base: &Url, cap: usize) -> Vec<PageLink> {
    document
        .select(anchor)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let url = resolve_http(base, href)?;
            Some(PageLink {
                text: collapse_whitespace(&a.text().collect::<Vec<_>>().join(" ")),
                url,
                class: a.value().attr("class").unwrap_or_default().to_string(),
            })
        })
        .take(cap)
        .collect()
}
