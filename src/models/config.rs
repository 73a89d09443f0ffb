//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
///
/// Built once at process start and shared read-only (usually behind an
/// `Arc`) by every component of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Calendar-root link scoring weights and keywords
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// LibCal adapter settings
    #[serde(default)]
    pub libcal: LibCalConfig,

    /// LibraryCalendar (Drupal) adapter settings
    #[serde(default)]
    pub librarycalendar: LibraryCalendarConfig,

    /// WordPress Events Calendar adapter settings
    #[serde(default)]
    pub wordpress: WordPressConfig,

    /// Generic HTML fallback settings
    #[serde(default)]
    pub generic: GenericConfig,

    /// Real-HTML heuristic and optional renderer
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Optional external classifier
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Output artifact names
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.reachability_timeout_secs == 0 {
            return Err(AppError::validation(
                "crawler.reachability_timeout_secs must be > 0",
            ));
        }
        if self.crawler.max_links == 0 {
            return Err(AppError::validation("crawler.max_links must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.libcal.per_page == 0 || self.libcal.max_pages == 0 {
            return Err(AppError::validation(
                "libcal.per_page and libcal.max_pages must be > 0",
            ));
        }
        if self.wordpress.per_page == 0 || self.wordpress.max_pages == 0 {
            return Err(AppError::validation(
                "wordpress.per_page and wordpress.max_pages must be > 0",
            ));
        }
        if self.librarycalendar.feed_pattern.is_empty()
            || self.librarycalendar.event_pattern.is_empty()
        {
            return Err(AppError::validation(
                "librarycalendar feed and event patterns must not be empty",
            ));
        }
        if self.scoring.text_keywords.is_empty() && self.scoring.url_keywords.is_empty() {
            return Err(AppError::validation("No scoring keywords defined"));
        }
        if let Some(command) = &self.renderer.command {
            if command.is_empty() {
                return Err(AppError::validation("renderer.command must name a program"));
            }
        }
        Ok(())
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Accept header for HTTP requests
    #[serde(default = "defaults::accept")]
    pub accept: String,

    /// Accept-Language header for HTTP requests
    #[serde(default = "defaults::accept_language")]
    pub accept_language: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Longer timeout for library homepages
    #[serde(default = "defaults::homepage_timeout")]
    pub homepage_timeout_secs: u64,

    /// Timeout for reachability probes
    #[serde(default = "defaults::reachability_timeout")]
    pub reachability_timeout_secs: u64,

    /// Pause between libraries in milliseconds
    #[serde(default = "defaults::library_delay")]
    pub library_delay_ms: u64,

    /// Minimum gap between two requests to the same host, in milliseconds
    #[serde(default = "defaults::host_delay")]
    pub host_delay_ms: u64,

    /// Maximum anchors kept from a homepage
    #[serde(default = "defaults::max_links")]
    pub max_links: usize,

    /// Maximum host shards processed at once (1 = strictly sequential)
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn homepage_timeout(&self) -> Duration {
        Duration::from_secs(self.homepage_timeout_secs)
    }

    pub fn reachability_timeout(&self) -> Duration {
        Duration::from_secs(self.reachability_timeout_secs)
    }

    pub fn library_delay(&self) -> Duration {
        Duration::from_millis(self.library_delay_ms)
    }

    pub fn host_delay(&self) -> Duration {
        Duration::from_millis(self.host_delay_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            accept: defaults::accept(),
            accept_language: defaults::accept_language(),
            timeout_secs: defaults::timeout(),
            homepage_timeout_secs: defaults::homepage_timeout(),
            reachability_timeout_secs: defaults::reachability_timeout(),
            library_delay_ms: defaults::library_delay(),
            host_delay_ms: defaults::host_delay(),
            max_links: defaults::max_links(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Weights and keyword lists for calendar-root scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight when the anchor text carries a calendar-intent keyword
    #[serde(default = "defaults::text_keyword_weight")]
    pub text_keyword_weight: u32,

    /// Weight when the resolved URL carries a calendar-intent substring
    #[serde(default = "defaults::url_keyword_weight")]
    pub url_keyword_weight: u32,

    /// Weight when the anchor is styled as a button / call to action
    #[serde(default = "defaults::button_weight")]
    pub button_weight: u32,

    /// Weight when the URL matches a known calendar platform
    #[serde(default = "defaults::platform_weight")]
    pub platform_weight: u32,

    #[serde(default = "defaults::text_keywords")]
    pub text_keywords: Vec<String>,

    #[serde(default = "defaults::url_keywords")]
    pub url_keywords: Vec<String>,

    #[serde(default = "defaults::button_classes")]
    pub button_classes: Vec<String>,

    #[serde(default = "defaults::platform_signatures")]
    pub platform_signatures: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            text_keyword_weight: defaults::text_keyword_weight(),
            url_keyword_weight: defaults::url_keyword_weight(),
            button_weight: defaults::button_weight(),
            platform_weight: defaults::platform_weight(),
            text_keywords: defaults::text_keywords(),
            url_keywords: defaults::url_keywords(),
            button_classes: defaults::button_classes(),
            platform_signatures: defaults::platform_signatures(),
        }
    }
}

/// LibCal (Springshare) adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibCalConfig {
    /// JSON list endpoint path on the calendar host
    #[serde(default = "defaults::libcal_list_path")]
    pub list_path: String,

    #[serde(default = "defaults::libcal_per_page")]
    pub per_page: u32,

    #[serde(default = "defaults::libcal_max_pages")]
    pub max_pages: u32,

    /// Pause between list pages in milliseconds
    #[serde(default = "defaults::libcal_page_delay")]
    pub page_delay_ms: u64,
}

impl LibCalConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

impl Default for LibCalConfig {
    fn default() -> Self {
        Self {
            list_path: defaults::libcal_list_path(),
            per_page: defaults::libcal_per_page(),
            max_pages: defaults::libcal_max_pages(),
            page_delay_ms: defaults::libcal_page_delay(),
        }
    }
}

/// LibraryCalendar (Drupal/Communico) adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryCalendarConfig {
    /// Substring identifying daily feed links
    #[serde(default = "defaults::lc_feed_pattern")]
    pub feed_pattern: String,

    /// Substring identifying event detail links
    #[serde(default = "defaults::lc_event_pattern")]
    pub event_pattern: String,

    /// Views tried when the root page carries no feed links
    #[serde(default = "defaults::lc_alternate_paths")]
    pub alternate_paths: Vec<String>,

    #[serde(default = "defaults::lc_max_feeds")]
    pub max_feeds: usize,

    #[serde(default = "defaults::lc_feed_delay")]
    pub feed_delay_ms: u64,

    #[serde(default = "defaults::lc_detail_delay")]
    pub detail_delay_ms: u64,
}

impl LibraryCalendarConfig {
    pub fn feed_delay(&self) -> Duration {
        Duration::from_millis(self.feed_delay_ms)
    }

    pub fn detail_delay(&self) -> Duration {
        Duration::from_millis(self.detail_delay_ms)
    }
}

impl Default for LibraryCalendarConfig {
    fn default() -> Self {
        Self {
            feed_pattern: defaults::lc_feed_pattern(),
            event_pattern: defaults::lc_event_pattern(),
            alternate_paths: defaults::lc_alternate_paths(),
            max_feeds: defaults::lc_max_feeds(),
            feed_delay_ms: defaults::lc_feed_delay(),
            detail_delay_ms: defaults::lc_detail_delay(),
        }
    }
}

/// WordPress "The Events Calendar" adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordPressConfig {
    /// REST path of the events collection
    #[serde(default = "defaults::tec_api_path")]
    pub api_path: String,

    #[serde(default = "defaults::tec_per_page")]
    pub per_page: u32,

    #[serde(default = "defaults::tec_max_pages")]
    pub max_pages: u32,

    #[serde(default = "defaults::tec_page_delay")]
    pub page_delay_ms: u64,
}

impl WordPressConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

impl Default for WordPressConfig {
    fn default() -> Self {
        Self {
            api_path: defaults::tec_api_path(),
            per_page: defaults::tec_per_page(),
            max_pages: defaults::tec_max_pages(),
            page_delay_ms: defaults::tec_page_delay(),
        }
    }
}

/// Generic HTML fallback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericConfig {
    /// Minimum visible anchor text length (in characters)
    #[serde(default = "defaults::generic_min_text_len")]
    pub min_text_len: usize,

    /// Titles are truncated to this many characters
    #[serde(default = "defaults::generic_max_title_len")]
    pub max_title_len: usize,

    #[serde(default = "defaults::generic_max_events")]
    pub max_events: usize,

    /// Program/event intent keywords matched against anchor text
    #[serde(default = "defaults::generic_keywords")]
    pub keywords: Vec<String>,

    /// URL substrings marking feed/export endpoints
    #[serde(default = "defaults::generic_excluded_markers")]
    pub excluded_url_markers: Vec<String>,
}

impl Default for GenericConfig {
    fn default() -> Self {
        Self {
            min_text_len: defaults::generic_min_text_len(),
            max_title_len: defaults::generic_max_title_len(),
            max_events: defaults::generic_max_events(),
            keywords: defaults::generic_keywords(),
            excluded_url_markers: defaults::generic_excluded_markers(),
        }
    }
}

/// Settings for the "looks like real HTML" predicate and the optional renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Bodies shorter than this (in bytes) are treated as non-pages
    #[serde(default = "defaults::min_body_len")]
    pub min_body_len: usize,

    /// Lower-case markers of bot challenges or script-only shells
    #[serde(default = "defaults::blocked_markers")]
    pub blocked_markers: Vec<String>,

    /// Program and arguments of an external renderer; the URL is appended
    #[serde(default)]
    pub command: Option<Vec<String>>,

    #[serde(default = "defaults::render_timeout")]
    pub timeout_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            min_body_len: defaults::min_body_len(),
            blocked_markers: defaults::blocked_markers(),
            command: None,
            timeout_secs: defaults::render_timeout(),
        }
    }
}

/// Optional external classifier endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// HTTP endpoint receiving the candidate links; disabled when absent
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Name of the environment variable holding the bearer token
    #[serde(default = "defaults::classifier_key_env")]
    pub api_key_env: String,

    #[serde(default = "defaults::classifier_max_candidates")]
    pub max_candidates: usize,

    #[serde(default = "defaults::classifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: defaults::classifier_key_env(),
            max_candidates: defaults::classifier_max_candidates(),
            timeout_secs: defaults::classifier_timeout(),
        }
    }
}

/// Output artifact names, relative to the output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "defaults::library_dir")]
    pub library_dir: String,

    #[serde(default = "defaults::events_file")]
    pub events_file: String,

    #[serde(default = "defaults::failures_file")]
    pub failures_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            library_dir: defaults::library_dir(),
            events_file: defaults::events_file(),
            failures_file: defaults::failures_file(),
        }
    }
}

mod defaults {
    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36"
            .into()
    }
    pub fn accept() -> String {
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into()
    }
    pub fn accept_language() -> String {
        "en-US,en;q=0.9".into()
    }
    pub fn timeout() -> u64 {
        20
    }
    pub fn homepage_timeout() -> u64 {
        30
    }
    pub fn reachability_timeout() -> u64 {
        15
    }
    pub fn library_delay() -> u64 {
        3000
    }
    pub fn host_delay() -> u64 {
        150
    }
    pub fn max_links() -> usize {
        200
    }
    pub fn max_concurrent() -> usize {
        1
    }

    // Scoring defaults
    pub fn text_keyword_weight() -> u32 {
        4
    }
    pub fn url_keyword_weight() -> u32 {
        3
    }
    pub fn button_weight() -> u32 {
        2
    }
    pub fn platform_weight() -> u32 {
        5
    }
    pub fn text_keywords() -> Vec<String> {
        strings(&[
            "event", "events", "calendar", "program", "programs", "upcoming", "youth",
            "children", "kids", "kid",
        ])
    }
    pub fn url_keywords() -> Vec<String> {
        strings(&["calendar", "events", "libcal"])
    }
    pub fn button_classes() -> Vec<String> {
        strings(&["button", "btn", "cta"])
    }
    pub fn platform_signatures() -> Vec<String> {
        strings(&["libcal.com", "librarycalendar.com", "calendar."])
    }

    // LibCal defaults
    pub fn libcal_list_path() -> String {
        "/ajax/calendar/list".into()
    }
    pub fn libcal_per_page() -> u32 {
        50
    }
    pub fn libcal_max_pages() -> u32 {
        200
    }
    pub fn libcal_page_delay() -> u64 {
        250
    }

    // LibraryCalendar defaults
    pub fn lc_feed_pattern() -> String {
        "/events/feed/html".into()
    }
    pub fn lc_event_pattern() -> String {
        "/event/".into()
    }
    pub fn lc_alternate_paths() -> Vec<String> {
        strings(&["/events/month", "/events/upcoming", "/events/list"])
    }
    pub fn lc_max_feeds() -> usize {
        90
    }
    pub fn lc_feed_delay() -> u64 {
        200
    }
    pub fn lc_detail_delay() -> u64 {
        150
    }

    // WordPress TEC defaults
    pub fn tec_api_path() -> String {
        "/wp-json/tribe/events/v1/events".into()
    }
    pub fn tec_per_page() -> u32 {
        50
    }
    pub fn tec_max_pages() -> u32 {
        10
    }
    pub fn tec_page_delay() -> u64 {
        200
    }

    // Generic HTML defaults
    pub fn generic_min_text_len() -> usize {
        6
    }
    pub fn generic_max_title_len() -> usize {
        140
    }
    pub fn generic_max_events() -> usize {
        200
    }
    pub fn generic_keywords() -> Vec<String> {
        strings(&["event", "events", "program", "story", "workshop", "calendar"])
    }
    pub fn generic_excluded_markers() -> Vec<String> {
        strings(&["feed", "rss", "ical", "export"])
    }

    // Renderer defaults
    pub fn min_body_len() -> usize {
        800
    }
    pub fn blocked_markers() -> Vec<String> {
        strings(&[
            "cf-browser-verification",
            "checking your browser",
            "enable javascript",
            "please wait",
            "bot detection",
            "__cf_chl",
        ])
    }
    pub fn render_timeout() -> u64 {
        30
    }

    // Classifier defaults
    pub fn classifier_key_env() -> String {
        "CLASSIFIER_API_KEY".into()
    }
    pub fn classifier_max_candidates() -> usize {
        120
    }
    pub fn classifier_timeout() -> u64 {
        60
    }

    // Output defaults
    pub fn library_dir() -> String {
        "events_by_library".into()
    }
    pub fn events_file() -> String {
        "events_all.json".into()
    }
    pub fn failures_file() -> String {
        "events_failed.json".into()
    }
}
