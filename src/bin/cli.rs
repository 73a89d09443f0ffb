//! Library events CLI
//!
//! Batch entry point plus single-library helpers for discovery and scraping.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use library_events::{
    error::{AppError, Result},
    models::{Config, Library, Platform},
    pipeline::{self, LibraryProcessor},
    services::{CalendarScorer, Extractor, HttpClassifier, PlatformClassifier, extract_links, normalize},
    storage::LocalStorage,
    utils::{
        get_domain,
        http::{HostThrottle, HttpFetcher, PageFetcher, PageMemo},
        render::{CommandRenderer, PageRenderer, fetch_rendered},
    },
};

/// Library events - calendar discovery and event extraction
#[derive(Parser, Debug)]
#[command(
    name = "library-events",
    version,
    about = "Discovers library event calendars and extracts normalized events"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every library of a roster
    Run {
        /// JSON array of libraries (name, website, lat, lon, address parts)
        #[arg(long, default_value = "libraries.json")]
        roster: PathBuf,

        /// Output directory for checkpoints and aggregate files
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },

    /// Rank calendar candidates on a homepage and classify the best one
    Discover {
        /// Library homepage URL
        homepage: String,
    },

    /// Extract events from a calendar root and print them as JSON
    Scrape {
        /// Calendar root URL
        url: String,

        /// Platform tag (libcal, librarycalendar, wordpress_tec, ...); fallback chain when omitted
        #[arg(long)]
        platform: Option<String>,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn build_fetcher(config: &Config) -> Result<Arc<HttpFetcher>> {
    Ok(Arc::new(HttpFetcher::new(&config.crawler)?))
}

/// Throttled, memoized view of `fetcher` for single-library commands.
fn polite(config: &Config, fetcher: Arc<HttpFetcher>) -> Arc<dyn PageFetcher> {
    let throttle = HostThrottle::new(fetcher, config.crawler.host_delay());
    Arc::new(PageMemo::new(Arc::new(throttle)))
}

fn build_renderer(config: &Config) -> Option<Arc<dyn PageRenderer>> {
    CommandRenderer::from_config(&config.renderer).map(|r| Arc::new(r) as Arc<dyn PageRenderer>)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    log::debug!("Configuration from {}", cli.config.display());
    let config = Arc::new(config);

    match cli.command {
        Command::Run { roster, output } => {
            config.validate()?;
            let libraries = Library::load_all(&roster)?;
            log::info!("Loaded {} libraries from {}", libraries.len(), roster.display());

            let fetcher = build_fetcher(&config)?;
            let storage = Arc::new(LocalStorage::with_layout(&output, config.output.clone()));
            let mut processor =
                LibraryProcessor::new(Arc::clone(&config), fetcher.clone(), storage);
            if let Some(renderer) = build_renderer(&config) {
                processor = processor.with_renderer(renderer);
            }
            if let Some(external) =
                HttpClassifier::from_config(fetcher.client().clone(), &config.classifier)
            {
                processor = processor.with_external_classifier(Arc::new(external));
            }

            let (_, summary) = pipeline::run_pipeline(&processor, &libraries).await?;
            log::info!(
                "{} events from {} libraries ({} failed), written to {}",
                summary.events,
                summary.libraries,
                summary.failed,
                output.display()
            );
        }

        Command::Discover { homepage } => {
            let http = build_fetcher(&config)?;
            let fetcher = polite(&config, http.clone());
            let renderer = build_renderer(&config);
            let page = fetch_rendered(
                fetcher.as_ref(),
                renderer.as_deref(),
                &homepage,
                config.crawler.homepage_timeout(),
                &config.renderer,
            )
            .await?;
            if !page.is_success() {
                return Err(AppError::status(&homepage, page.status));
            }

            let links = extract_links(page.text(), &page.final_url, config.crawler.max_links)?;
            let candidates = CalendarScorer::new(&config.scoring).score_candidates(&links);
            let mut classifier = PlatformClassifier::new(Arc::clone(&config), fetcher);
            if let Some(external) =
                HttpClassifier::from_config(http.client().clone(), &config.classifier)
            {
                classifier = classifier.with_external(Arc::new(external));
            }
            let name = get_domain(&homepage).unwrap_or_else(|| homepage.clone());
            let decision = classifier.decide(&name, &homepage, &candidates).await;

            let report = serde_json::json!({
                "homepage": homepage,
                "candidates": candidates,
                "decision": decision,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Scrape { url, platform } => {
            let platform = match platform {
                Some(tag) => tag.parse::<Platform>().map_err(AppError::validation)?,
                None => Platform::Unknown,
            };
            let fetcher = polite(&config, build_fetcher(&config)?);
            let extractor = Extractor::new(Arc::clone(&config), fetcher);

            let extraction = extractor
                .extract(platform, &url)
                .await
                .map_err(|failure| failure.error)?;
            let name = get_domain(&url).unwrap_or_else(|| url.clone());
            let events: Vec<_> = extraction
                .events
                .iter()
                .filter(|raw| raw.has_usable_fields())
                .map(|raw| normalize(raw, &name, None))
                .collect();
            log::info!(
                "{} events via {}",
                events.len(),
                extraction.adapter.map(|a| a.as_str()).unwrap_or("no adapter")
            );
            println!("{}", serde_json::to_string_pretty(&events)?);
        }

        Command::Validate => {
            log::info!("Validating {}...", cli.config.display());
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
        }
    }

    Ok(())
}
