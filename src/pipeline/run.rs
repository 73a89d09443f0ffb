// src/pipeline/run.rs

//! Roster-level run: resume, optional host sharding, aggregation.
//!
//! Shards are keyed on the homepage host. Calendar platforms shared by
//! several libraries are kept polite by the processor's host throttle.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{Library, LibraryOutcome, PipelineResult, RunSummary};
use crate::pipeline::library::LibraryProcessor;
use crate::utils::get_domain;
use crate::utils::http::polite_pause;

/// Process every library of `roster` and write the aggregate files.
///
/// Library failures are recorded and never stop the run. Only checkpoint
/// and aggregate I/O errors are returned.
pub async fn run_pipeline(
    processor: &LibraryProcessor,
    roster: &[Library],
) -> Result<(PipelineResult, RunSummary)> {
    let started_at = Utc::now();
    let clock = Instant::now();
    let total = roster.len();
    let concurrency = processor.config().crawler.max_concurrent;
    log::info!("Processing {} libraries", total);

    let outcomes = if concurrency > 1 {
        run_sharded(processor, roster, concurrency).await?
    } else {
        run_shard(processor, roster, &(0..total).collect::<Vec<_>>()).await?
    };

    let mut result = PipelineResult::default();
    for (_, outcome) in outcomes {
        result.record(outcome);
    }

    let written = processor
        .storage()
        .write_aggregate(&result.events, &result.failures)
        .await?;

    let summary = RunSummary {
        libraries: total,
        processed: result.processed,
        skipped: result.skipped,
        failed: written.failure_count,
        events: written.event_count,
        started_at,
        finished_at: written.timestamp,
    };
    log::info!(
        "Done in {:.1}s: {} events, {} processed, {} skipped, {} failed",
        clock.elapsed().as_secs_f64(),
        summary.events,
        summary.processed,
        summary.skipped,
        summary.failed
    );

    Ok((result, summary))
}

/// Group roster indices by homepage host, keeping roster order within and across shards.
fn shard_by_host(roster: &[Library]) -> Vec<Vec<usize>> {
    let mut order: Vec<String> = Vec::new();
    let mut shards: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, library) in roster.iter().enumerate() {
        let host = library
            .homepage()
            .and_then(get_domain)
            .unwrap_or_default();
        shards
            .entry(host.clone())
            .or_insert_with(|| {
                order.push(host);
                Vec::new()
            })
            .push(index);
    }
    order
        .into_iter()
        .filter_map(|host| shards.remove(&host))
        .collect()
}

/// Run host shards concurrently; the result is restored to roster order.
async fn run_sharded(
    processor: &LibraryProcessor,
    roster: &[Library],
    concurrency: usize,
) -> Result<Vec<(usize, LibraryOutcome)>> {
    let shards = shard_by_host(roster);
    log::info!("{} host shards, {} at a time", shards.len(), concurrency);

    let mut outcomes = Vec::with_capacity(roster.len());
    let mut shard_stream = stream::iter(shards)
        .map(|indices| async move { run_shard(processor, roster, &indices).await })
        .buffer_unordered(concurrency);

    while let Some(shard) = shard_stream.next().await {
        outcomes.extend(shard?);
    }

    outcomes.sort_by_key(|(index, _)| *index);
    Ok(outcomes)
}

/// Process the given roster entries one after another.
async fn run_shard(
    processor: &LibraryProcessor,
    roster: &[Library],
    indices: &[usize],
) -> Result<Vec<(usize, LibraryOutcome)>> {
    let delay = processor.config().crawler.library_delay();
    let mut outcomes = Vec::with_capacity(indices.len());

    for (position, &index) in indices.iter().enumerate() {
        let library = &roster[index];
        log::info!("[{}/{}] {}", index + 1, roster.len(), library.name);

        let outcome = processor.process(library).await?;
        let touched_network = !matches!(outcome, LibraryOutcome::Skipped { .. });
        outcomes.push((index, outcome));

        if touched_network && position + 1 < indices.len() {
            polite_pause(delay).await;
        }
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::models::Config;
    use crate::storage::LocalStorage;
    use crate::utils::http::{FetchedPage, PageFetcher, ScriptedFetcher};

    /// Scripted responses that take `latency` to arrive, tracking how many
    /// requests each host has in flight.
    struct SlowFetcher {
        inner: ScriptedFetcher,
        latency: Duration,
        in_flight: Mutex<HashMap<String, usize>>,
        peak: Mutex<HashMap<String, usize>>,
    }

    impl SlowFetcher {
        fn new(inner: ScriptedFetcher) -> Self {
            Self {
                inner,
                latency: Duration::from_millis(50),
                in_flight: Mutex::new(HashMap::new()),
                peak: Mutex::new(HashMap::new()),
            }
        }

        fn peak(&self, host: &str) -> usize {
            self.peak.lock().unwrap().get(host).copied().unwrap_or(0)
        }

        async fn delayed<T>(&self, url: &str, request: impl Future<Output = Result<T>>) -> Result<T> {
            let host = get_domain(url).unwrap_or_default();
            {
                let mut in_flight = self.in_flight.lock().unwrap();
                let now = in_flight.entry(host.clone()).or_default();
                *now += 1;
                let mut peak = self.peak.lock().unwrap();
                let max = peak.entry(host.clone()).or_default();
                *max = (*max).max(*now);
            }
            tokio::time::sleep(self.latency).await;
            let result = request.await;
            if let Some(now) = self.in_flight.lock().unwrap().get_mut(&host) {
                *now -= 1;
            }
            result
        }
    }

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage> {
            self.delayed(url, self.inner.fetch(url, timeout)).await
        }

        async fn head(&self, url: &str, timeout: Duration) -> Result<u16> {
            self.delayed(url, self.inner.head(url, timeout)).await
        }
    }

    fn quiet_config(max_concurrent: usize) -> Config {
        let mut config = Config::default();
        config.crawler.max_concurrent = max_concurrent;
        config.crawler.library_delay_ms = 0;
        config.crawler.host_delay_ms = 0;
        config.libcal.page_delay_ms = 0;
        config
    }

    #[test]
    fn test_shards_group_by_host_in_roster_order() {
        let roster = vec![
            Library::new("A", Some("https://a.org/")),
            Library::new("B", Some("https://b.org/")),
            Library::new("A2", Some("https://a.org/branch")),
            Library::new("None", None),
            Library::new("B2", Some("http://b.org")),
        ];
        assert_eq!(shard_by_host(&roster), vec![vec![0, 2], vec![1, 4], vec![3]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_branches_sharing_a_calendar_host_take_turns() {
        let list = "https://county.libcal.com/ajax/calendar/list?c=7&date=0000-00-00&perpage=50&page=";
        let homepage = r#"<a href="https://county.libcal.com/calendar">Upcoming Events</a>"#;
        let scripted = ScriptedFetcher::new()
            .page("https://a.org/", 200, homepage)
            .page("https://b.org/", 200, homepage)
            .page(
                "https://county.libcal.com/calendar",
                200,
                "<script>var opts = {baseCalendarId: 7};</script>",
            )
            .page(
                &format!("{list}1"),
                200,
                r#"{"results": [{"title": "Knitting Circle", "url": "https://county.libcal.com/event/9"}]}"#,
            )
            .page(&format!("{list}2"), 200, r#"{"results": []}"#);
        let fetcher = Arc::new(SlowFetcher::new(scripted));
        let dir = TempDir::new().unwrap();
        let processor = LibraryProcessor::new(
            Arc::new(quiet_config(2)),
            fetcher.clone(),
            Arc::new(LocalStorage::new(dir.path())),
        );
        let roster = vec![
            Library::new("A Branch", Some("https://a.org/")),
            Library::new("B Branch", Some("https://b.org/")),
        ];

        let (_, summary) = run_pipeline(&processor, &roster).await.unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.events, 2);
        assert_eq!(fetcher.peak("county.libcal.com"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_libraries_of_a_shard_are_spaced() {
        let mut config = quiet_config(1);
        config.crawler.library_delay_ms = 1_000;
        let fetcher = Arc::new(ScriptedFetcher::new());
        let dir = TempDir::new().unwrap();
        let processor = LibraryProcessor::new(
            Arc::new(config),
            fetcher.clone(),
            Arc::new(LocalStorage::new(dir.path())),
        );
        let roster = vec![
            Library::new("Gone", Some("https://gone.org/")),
            Library::new("Lost", Some("https://lost.org/")),
        ];

        let (_, summary) = run_pipeline(&processor, &roster).await.unwrap();

        assert_eq!(summary.failed, 2);
        let timeline = fetcher.timeline();
        assert_eq!(timeline.len(), 2);
        assert!(timeline[1].0 - timeline[0].0 >= Duration::from_millis(1_000));
    }
}
