// src/utils/render.rs

//! Detection of non-pages and the optional script-executing renderer.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{AppError, Result};
use crate::models::RendererConfig;
use crate::utils::http::{FetchedPage, PageFetcher};

/// Whether a fetched body looks like a real, rendered HTML page.
///
/// False for a missing or short body, and for bot-challenge or
/// script-required shells.
pub fn looks_like_real_html(body: Option<&str>, config: &RendererConfig) -> bool {
    let Some(body) = body else {
        return false;
    };
    if body.len() < config.min_body_len {
        return false;
    }
    let lower = body.to_lowercase();
    !config
        .blocked_markers
        .iter()
        .any(|marker| lower.contains(&marker.to_lowercase()))
}

/// Produces HTML for a URL after executing its scripts.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String>;
}

/// Renderer that shells out to an external program.
///
/// The URL is appended as the last argument; rendered HTML is read from stdout.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    /// Build from `renderer.command`; `None` when no command is configured.
    pub fn from_config(config: &RendererConfig) -> Option<Self> {
        let (program, args) = config.command.as_ref()?.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl PageRenderer for CommandRenderer {
    async fn render(&self, url: &str) -> Result<String> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                AppError::Render(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Render(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// GET `url`, falling back to the renderer when the static body is not a real page.
///
/// A renderer failure keeps the static response.
pub async fn fetch_rendered(
    fetcher: &dyn PageFetcher,
    renderer: Option<&dyn PageRenderer>,
    url: &str,
    timeout: Duration,
    config: &RendererConfig,
) -> Result<FetchedPage> {
    let mut page = fetcher.fetch(url, timeout).await?;
    let Some(renderer) = renderer else {
        return Ok(page);
    };
    if !page.is_success() || looks_like_real_html(page.body.as_deref(), config) {
        return Ok(page);
    }

    log::info!("Static body of {} does not look like a page, rendering", url);
    match renderer.render(url).await {
        Ok(html) if !html.trim().is_empty() => page.body = Some(html),
        Ok(_) => log::warn!("Renderer returned nothing for {}", url),
        Err(e) => log::warn!("Rendering {} failed: {}", url, e),
    }
    Ok(page)
}
