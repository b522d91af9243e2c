use anyhow::{anyhow, Result};
use headless_chrome::protocol::cdp::Page;
use scraper::{Html, Selector};
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::consent::dismiss_consent;
use crate::discovery::card_link;
use crate::fields::{expand_hidden_sections, extract_fields};
use crate::gallery::{collect_card_images, collect_detail_images};
use crate::models::{
    label_for, ExtractionOutcome, HarvestOutcome, ListingDetails, ListingReference, ResultMap,
};
use crate::navigator::{navigate, wait_hidden};
use crate::session::{eval_json, js_literal, BrowserSession};
use crate::utils::error::AppError;

/// Owns the one browser session and the run's ResultMap. Items are processed
/// strictly in sequence on the primary tab; a failing item is recorded and
/// the batch moves on.
pub struct Pipeline {
    config: AppConfig,
    session: BrowserSession,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Result<Self> {
        let session = BrowserSession::open(&config.session)?;
        Ok(Self { config, session })
    }

    pub fn close(self) {
        self.session.close();
    }

    /// Detail extraction over one or many listing URLs. Always yields one
    /// outcome per input, labelled `car1..carN` in input order.
    pub async fn run_details(&self, urls: &[String]) -> ResultMap<ExtractionOutcome> {
        let run_started = Instant::now();
        let mut results = ResultMap::new();
        info!("processing {} listing(s)...", urls.len());

        for (index, url) in urls.iter().enumerate() {
            let reference = ListingReference::new(url.clone(), index);
            let item_started = Instant::now();
            let outcome = self.extract_one(&reference.url).await;
            match &outcome {
                Ok(_) => info!(
                    "{}: ok ({}ms)",
                    reference.label,
                    item_started.elapsed().as_millis()
                ),
                Err(e) => {
                    warn!("{}: error {e:#}", reference.label);
                    self.failure_screenshot(&reference.label);
                }
            }
            record_outcome(&mut results, &reference, outcome);
        }

        self.log_summary(run_started, urls.len());
        results
    }

    async fn extract_one(&self, url: &str) -> Result<ListingDetails> {
        let tab = self.session.tab();
        let nav = &self.config.navigation;
        navigate(tab, url, nav, Some(&nav.detail_ready_selector))?;
        dismiss_consent(tab);
        expand_hidden_sections(tab);

        let html = tab.get_content()?;
        let (record, fields_raw) = extract_fields(&html)?;
        let images = collect_detail_images(tab, &self.config.collector).await?;

        Ok(ListingDetails {
            url: url.to_string(),
            record,
            fields_raw,
            images,
        })
    }

    /// Link collection over the first cards of a search-results page. A card
    /// with no resolvable link records an empty string; the artifact is the
    /// batch input format for `run_details`.
    pub async fn run_links(
        &self,
        search_url: &str,
        limit: Option<usize>,
    ) -> Result<ResultMap<String>> {
        let run_started = Instant::now();
        let disc = &self.config.discovery;
        let tab = self.session.tab();

        let take = self
            .open_search_results(search_url, limit.unwrap_or(disc.links_take))
            .await?;

        // Bring each card into the viewport first; links only hydrate once
        // the card has been rendered.
        for index in 0..take {
            if let Err(e) = crate::gallery::scroll_card_into_view(tab, index, disc) {
                debug!(index, "card scroll failed: {e:#}");
            }
            tokio::time::sleep(Duration::from_millis(disc.hydration_settle_ms)).await;
        }

        let html = tab.get_content()?;
        let base = Url::parse(&tab.get_url()).or_else(|_| Url::parse(search_url))?;
        let selector = Selector::parse(&disc.card_selector)
            .map_err(|e| anyhow!("invalid card selector: {e:?}"))?;
        let document = Html::parse_document(&html);

        let mut results = ResultMap::new();
        for (index, card) in document.select(&selector).take(take).enumerate() {
            let label = label_for(index);
            match card_link(card, &base, disc) {
                Some(href) => {
                    info!("{label}: {href}");
                    results.insert(label, href);
                }
                None => {
                    warn!("{label}: link not found");
                    results.insert(label, String::new());
                }
            }
        }
        // Cards can unrender between counting and parsing; the map still
        // carries one entry per slot.
        while results.len() < take {
            let label = label_for(results.len());
            warn!("{label}: card no longer present");
            results.insert(label, String::new());
        }

        self.log_summary(run_started, take);
        Ok(results)
    }

    /// Card-mode image harvest over the first cards of a search-results
    /// page, with per-card fault isolation.
    pub async fn run_images(
        &self,
        search_url: &str,
        limit: Option<usize>,
    ) -> Result<ResultMap<HarvestOutcome>> {
        let run_started = Instant::now();
        let cfg = &self.config;
        let disc = &cfg.discovery;

        let take = self
            .open_search_results(search_url, limit.unwrap_or(disc.images_take))
            .await?;

        let mut results = ResultMap::new();
        for index in 0..take {
            let label = label_for(index);
            let item_started = Instant::now();
            match collect_card_images(&self.session, index, &cfg.collector, disc, &cfg.navigation)
                .await
            {
                Ok(images) => {
                    info!(
                        "{label}: {} image(s) in {}ms",
                        images.len(),
                        item_started.elapsed().as_millis()
                    );
                    results.insert(label, HarvestOutcome::Images(images));
                }
                Err(e) => {
                    warn!("{label}: error {e:#}");
                    self.failure_screenshot(&label);
                    results.insert(
                        label,
                        HarvestOutcome::Failure {
                            url: search_url.to_string(),
                            error: format!("{e:#}"),
                        },
                    );
                }
            }
        }

        self.log_summary(run_started, take);
        Ok(results)
    }

    /// Navigates to the search page, lets the loading overlay clear, and
    /// waits for result cards. Returns how many cards to process.
    async fn open_search_results(&self, search_url: &str, wanted: usize) -> Result<usize> {
        let cfg = &self.config;
        let disc = &cfg.discovery;
        let tab = self.session.tab();

        let outcome = navigate(tab, search_url, &cfg.navigation, None)?;
        if outcome.anti_bot_suspected {
            debug!("proceeding under anti-bot suspicion");
        }
        wait_hidden(
            tab,
            &disc.loading_indicator_selector,
            Duration::from_millis(cfg.navigation.timeout_ms),
        );
        dismiss_consent(tab);

        tab.wait_for_element_with_custom_timeout(
            &disc.card_selector,
            Duration::from_millis(disc.card_wait_ms),
        )
        .map_err(|_| AppError::ElementNotFound {
            selector: disc.card_selector.clone(),
        })?;

        let available = self.card_count()?;
        let take = wanted.min(available);
        info!("found {available} cards, processing {take}...");
        Ok(take)
    }

    fn card_count(&self) -> Result<usize> {
        let script = format!(
            "document.querySelectorAll({sel}).length",
            sel = js_literal(&self.config.discovery.card_selector)
        );
        let count = eval_json(self.session.tab(), &script)?
            .as_u64()
            .unwrap_or(0);
        Ok(count as usize)
    }

    fn log_summary(&self, run_started: Instant, items: usize) {
        let total_ms = run_started.elapsed().as_millis();
        let denom = items.max(1) as u128;
        info!("total time: {total_ms}ms (~{}ms per item)", total_ms / denom);
    }

    /// Best-effort capture for a failed item; never surfaces as a failure.
    fn failure_screenshot(&self, label: &str) {
        if !self.config.screenshots.enabled {
            return;
        }
        let capture = self.session.tab().capture_screenshot(
            Page::CaptureScreenshotFormatOption::Png,
            None,
            None,
            true,
        );
        let data = match capture {
            Ok(data) => data,
            Err(e) => {
                warn!("screenshot capture failed: {e}");
                return;
            }
        };
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let filename = format!("failure_{}_{}_{}.png", label, timestamp, Uuid::new_v4().simple());
        let path = Path::new(&self.config.screenshots.directory).join(filename);
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match fs::write(&path, data) {
            Ok(_) => debug!(path = %path.display(), "failure screenshot saved"),
            Err(e) => warn!("could not write failure screenshot: {e}"),
        }
    }
}

/// Folds one item's result into the run map: success keeps the details,
/// any error becomes the `{url, error}` record for that label.
pub fn record_outcome(
    results: &mut ResultMap<ExtractionOutcome>,
    reference: &ListingReference,
    outcome: Result<ListingDetails>,
) {
    match outcome {
        Ok(details) => results.insert(reference.label.clone(), ExtractionOutcome::success(details)),
        Err(e) => results.insert(
            reference.label.clone(),
            ExtractionOutcome::failure(reference.url.clone(), format!("{e:#}")),
        ),
    }
}

/// Reads a batch input file: a JSON array of URLs or an object whose values
/// are URLs (keys ignored). Anything else is fatal before any browser work.
pub fn load_references(path: &Path) -> Result<Vec<String>, AppError> {
    let display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|e| AppError::InvalidInput {
        path: display.clone(),
        message: e.to_string(),
    })?;
    let json: Value = serde_json::from_str(&raw).map_err(|e| AppError::InvalidInput {
        path: display.clone(),
        message: format!("not valid JSON: {e}"),
    })?;

    let urls: Vec<String> = match json {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .filter(|url| !url.is_empty())
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(_, value)| value.as_str().map(str::to_string))
            .filter(|url| !url.is_empty())
            .collect(),
        _ => {
            return Err(AppError::InvalidInput {
                path: display,
                message: "expected a JSON array or object of URLs".to_string(),
            })
        }
    };
    Ok(urls)
}

/// Relative input/output paths resolve against the tool's own location, not
/// the caller's working directory.
pub fn resolve_tool_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImageSet, NormalizedRecord, RawFieldDictionary};
    use std::io::Write;

    fn stub_details(url: &str) -> ListingDetails {
        ListingDetails {
            url: url.to_string(),
            record: NormalizedRecord::default(),
            fields_raw: RawFieldDictionary::new(),
            images: ImageSet::new(),
        }
    }

    #[test]
    fn test_batch_completeness_and_label_stability() {
        let urls = ["https://ok1", "https://times-out", "https://ok2"];
        let mut results = ResultMap::new();
        for (index, url) in urls.iter().enumerate() {
            let reference = ListingReference::new(*url, index);
            let outcome = if index == 1 {
                Err(anyhow!("Navigation to {url} timed out after 60000ms"))
            } else {
                Ok(stub_details(url))
            };
            record_outcome(&mut results, &reference, outcome);
        }

        assert_eq!(results.len(), 3);
        assert!(!results.get("car1").unwrap().is_failure());
        assert!(results.get("car2").unwrap().is_failure());
        assert!(!results.get("car3").unwrap().is_failure());

        let value = serde_json::to_value(&results).unwrap();
        assert_eq!(value["car2"]["url"], "https://times-out");
        assert!(value["car2"]["error"]
            .as_str()
            .unwrap()
            .contains("timed out"));
    }

    #[test]
    fn test_load_references_from_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["https://a", "", "https://b"]"#).unwrap();
        let urls = load_references(file.path()).unwrap();
        assert_eq!(urls, vec!["https://a".to_string(), "https://b".to_string()]);
    }

    #[test]
    fn test_load_references_from_object_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"car1": "https://a", "car2": "https://b", "car3": null}}"#
        )
        .unwrap();
        let urls = load_references(file.path()).unwrap();
        assert_eq!(urls, vec!["https://a".to_string(), "https://b".to_string()]);
    }

    #[test]
    fn test_load_references_rejects_scalar_top_level() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "42").unwrap();
        let err = load_references(file.path()).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));
        assert!(err.to_string().contains("array or object"));
    }

    #[test]
    fn test_load_references_rejects_missing_file() {
        let err = load_references(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));
    }

    #[test]
    fn test_load_references_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[not json").unwrap();
        let err = load_references(file.path()).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_resolve_tool_path_keeps_absolute_paths() {
        let absolute = Path::new("/tmp/links.json");
        assert_eq!(resolve_tool_path(absolute), PathBuf::from("/tmp/links.json"));
    }

    #[test]
    fn test_resolve_tool_path_anchors_relative_to_exe() {
        let resolved = resolve_tool_path(Path::new("car_links.json"));
        // Anchored to the binary's directory, never bare.
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("car_links.json"));
    }
}
