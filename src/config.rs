use config::{Config, ConfigError, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionProfile,
    pub navigation: NavigationConfig,
    pub collector: CollectorConfig,
    pub discovery: DiscoveryConfig,
    pub screenshots: ScreenshotConfig,
}

/// How the browser presents itself. The rest of the pipeline never looks at
/// this; it only sees the page the session hands it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionProfile {
    pub headless: bool,
    pub sandbox_disabled: bool,
    pub locale: String,
    pub timezone: String,
    pub user_agent: String,
    pub accept_language: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub stealth_evasion: bool,
    pub chrome_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Outer ceiling for one page transition, milliseconds.
    pub timeout_ms: u64,
    /// Wait for a minimal readiness marker (body / content anchor).
    pub readiness_timeout_ms: u64,
    /// Network is "settled" once the resource-entry count holds for this long.
    pub settle_idle_ms: u64,
    pub settle_poll_ms: u64,
    /// Ceiling for the settle poll alone; navigation proceeds when exceeded.
    pub settle_ceiling_ms: u64,
    /// Content anchor awaited (tolerantly) on detail pages.
    pub detail_ready_selector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Absolute cap on carousel advance iterations.
    pub max_iterations: u32,
    /// Stop after this many consecutive iterations with no new URLs.
    pub stable_threshold: u32,
    /// Settle delay between iterations, milliseconds.
    pub settle_ms: u64,
    pub gallery_selector: String,
    pub next_selector: String,
    /// Card images below this rendered size are logos/icons, not photos.
    pub min_width: f64,
    pub min_height: f64,
    /// Card-mode results below this count trigger the detail-page fallback.
    pub min_card_images: usize,
    pub cdn_pattern: String,
    pub decorative_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub search_url: String,
    pub results_selector: String,
    pub card_selector: String,
    pub loading_indicator_selector: String,
    /// Substring that identifies a listing-detail anchor.
    pub link_pattern: String,
    pub card_wait_ms: u64,
    /// Settle after scrolling a card into view, for hydration/lazy-load.
    pub hydration_settle_ms: u64,
    pub links_take: usize,
    pub images_take: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    pub enabled: bool,
    pub directory: String,
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox_disabled: true,
            locale: "pt-PT".to_string(),
            timezone: "Europe/Lisbon".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "pt-PT,pt;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            viewport_width: 1366,
            viewport_height: 900,
            stealth_evasion: true,
            chrome_path: None,
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            readiness_timeout_ms: 15_000,
            settle_idle_ms: 800,
            settle_poll_ms: 250,
            settle_ceiling_ms: 15_000,
            detail_ready_selector: "[data-testid=\"photo-gallery\"], h1.offer-title".to_string(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            stable_threshold: 3,
            settle_ms: 200,
            gallery_selector: "[data-testid=\"main-gallery\"] img".to_string(),
            next_selector: "[data-testid=\"next-arrow\"], .embla__button--next".to_string(),
            min_width: 160.0,
            min_height: 120.0,
            min_card_images: 2,
            cdn_pattern: r"(?i)ireland\.apollo\.olxcdn\.com/v1/files/.+/image".to_string(),
            decorative_pattern: r"(?i)/listing/gallery-cta\.svg$".to_string(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_url: "https://www.standvirtual.com/carros".to_string(),
            results_selector: "[data-testid=\"search-results\"]".to_string(),
            card_selector: "[data-testid=\"search-results\"] article[data-id]".to_string(),
            loading_indicator_selector: "[data-testid=\"search-loading-indicator\"]".to_string(),
            link_pattern: "/carros/anuncio/".to_string(),
            card_wait_ms: 40_000,
            hydration_settle_ms: 150,
            links_take: 15,
            images_take: 10,
        }
    }
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: "data/screenshots".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session: SessionProfile::default(),
            navigation: NavigationConfig::default(),
            collector: CollectorConfig::default(),
            discovery: DiscoveryConfig::default(),
            screenshots: ScreenshotConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "STAND_SCOUT_"
            .add_source(Environment::with_prefix("STAND_SCOUT").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.session.chrome_path.is_none() {
            config.session.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.user_agent.trim().is_empty() {
            return Err(ConfigError::Message("Session user_agent must not be empty".into()));
        }

        if self.session.viewport_width == 0 || self.session.viewport_height == 0 {
            return Err(ConfigError::Message("Session viewport must be non-zero".into()));
        }

        if self.navigation.timeout_ms == 0 {
            return Err(ConfigError::Message("Navigation timeout_ms must be greater than 0".into()));
        }

        if self.navigation.settle_poll_ms == 0 {
            return Err(ConfigError::Message("Navigation settle_poll_ms must be greater than 0".into()));
        }

        if self.collector.stable_threshold == 0 {
            return Err(ConfigError::Message("Collector stable_threshold must be greater than 0".into()));
        }

        if self.collector.max_iterations < self.collector.stable_threshold {
            return Err(ConfigError::Message(
                "Collector max_iterations cannot be below stable_threshold".into(),
            ));
        }

        if self.collector.min_card_images == 0 {
            return Err(ConfigError::Message("Collector min_card_images must be greater than 0".into()));
        }

        if let Err(e) = Regex::new(&self.collector.cdn_pattern) {
            return Err(ConfigError::Message(format!("Invalid collector cdn_pattern: {e}")));
        }

        if let Err(e) = Regex::new(&self.collector.decorative_pattern) {
            return Err(ConfigError::Message(format!("Invalid collector decorative_pattern: {e}")));
        }

        if self.discovery.links_take == 0 || self.discovery.images_take == 0 {
            return Err(ConfigError::Message("Discovery take counts must be greater than 0".into()));
        }

        Ok(())
    }
}
