use anyhow::{anyhow, Context, Result};
use headless_chrome::protocol::cdp::Emulation;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::SessionProfile;
use crate::utils::error::AppError;

/// One browser process with one primary tab, shared by the whole run. The
/// Chrome process is released when the session is dropped, on every exit
/// path.
pub struct BrowserSession {
    browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn open(profile: &SessionProfile) -> Result<Self> {
        let lang_arg = format!("--lang={}", profile.locale);
        let window_arg = format!(
            "--window-size={},{}",
            profile.viewport_width, profile.viewport_height
        );

        let mut launch_options = LaunchOptions::default_builder()
            .headless(profile.headless)
            .sandbox(!profile.sandbox_disabled)
            .window_size(Some((profile.viewport_width, profile.viewport_height)))
            .args(vec![
                OsStr::new("--disable-setuid-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new(lang_arg.as_str()),
                OsStr::new(window_arg.as_str()),
            ])
            .build()
            .map_err(|e| anyhow!("Failed to create launch options: {}", e))?;

        if let Some(chrome_path) = &profile.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| AppError::Launch(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| AppError::Launch(format!("could not open a tab: {e}")))?;

        tab.set_user_agent(
            &profile.user_agent,
            Some(&profile.accept_language),
            None,
        )
        .context("setting user agent")?;

        tab.call_method(Emulation::SetTimezoneOverride {
            timezone_id: profile.timezone.clone(),
        })
        .context("overriding timezone")?;

        let session = Self { browser, tab };

        if profile.stealth_evasion {
            // Degrades gracefully: the session is still usable without it.
            if let Err(e) = session.install_stealth() {
                warn!("stealth evasion unavailable, continuing without it: {e:#}");
            }
        }

        debug!("browser session ready");
        Ok(session)
    }

    fn install_stealth(&self) -> Result<()> {
        // Patches the usual headless tells (navigator.webdriver and friends)
        // before any page script runs.
        self.tab
            .enable_stealth_mode()
            .context("installing stealth evasion")?;
        Ok(())
    }

    /// The primary tab, reused across all items of a run.
    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    /// Auxiliary tab for the transient detail-page fallback. Callers must
    /// close it on every path.
    pub fn new_tab(&self) -> Result<Arc<Tab>> {
        self.browser.new_tab().context("opening auxiliary tab")
    }

    pub fn close(self) {
        debug!("closing browser session");
        // Dropping the Browser tears down the Chrome process.
        drop(self);
    }
}

/// Evaluates a JS expression in the page and returns its JSON value. The
/// expression is wrapped in JSON.stringify so objects and arrays survive the
/// protocol boundary intact.
pub fn eval_json(tab: &Tab, expression: &str) -> Result<serde_json::Value> {
    let wrapped = format!("JSON.stringify(({expression}))");
    let remote = tab
        .evaluate(&wrapped, false)
        .context("evaluating page expression")?;
    let raw = remote
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("page expression returned no value"))?
        .to_string();
    serde_json::from_str(&raw).context("parsing page expression result")
}

/// Embeds a string in generated JS as a single-quoted literal.
pub fn js_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}
