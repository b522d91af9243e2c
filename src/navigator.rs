use anyhow::Result;
use headless_chrome::Tab;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::NavigationConfig;
use crate::session::{eval_json, js_literal};
use crate::utils::error::AppError;

/// What a completed page transition looked like. A 403 response is recorded
/// as a soft suspicion, never a failure: if the page is truly blocked the
/// downstream selectors will come back empty on their own.
#[derive(Debug, Clone)]
pub struct NavigationOutcome {
    pub url: String,
    pub final_url: String,
    pub status: Option<u16>,
    pub anti_bot_suspected: bool,
    pub elapsed: Duration,
}

/// Drives one page transition: navigate, wait for the load to finish, poll
/// for the network to settle, then wait for a minimal readiness marker.
/// `anchor` is an optional content selector awaited tolerantly on top of
/// `body`.
pub fn navigate(
    tab: &Tab,
    url: &str,
    cfg: &NavigationConfig,
    anchor: Option<&str>,
) -> Result<NavigationOutcome, AppError> {
    let started = Instant::now();
    tab.set_default_timeout(Duration::from_millis(cfg.timeout_ms));

    tab.navigate_to(url).map_err(|e| AppError::Navigation {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    tab.wait_until_navigated()
        .map_err(|_| AppError::NavigationTimeout {
            url: url.to_string(),
            timeout_ms: cfg.timeout_ms,
        })?;

    wait_network_settle(tab, cfg);

    tab.wait_for_element_with_custom_timeout(
        "body",
        Duration::from_millis(cfg.readiness_timeout_ms),
    )
    .map_err(|_| AppError::NavigationTimeout {
        url: url.to_string(),
        timeout_ms: cfg.readiness_timeout_ms,
    })?;

    if let Some(anchor) = anchor {
        let wait = Duration::from_millis(cfg.readiness_timeout_ms.min(10_000));
        if tab.wait_for_element_with_custom_timeout(anchor, wait).is_err() {
            debug!(anchor, "readiness anchor did not appear, proceeding anyway");
        }
    }

    let status = response_status(tab);
    let anti_bot_suspected = status == Some(403);
    if anti_bot_suspected {
        warn!(url, "response status 403 (possible anti-bot), proceeding");
    }

    Ok(NavigationOutcome {
        url: url.to_string(),
        final_url: tab.get_url(),
        status,
        anti_bot_suspected,
        elapsed: started.elapsed(),
    })
}

/// Stability poll over the page's resource-entry count: settled once the
/// count holds for `settle_idle_ms`. Never fails the navigation; a page that
/// keeps streaming simply runs into the ceiling.
fn wait_network_settle(tab: &Tab, cfg: &NavigationConfig) {
    let deadline = Instant::now() + Duration::from_millis(cfg.settle_ceiling_ms);
    let idle_needed = Duration::from_millis(cfg.settle_idle_ms);
    let mut last_count: u64 = 0;
    let mut held_since = Instant::now();

    while Instant::now() < deadline {
        let count = eval_json(tab, "performance.getEntriesByType('resource').length")
            .ok()
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        if count == last_count {
            if held_since.elapsed() >= idle_needed {
                debug!(resources = count, "network settled");
                return;
            }
        } else {
            last_count = count;
            held_since = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(cfg.settle_poll_ms));
    }
    debug!("network did not settle before ceiling, proceeding");
}

/// Waits for an element to disappear or become invisible, tolerant of the
/// timeout. Used for the search loading overlay.
pub fn wait_hidden(tab: &Tab, selector: &str, timeout: Duration) {
    let probe = format!(
        "(function() {{ \
           const el = document.querySelector({sel}); \
           if (!el) return true; \
           const cs = getComputedStyle(el); \
           return cs.display === 'none' || cs.visibility === 'hidden'; \
         }})()",
        sel = js_literal(selector)
    );
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match eval_json(tab, &probe) {
            Ok(value) if value.as_bool() == Some(true) => return,
            Ok(_) => {}
            Err(e) => {
                debug!(selector, "visibility probe failed: {e:#}");
                return;
            }
        }
        std::thread::sleep(Duration::from_millis(250));
    }
    debug!(selector, "element still visible at timeout, proceeding");
}

fn response_status(tab: &Tab) -> Option<u16> {
    // responseStatus is only populated on recent Chrome; absence is fine.
    let value = eval_json(
        tab,
        "(performance.getEntriesByType('navigation')[0] || {}).responseStatus || 0",
    )
    .ok()?;
    match value.as_u64() {
        Some(0) | None => None,
        Some(code) => u16::try_from(code).ok(),
    }
}
