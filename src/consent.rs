use headless_chrome::Tab;
use tracing::debug;

/// Candidate accept controls, in the order they are worth trying. The first
/// two cover OneTrust deployments, the rest the site's own banner variants.
const CONSENT_SELECTORS: &[&str] = &[
    "#onetrust-accept-btn-handler",
    "button#onetrust-accept-btn-handler",
    "button[data-testid=\"uc-accept-all-button\"]",
    "button[aria-label=\"Aceitar\"], button[aria-label=\"Aceitar todos\"]",
];

/// Clicks the first consent control present. Absence of a banner is a
/// normal outcome, not an error; this never fails the pipeline.
pub fn dismiss_consent(tab: &Tab) {
    for selector in CONSENT_SELECTORS {
        let Ok(button) = tab.find_element(selector) else {
            continue;
        };
        match button.click() {
            Ok(_) => debug!(selector, "consent banner dismissed"),
            Err(e) => debug!(selector, "consent button present but click failed: {e}"),
        }
        return;
    }
    debug!("no consent banner present");
}
