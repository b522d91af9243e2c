use scraper::{ElementRef, Selector};
use tracing::debug;
use url::Url;

use crate::config::DiscoveryConfig;
use crate::fallback::FallbackChain;

/// Resolves the detail link for one search-results card. Priority order:
/// the title anchor, the always-present hidden anchor, the carousel anchor,
/// then any anchor matching the listing-detail URL pattern. Returns an
/// absolute URL, or None when no strategy finds one (the caller records an
/// empty entry and moves on).
pub fn card_link(card: ElementRef<'_>, base: &Url, cfg: &DiscoveryConfig) -> Option<String> {
    let pattern = &cfg.link_pattern;
    let title = anchor_selector("h2 ", pattern)?;
    let hidden = anchor_selector("div[hidden] ", pattern)?;
    let carousel = anchor_selector("[data-testid=\"carousel-container\"] ", pattern)?;
    let any = anchor_selector("", pattern)?;

    let href = FallbackChain::new()
        .then("title-anchor", || first_href(card, &title))
        .then("hidden-anchor", || first_href(card, &hidden))
        .then("carousel-anchor", || first_href(card, &carousel))
        .then("any-anchor", || first_href(card, &any))
        .resolve()?;

    absolutize(&href, base)
}

fn anchor_selector(scope: &str, pattern: &str) -> Option<Selector> {
    let raw = format!("{scope}a[href*=\"{pattern}\"]");
    match Selector::parse(&raw) {
        Ok(selector) => Some(selector),
        Err(e) => {
            debug!(selector = raw, "unparseable anchor selector: {e:?}");
            None
        }
    }
}

fn first_href(card: ElementRef<'_>, selector: &Selector) -> Option<String> {
    card.select(selector)
        .find_map(|anchor| anchor.value().attr("href"))
        .map(str::to_string)
}

fn absolutize(href: &str, base: &Url) -> Option<String> {
    match base.join(href) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            debug!(href, "could not absolutize link: {e}");
            None
        }
    }
}
