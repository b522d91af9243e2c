use anyhow::{Context, Result};
use headless_chrome::Tab;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{CollectorConfig, DiscoveryConfig, NavigationConfig};
use crate::discovery::card_link;
use crate::fallback::FallbackChain;
use crate::models::ImageSet;
use crate::navigator::navigate;
use crate::session::{eval_json, js_literal, BrowserSession};

/// Settle before the simplified collection on an auxiliary detail page.
const DETAIL_FALLBACK_SETTLE_MS: u64 = 600;

/// Raw properties of one rendered <img>, as reported by the page. Source
/// resolution over these is a fallback chain: `currentSrc`, the src
/// attribute, lazy-load attributes, then the last srcset entry (this CDN
/// emits srcsets in ascending resolution, so the last is the best
/// candidate).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImgProps {
    #[serde(default)]
    pub cs: String,
    #[serde(default)]
    pub src: String,
    #[serde(default, rename = "dataSrc")]
    pub data_src: String,
    #[serde(default, rename = "dataLazy")]
    pub data_lazy: String,
    #[serde(default)]
    pub srcset: String,
    #[serde(default)]
    pub w: f64,
    #[serde(default)]
    pub h: f64,
}

pub fn resolve_source(props: &ImgProps) -> Option<String> {
    FallbackChain::new()
        .then("current-src", || Some(props.cs.clone()))
        .then("src-attribute", || Some(props.src.clone()))
        .then("data-src", || Some(props.data_src.clone()))
        .then("data-lazy-src", || Some(props.data_lazy.clone()))
        .then("srcset-last", || srcset_last(&props.srcset))
        .resolve()
}

fn srcset_last(srcset: &str) -> Option<String> {
    srcset
        .split(',')
        .next_back()?
        .trim()
        .split_whitespace()
        .next()
        .map(str::to_string)
}

/// Compiled card-mode noise filters: the decorative "show more" icon, URLs
/// off the expected image CDN, and anything rendered smaller than a real
/// photo.
pub struct ImageFilters {
    cdn: Regex,
    decorative: Regex,
    min_width: f64,
    min_height: f64,
}

impl ImageFilters {
    pub fn from_config(cfg: &CollectorConfig) -> Result<Self> {
        Ok(Self {
            cdn: Regex::new(&cfg.cdn_pattern).context("compiling cdn_pattern")?,
            decorative: Regex::new(&cfg.decorative_pattern)
                .context("compiling decorative_pattern")?,
            min_width: cfg.min_width,
            min_height: cfg.min_height,
        })
    }

    pub fn qualifies(&self, url: &str, width: f64, height: f64) -> bool {
        !self.decorative.is_match(url)
            && self.cdn.is_match(url)
            && width >= self.min_width
            && height >= self.min_height
    }
}

/// Detail-page mode: harvest the full gallery by repeatedly reading the
/// rendered sources and advancing the carousel. Terminates when the next
/// control disappears, after `stable_threshold` consecutive no-growth
/// iterations, or at the absolute iteration cap.
pub async fn collect_detail_images(tab: &Tab, cfg: &CollectorConfig) -> Result<ImageSet> {
    let base = page_base(tab);
    let mut set = ImageSet::new();
    absorb_gallery(tab, cfg, base.as_ref(), &mut set)?;

    let mut stable = 0u32;
    for _ in 0..cfg.max_iterations {
        if stable >= cfg.stable_threshold {
            break;
        }
        let before = set.len();
        match advance_carousel(tab, cfg) {
            Ok(false) => break,
            Ok(true) => {}
            Err(e) => debug!("carousel advance failed: {e:#}"),
        }
        tokio::time::sleep(Duration::from_millis(cfg.settle_ms)).await;
        absorb_gallery(tab, cfg, base.as_ref(), &mut set)?;
        if set.len() == before {
            stable += 1;
        } else {
            stable = 0;
        }
    }
    Ok(set)
}

/// Listing-card mode: harvest one card of a search-results grid. Collection
/// scope is itself a fallback chain (carousel container, then the whole
/// card), and results below `min_card_images` trigger a simplified pass
/// over the listing's own detail page in an auxiliary tab, preferred when
/// it finds more.
pub async fn collect_card_images(
    session: &BrowserSession,
    index: usize,
    cfg: &CollectorConfig,
    disc: &DiscoveryConfig,
    nav: &NavigationConfig,
) -> Result<ImageSet> {
    let tab = session.tab();
    let filters = ImageFilters::from_config(cfg)?;

    if let Err(e) = scroll_card_into_view(tab, index, disc) {
        debug!(index, "card scroll failed: {e:#}");
    }
    tokio::time::sleep(Duration::from_millis(disc.hydration_settle_ms)).await;

    // One nudge of the card carousel triggers lazy-loading of its slides.
    if let Err(e) = nudge_card_carousel(tab, index, disc) {
        debug!(index, "card carousel nudge failed: {e:#}");
    }
    tokio::time::sleep(Duration::from_millis(cfg.settle_ms)).await;

    let base = page_base(tab);
    let urls = FallbackChain::new()
        .then("carousel-container", || {
            card_scope_sources(tab, index, disc, true, base.as_ref(), &filters).ok()
        })
        .then("whole-card", || {
            card_scope_sources(tab, index, disc, false, base.as_ref(), &filters).ok()
        })
        .resolve()
        .unwrap_or_default();

    let mut set: ImageSet = urls.into_iter().collect();

    if set.len() < cfg.min_card_images {
        if let Some(href) = detail_link_for_card(tab, index, disc) {
            match detail_page_fallback(session, &href, nav, &filters).await {
                Ok(detail_set) if detail_set.len() > set.len() => {
                    debug!(index, detail = detail_set.len(), card = set.len(),
                        "preferring detail-page images over card images");
                    set = detail_set;
                }
                Ok(_) => {}
                Err(e) => debug!(index, "detail-page fallback failed: {e:#}"),
            }
        }
    }

    Ok(set)
}

fn absorb_gallery(
    tab: &Tab,
    cfg: &CollectorConfig,
    base: Option<&Url>,
    set: &mut ImageSet,
) -> Result<()> {
    let script = format!(
        "Array.from(document.querySelectorAll({sel})).map(img => ({{ \
           cs: img.currentSrc || '', \
           src: img.src || '', \
           dataSrc: img.getAttribute('data-src') || '', \
           dataLazy: img.getAttribute('data-lazy-src') || '', \
           srcset: img.getAttribute('srcset') || '' \
         }}))",
        sel = js_literal(&cfg.gallery_selector)
    );
    let props: Vec<ImgProps> =
        serde_json::from_value(eval_json(tab, &script)?).context("parsing gallery sources")?;
    for prop in &props {
        if let Some(url) = resolve_source(prop).and_then(|raw| absolutize(&raw, base)) {
            set.insert(url);
        }
    }
    Ok(())
}

fn advance_carousel(tab: &Tab, cfg: &CollectorConfig) -> Result<bool> {
    let script = format!(
        "(function() {{ \
           const next = document.querySelector({sel}); \
           if (next) {{ \
             (next instanceof HTMLElement ? next : next.parentElement)?.click(); \
             return true; \
           }} \
           return false; \
         }})()",
        sel = js_literal(&cfg.next_selector)
    );
    Ok(eval_json(tab, &script)?.as_bool().unwrap_or(false))
}

pub(crate) fn scroll_card_into_view(tab: &Tab, index: usize, disc: &DiscoveryConfig) -> Result<()> {
    let script = format!(
        "(function() {{ \
           const cards = document.querySelectorAll({sel}); \
           const card = cards[{index}]; \
           if (!card) return false; \
           card.scrollIntoView({{ behavior: 'instant', block: 'center' }}); \
           return true; \
         }})()",
        sel = js_literal(&disc.card_selector)
    );
    eval_json(tab, &script)?;
    Ok(())
}

fn nudge_card_carousel(tab: &Tab, index: usize, disc: &DiscoveryConfig) -> Result<bool> {
    let script = format!(
        "(function() {{ \
           const cards = document.querySelectorAll({sel}); \
           const card = cards[{index}]; \
           if (!card) return false; \
           const next = card.querySelector('button[aria-label=\"Next slide\"]'); \
           if (next) {{ next.click(); return true; }} \
           return false; \
         }})()",
        sel = js_literal(&disc.card_selector)
    );
    Ok(eval_json(tab, &script)?.as_bool().unwrap_or(false))
}

fn card_scope_sources(
    tab: &Tab,
    index: usize,
    disc: &DiscoveryConfig,
    carousel_scope: bool,
    base: Option<&Url>,
    filters: &ImageFilters,
) -> Result<Vec<String>> {
    let scope = if carousel_scope {
        "card.querySelector('[data-testid=\"carousel-container\"]')"
    } else {
        "card"
    };
    let script = format!(
        "(function() {{ \
           const cards = document.querySelectorAll({sel}); \
           const card = cards[{index}]; \
           if (!card) return []; \
           const root = {scope}; \
           if (!root) return []; \
           const out = []; \
           for (const img of root.querySelectorAll('img')) {{ \
             const owner = img.closest('article'); \
             if (owner && owner !== card) continue; \
             const rect = img.getBoundingClientRect(); \
             out.push({{ \
               cs: img.currentSrc || '', \
               src: img.src || '', \
               dataSrc: img.getAttribute('data-src') || '', \
               dataLazy: img.getAttribute('data-lazy-src') || '', \
               srcset: img.getAttribute('srcset') || '', \
               w: rect.width, \
               h: rect.height \
             }}); \
           }} \
           return out; \
         }})()",
        sel = js_literal(&disc.card_selector)
    );
    let props: Vec<ImgProps> =
        serde_json::from_value(eval_json(tab, &script)?).context("parsing card sources")?;
    Ok(qualifying_urls(&props, base, filters))
}

fn detail_link_for_card(tab: &Tab, index: usize, disc: &DiscoveryConfig) -> Option<String> {
    let html = tab.get_content().ok()?;
    let base = page_base(tab)?;
    let document = scraper::Html::parse_document(&html);
    let selector = scraper::Selector::parse(&disc.card_selector).ok()?;
    let card = document.select(&selector).nth(index)?;
    card_link(card, &base, disc)
}

async fn detail_page_fallback(
    session: &BrowserSession,
    href: &str,
    nav: &NavigationConfig,
    filters: &ImageFilters,
) -> Result<ImageSet> {
    let tab = session.new_tab()?;
    let result = collect_detail_simplified(&tab, href, nav, filters).await;
    // Released on success and failure alike; a leaked tab outlives the item.
    if let Err(e) = tab.close(true) {
        debug!("auxiliary tab close failed: {e}");
    }
    result
}

async fn collect_detail_simplified(
    tab: &Tab,
    href: &str,
    nav: &NavigationConfig,
    filters: &ImageFilters,
) -> Result<ImageSet> {
    navigate(tab, href, nav, None)?;
    tokio::time::sleep(Duration::from_millis(DETAIL_FALLBACK_SETTLE_MS)).await;

    let script = "Array.from(document.querySelectorAll('img')).map(img => { \
           const rect = img.getBoundingClientRect(); \
           return { \
             cs: img.currentSrc || '', \
             src: img.src || '', \
             dataSrc: img.getAttribute('data-src') || '', \
             dataLazy: img.getAttribute('data-lazy-src') || '', \
             srcset: img.getAttribute('srcset') || '', \
             w: rect.width, \
             h: rect.height \
           }; \
         })";
    let props: Vec<ImgProps> =
        serde_json::from_value(eval_json(tab, script)?).context("parsing detail sources")?;
    let base = page_base(tab);
    Ok(qualifying_urls(&props, base.as_ref(), filters)
        .into_iter()
        .collect())
}

fn qualifying_urls(props: &[ImgProps], base: Option<&Url>, filters: &ImageFilters) -> Vec<String> {
    let mut out = Vec::new();
    for prop in props {
        let Some(url) = resolve_source(prop).and_then(|raw| absolutize(&raw, base)) else {
            continue;
        };
        if filters.qualifies(&url, prop.w, prop.h) && !out.contains(&url) {
            out.push(url);
        }
    }
    out
}

fn page_base(tab: &Tab) -> Option<Url> {
    Url::parse(&tab.get_url()).ok()
}

fn absolutize(raw: &str, base: Option<&Url>) -> Option<String> {
    match base {
        Some(base) => base.join(raw).ok().map(|url| url.to_string()),
        None => Url::parse(raw).ok().map(|url| url.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CDN_A: &str = "https://ireland.apollo.olxcdn.com/v1/files/abc123/image;s=1080x720";
    const CDN_B: &str = "https://ireland.apollo.olxcdn.com/v1/files/def456/image";

    fn filters() -> ImageFilters {
        ImageFilters::from_config(&CollectorConfig::default()).unwrap()
    }

    #[test]
    fn test_source_resolution_prefers_current_src() {
        let props = ImgProps {
            cs: CDN_A.to_string(),
            src: CDN_B.to_string(),
            ..Default::default()
        };
        assert_eq!(resolve_source(&props).as_deref(), Some(CDN_A));
    }

    #[test]
    fn test_source_resolution_falls_through_to_srcset_last() {
        let props = ImgProps {
            srcset: format!("{CDN_B};s=320x240 320w, {CDN_B};s=640x480 640w, {CDN_B};s=1280x960 1280w"),
            ..Default::default()
        };
        assert_eq!(
            resolve_source(&props).as_deref(),
            Some(format!("{CDN_B};s=1280x960").as_str())
        );
    }

    #[test]
    fn test_same_url_from_different_attributes_collapses() {
        // One pass sees the resolved currentSrc, a later pass only the
        // srcset; both must land on a single entry.
        let first = ImgProps { cs: CDN_A.to_string(), ..Default::default() };
        let second = ImgProps {
            srcset: format!("{CDN_A} 1080w"),
            ..Default::default()
        };
        let mut set = ImageSet::new();
        set.insert(resolve_source(&first).unwrap());
        set.insert(resolve_source(&second).unwrap());
        assert_eq!(set.len(), 1);
    }

    #[rstest]
    #[case(CDN_A, 320.0, 240.0, true)]
    #[case(CDN_A, 159.0, 240.0, false)]
    #[case(CDN_A, 320.0, 119.0, false)]
    #[case("https://static.example.com/listing/gallery-cta.svg", 320.0, 240.0, false)]
    #[case("https://elsewhere.example.com/v1/files/abc/image", 320.0, 240.0, false)]
    fn test_card_filters(
        #[case] url: &str,
        #[case] width: f64,
        #[case] height: f64,
        #[case] expected: bool,
    ) {
        assert_eq!(filters().qualifies(url, width, height), expected);
    }

    #[test]
    fn test_qualifying_urls_deduplicates_and_filters() {
        let props = vec![
            ImgProps { cs: CDN_A.to_string(), w: 320.0, h: 240.0, ..Default::default() },
            ImgProps { cs: CDN_A.to_string(), w: 320.0, h: 240.0, ..Default::default() },
            ImgProps { cs: CDN_B.to_string(), w: 64.0, h: 64.0, ..Default::default() },
        ];
        let urls = qualifying_urls(&props, None, &filters());
        assert_eq!(urls, vec![CDN_A.to_string()]);
    }

    #[test]
    fn test_absolutize_resolves_relative_against_base() {
        let base = Url::parse("https://www.standvirtual.com/carros/anuncio/x.html").unwrap();
        assert_eq!(
            absolutize("/v1/files/abc/image", Some(&base)).as_deref(),
            Some("https://www.standvirtual.com/v1/files/abc/image")
        );
        assert_eq!(absolutize("not a url", None), None);
    }

    #[test]
    fn test_srcset_last_takes_url_of_final_entry() {
        assert_eq!(
            srcset_last("a.jpg 1x, b.jpg 2x").as_deref(),
            Some("b.jpg")
        );
        assert_eq!(srcset_last("single.jpg 1x").as_deref(), Some("single.jpg"));
        assert_eq!(srcset_last(""), None);
    }
}
