use anyhow::{anyhow, Result};
use headless_chrome::Tab;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::models::{NormalizedRecord, RawFieldDictionary};
use crate::session::eval_json;

/// The spec blocks present on a listing page, tagged by data-testid. The
/// identifiers follow the page markup.
const FIELD_IDS: &[&str] = &[
    "make",
    "model",
    "version",
    "color",
    "door_count",
    "nr_seats",
    "engine_capacity",
    "engine_power",
    "fuel_type",
    "body_type",
    "gearbox",
    "transmission",
    "mileage",
    "first_registration_month",
    "first_registration_year",
];

const TITLE_SELECTOR: &str = "h1.offer-title";
const PRICE_NUMBER_SELECTOR: &str = ".offer-price__number";
const PRICE_CURRENCY_SELECTOR: &str = ".offer-price__currency";

/// Collapsed sections whose content must be in the DOM before reading.
const EXPAND_SECTIONS_JS: &str = r#"
(function() {
  const expandById = (id) => {
    const anchor = document.getElementById(id);
    if (!anchor) return;
    const btn = anchor.closest('button');
    if (btn && btn.getAttribute('aria-expanded') === 'false') {
      btn.click();
    }
  };
  expandById('technical_specs');
  expandById('condition_history');
  return true;
})()
"#;

/// Clicks open the collapsed accordions so their blocks render. Best-effort:
/// a page without them extracts fine from whatever is present.
pub fn expand_hidden_sections(tab: &Tab) {
    if let Err(e) = eval_json(tab, EXPAND_SECTIONS_JS) {
        debug!("could not expand collapsed sections: {e:#}");
    }
}

/// Reads the fixed field catalog plus title and price out of an
/// already-loaded page. Pure over the HTML string; no network I/O.
///
/// Per block the label line precedes the value line, with any nodes between
/// them being decorative, so the first text sub-node is the label and the
/// last is the value. A block with no sub-nodes falls back to the identifier
/// as label and its full text as value.
pub fn extract_fields(html: &str) -> Result<(NormalizedRecord, RawFieldDictionary)> {
    let document = Html::parse_document(html);
    let sub_node = Selector::parse("p").map_err(|e| anyhow!("invalid selector: {e:?}"))?;

    let mut record = NormalizedRecord::default();
    let mut raw = RawFieldDictionary::new();

    for id in FIELD_IDS {
        let selector = Selector::parse(&format!("[data-testid=\"{id}\"]"))
            .map_err(|e| anyhow!("invalid selector for {id}: {e:?}"))?;
        let Some(block) = document.select(&selector).next() else {
            continue;
        };

        let (label, value) = block_pair(block, &sub_node, id);
        if !label.is_empty() && !value.is_empty() {
            raw.insert(label, value.clone());
        }
        if let Some(slot) = normalized_slot(&mut record, id) {
            *slot = value;
        }
    }

    let title = pick_text(&document, TITLE_SELECTOR)?;
    let price_amount = pick_text(&document, PRICE_NUMBER_SELECTOR)?;
    let price_currency = pick_text(&document, PRICE_CURRENCY_SELECTOR)?;

    raw.insert("Título".to_string(), title.clone());
    if !price_amount.is_empty() {
        let price = if price_currency.is_empty() {
            price_amount.clone()
        } else {
            format!("{price_amount} {price_currency}")
        };
        raw.insert("Preço".to_string(), price);
    }

    record.title = title;
    record.price_amount = price_amount;
    record.price_currency = price_currency;

    Ok((record, raw))
}

fn block_pair(block: ElementRef<'_>, sub_node: &Selector, id: &str) -> (String, String) {
    let nodes: Vec<ElementRef<'_>> = block.select(sub_node).collect();
    match (nodes.first(), nodes.last()) {
        (Some(first), Some(last)) => (text_of(*first), text_of(*last)),
        _ => (id.to_string(), text_of(block)),
    }
}

fn normalized_slot<'a>(record: &'a mut NormalizedRecord, id: &str) -> Option<&'a mut String> {
    match id {
        "make" => Some(&mut record.make),
        "model" => Some(&mut record.model),
        "version" => Some(&mut record.version),
        "color" => Some(&mut record.color),
        "door_count" => Some(&mut record.doors),
        "nr_seats" => Some(&mut record.seats),
        "engine_capacity" => Some(&mut record.engine_capacity),
        "engine_power" => Some(&mut record.engine_power),
        "fuel_type" => Some(&mut record.fuel_type),
        "body_type" => Some(&mut record.body_type),
        "gearbox" => Some(&mut record.gearbox),
        "transmission" => Some(&mut record.transmission),
        "mileage" => Some(&mut record.mileage),
        "first_registration_month" => Some(&mut record.registration_month),
        "first_registration_year" => Some(&mut record.registration_year),
        _ => None,
    }
}

fn pick_text(document: &Html, selector: &str) -> Result<String> {
    let selector = Selector::parse(selector).map_err(|e| anyhow!("invalid selector: {e:?}"))?;
    Ok(document
        .select(&selector)
        .next()
        .map(text_of)
        .unwrap_or_default())
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}
