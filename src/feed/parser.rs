//! Event-based parser for the product XML feeds.
//!
//! The full feed is a `<PRODUCTS>` document of repeating `<PRODUCT>`
//! elements with nested `<VARIANTS><VARIANT>` children; the partial feed
//! uses the same element schema restricted to a few mutable fields.
//! Records without a `<CODE>` are kept with `code: None` so the sync
//! layer can warn and skip them; malformed XML is a hard error.

use anyhow::{anyhow, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedProduct {
    pub code: Option<String>,
    pub product_id: Option<i64>,
    pub title: Option<String>,
    pub manufacturer: Option<String>,
    pub ean: Option<String>,
    pub supplier_code: Option<String>,
    pub availability: Option<String>,
    pub stock: i64,
    pub stock_position: Option<String>,
    pub weight: Option<f64>,
    pub unit: Option<String>,
    pub image_url: Option<String>,
    pub variants: Vec<FeedVariant>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedVariant {
    pub code: Option<String>,
    pub variant_id: Option<i64>,
    pub supplier_code: Option<String>,
    pub ean: Option<String>,
    pub availability: Option<String>,
    pub stock: i64,
    pub stock_position: Option<String>,
    pub weight: Option<f64>,
    pub image_url: Option<String>,
    pub price_original: Option<f64>,
    pub price_with_vat: Option<f64>,
    pub price_without_vat: Option<f64>,
    pub price_purchase: Option<f64>,
    pub currency: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

/// Sparse record from the partial (availability) feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialProduct {
    pub code: Option<String>,
    pub stock: Option<i64>,
    pub availability: Option<String>,
    pub variants: Vec<PartialVariant>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialVariant {
    pub code: Option<String>,
    pub stock: Option<i64>,
    pub availability: Option<String>,
}

fn parse_i64(tag: &str, text: &str) -> Option<i64> {
    match text.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(tag, text, "could not parse integer field");
            None
        }
    }
}

fn parse_f64(tag: &str, text: &str) -> Option<f64> {
    match text.trim().replace(',', ".").parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(tag, text, "could not parse decimal field");
            None
        }
    }
}

/// Parse the full product feed.
pub fn parse_products(xml: &str) -> Result<Vec<FeedProduct>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut products = Vec::new();
    let mut product: Option<FeedProduct> = None;
    let mut variant: Option<FeedVariant> = None;

    // Element path from the root down to the current node.
    let mut path: Vec<String> = Vec::new();

    // Scratch state for multi-element constructs.
    let mut image_url: Option<String> = None;
    let mut image_main = false;
    let mut param_name: Option<String> = None;
    let mut param_value: Option<String> = None;
    let mut title_language: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "PRODUCT" => product = Some(FeedProduct::default()),
                    "VARIANT" => variant = Some(FeedVariant::default()),
                    "IMAGE" => {
                        image_url = None;
                        image_main = false;
                    }
                    "PARAMETER" => {
                        param_name = None;
                        param_value = None;
                    }
                    "DESCRIPTION" => {
                        title_language = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.as_ref() == b"language")
                            .map(|a| a.unescape_value().unwrap_or_default().to_string());
                    }
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::Empty(_)) => {}
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| anyhow!("XML text error: {err}"))?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                let Some(tag) = path.last().map(String::as_str) else {
                    continue;
                };
                let in_variant = variant.is_some();
                let in_prices = path.iter().any(|p| p == "PRICES");
                let in_parameter = path.iter().any(|p| p == "PARAMETER");
                let in_image = path.iter().any(|p| p == "IMAGE");
                let in_description = path.iter().any(|p| p == "DESCRIPTION");

                if in_parameter {
                    match tag {
                        "NAME" => param_name = Some(text.to_string()),
                        "VALUE" => param_value = Some(text.to_string()),
                        _ => {}
                    }
                } else if in_prices {
                    if let Some(v) = variant.as_mut() {
                        match tag {
                            "PRICE_ORIGINAL" => v.price_original = parse_f64(tag, text),
                            "PRICE_WITH_VAT" => v.price_with_vat = parse_f64(tag, text),
                            "PRICE_WITHOUT_VAT" => v.price_without_vat = parse_f64(tag, text),
                            "PRICE_PURCHASE" => v.price_purchase = parse_f64(tag, text),
                            "CURRENCY" => v.currency = Some(text.to_string()),
                            _ => {}
                        }
                    }
                } else if in_image {
                    match tag {
                        "URL" => image_url = Some(text.to_string()),
                        "MAIN_YN" => image_main = text == "1" || text.eq_ignore_ascii_case("true"),
                        _ => {}
                    }
                } else if in_description {
                    if tag == "TITLE" {
                        if let Some(p) = product.as_mut() {
                            // Prefer the Czech localization; otherwise the
                            // first title seen wins.
                            let preferred = title_language.as_deref() == Some("cz");
                            if p.title.is_none() || preferred {
                                p.title = Some(text.to_string());
                            }
                        }
                    }
                } else if in_variant {
                    if let Some(v) = variant.as_mut() {
                        match tag {
                            "CODE" => v.code = Some(text.to_string()),
                            "VARIANT_ID" => v.variant_id = parse_i64(tag, text),
                            "SUPPLIER_CODE" => v.supplier_code = Some(text.to_string()),
                            "EAN" => v.ean = Some(text.to_string()),
                            "AVAILABILITY" => v.availability = Some(text.to_string()),
                            "STOCK" => v.stock = parse_i64(tag, text).unwrap_or(0),
                            "STOCK_POSITION" => v.stock_position = Some(text.to_string()),
                            "WEIGHT" => v.weight = parse_f64(tag, text),
                            "IMAGE_URL" => v.image_url = Some(text.to_string()),
                            _ => {}
                        }
                    }
                } else if let Some(p) = product.as_mut() {
                    match tag {
                        "CODE" => p.code = Some(text.to_string()),
                        "PRODUCT_ID" => p.product_id = parse_i64(tag, text),
                        "MANUFACTURER" => p.manufacturer = Some(text.to_string()),
                        "EAN" => p.ean = Some(text.to_string()),
                        "SUPPLIER_CODE" => p.supplier_code = Some(text.to_string()),
                        "AVAILABILITY" => p.availability = Some(text.to_string()),
                        "STOCK" => p.stock = parse_i64(tag, text).unwrap_or(0),
                        "STOCK_POSITION" => p.stock_position = Some(text.to_string()),
                        "WEIGHT" => p.weight = parse_f64(tag, text),
                        "UNIT" => p.unit = Some(text.to_string()),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                path.pop();
                match name.as_str() {
                    "PRODUCT" => {
                        if let Some(p) = product.take() {
                            products.push(p);
                        }
                    }
                    "VARIANT" => {
                        if let (Some(v), Some(p)) = (variant.take(), product.as_mut()) {
                            p.variants.push(v);
                        }
                    }
                    "IMAGE" => {
                        if image_main {
                            if let (Some(url), Some(p)) = (image_url.take(), product.as_mut()) {
                                if p.image_url.is_none() {
                                    p.image_url = Some(url);
                                }
                            }
                        }
                    }
                    "PARAMETER" => {
                        if let (Some(k), Some(v)) = (param_name.take(), param_value.take()) {
                            if let Some(var) = variant.as_mut() {
                                var.parameters.insert(k, v);
                            }
                        }
                    }
                    "DESCRIPTION" => title_language = None,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(anyhow!("XML parse error: {err}")),
            _ => {}
        }
    }
    Ok(products)
}

/// Parse the partial (availability) feed: only code, stock and
/// availability are carried; absent fields stay `None` so the sparse
/// merge leaves stored values untouched.
pub fn parse_partial_products(xml: &str) -> Result<Vec<PartialProduct>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut products = Vec::new();
    let mut product: Option<PartialProduct> = None;
    let mut variant: Option<PartialVariant> = None;
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "PRODUCT" => product = Some(PartialProduct::default()),
                    "VARIANT" => variant = Some(PartialVariant::default()),
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| anyhow!("XML text error: {err}"))?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                let Some(tag) = path.last().map(String::as_str) else {
                    continue;
                };
                if let Some(v) = variant.as_mut() {
                    match tag {
                        "CODE" => v.code = Some(text.to_string()),
                        "STOCK" => v.stock = parse_i64(tag, text),
                        "AVAILABILITY" => v.availability = Some(text.to_string()),
                        _ => {}
                    }
                } else if let Some(p) = product.as_mut() {
                    match tag {
                        "CODE" => p.code = Some(text.to_string()),
                        "STOCK" => p.stock = parse_i64(tag, text),
                        "AVAILABILITY" => p.availability = Some(text.to_string()),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                path.pop();
                match name.as_ref() {
                    b"PRODUCT" => {
                        if let Some(p) = product.take() {
                            products.push(p);
                        }
                    }
                    b"VARIANT" => {
                        if let (Some(v), Some(p)) = (variant.take(), product.as_mut()) {
                            p.variants.push(v);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(anyhow!("XML parse error: {err}")),
            _ => {}
        }
    }
    Ok(products)
}
