// Response normalization: turns upstream package answers into priced quote
// lines, decodes the escaped service labels and orders everything by price.
use crate::package::ServiceType;
use crate::xml_response::{XmlDomesticPackage, XmlIntlPackage};
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("No valid combinations found")]
    NoQuotes,

    #[error("Every rate request was rejected by the upstream service")]
    AllPackagesFailed,
}

/// One priced service option.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateQuoteLine {
    pub service_name: String,
    pub price: f64,
}

impl RateQuoteLine {
    pub fn new(service_name: impl Into<String>, price: f64) -> Self {
        Self {
            service_name: service_name.into(),
            price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageResult {
    Quotes(Vec<RateQuoteLine>),
    Error(String),
}

/// Result for one expanded package, keyed by its upstream `ID`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageOutcome {
    pub id: String,
    /// Human readable summary of what was requested, e.g. `Priority / SM FLAT RATE BOX`.
    pub request: String,
    #[serde(flatten)]
    pub result: PackageResult,
}

/// Keeps international service lines whose description names the requested service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFilter {
    term: String,
}

impl ServiceFilter {
    /// `None` when every service was requested.
    pub fn for_service(service_type: &ServiceType) -> Option<Self> {
        if service_type.is_all() {
            return None;
        }
        Some(Self {
            term: fold(service_type.as_str()),
        })
    }

    pub fn matches(&self, description: &str) -> bool {
        fold(description).contains(&self.term)
    }
}

static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s-]+").unwrap());
static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

// Lowercase, hyphens as spaces, whitespace collapsed.
fn fold(text: &str) -> String {
    SEPARATORS.replace_all(&text.to_lowercase(), " ").trim().to_string()
}

fn strip_tags(text: &str) -> String {
    MARKUP.replace_all(text, "").into_owned()
}

/// Decodes a service label as sent by the upstream: percent escapes, one or two
/// layers of HTML entities, and inline markup such as `<sup>`.
pub fn decode_label(raw: &str) -> String {
    let mut text = percent_decode_str(raw).decode_utf8_lossy().into_owned();
    for _ in 0..2 {
        let unescaped = match quick_xml::escape::unescape(&text) {
            Ok(unescaped) => unescaped.into_owned(),
            Err(_) => break,
        };
        if unescaped == text {
            break;
        }
        text = unescaped;
    }
    strip_tags(&text).trim().to_string()
}

/// Parses an upstream price such as `5.20`, `$5.20` or `%245.20`.
pub fn parse_price(raw: &str) -> Option<f64> {
    let decoded = percent_decode_str(raw.trim()).decode_utf8_lossy();
    let price: f64 = decoded.trim().trim_start_matches('$').replace(',', "").parse().ok()?;
    price.is_finite().then_some(price)
}

fn by_price(a: &RateQuoteLine, b: &RateQuoteLine) -> Ordering {
    a.price.total_cmp(&b.price)
}

pub fn sort_by_price(lines: &mut [RateQuoteLine]) {
    lines.sort_by(by_price);
}

/// Quote lines of one domestic package, cheapest first.
pub fn domestic_lines(package: &XmlDomesticPackage) -> PackageResult {
    if let Some(error) = &package.error {
        return PackageResult::Error(error.description.clone());
    }

    let mut lines: Vec<RateQuoteLine> = package
        .postages
        .iter()
        .filter_map(|postage| match parse_price(&postage.rate) {
            Some(price) => Some(RateQuoteLine::new(decode_label(&postage.mail_service), price)),
            None => {
                warn!(package = %package.id, rate = %postage.rate, "dropping postage with unreadable rate");
                None
            }
        })
        .collect();
    sort_by_price(&mut lines);
    PackageResult::Quotes(lines)
}

/// Quote lines of one international package, cheapest first. Lines without a
/// service description are not shipping services and are dropped.
pub fn international_lines(package: &XmlIntlPackage, filter: Option<&ServiceFilter>) -> PackageResult {
    if let Some(error) = &package.error {
        return PackageResult::Error(error.description.clone());
    }

    let mut lines: Vec<RateQuoteLine> = package
        .services
        .iter()
        .filter_map(|service| {
            let description = service.svc_description.as_deref().map(decode_label)?;
            if description.is_empty() {
                return None;
            }
            if filter.is_some_and(|f| !f.matches(&description)) {
                return None;
            }
            match parse_price(&service.postage) {
                Some(price) => Some(RateQuoteLine::new(description, price)),
                None => {
                    warn!(package = %package.id, postage = %service.postage, "dropping service with unreadable postage");
                    None
                }
            }
        })
        .collect();
    sort_by_price(&mut lines);
    PackageResult::Quotes(lines)
}

/// Merges every package's quotes into one list ordered by price.
///
/// Errored packages are skipped. Fails when nothing priceable is left.
pub fn normalize(outcomes: &[PackageOutcome]) -> Result<Vec<RateQuoteLine>, QuoteError> {
    let mut lines = Vec::new();
    let mut failed = 0;

    for outcome in outcomes {
        match &outcome.result {
            PackageResult::Quotes(quotes) => lines.extend(quotes.iter().cloned()),
            PackageResult::Error(message) => {
                debug!(package = %outcome.id, request = %outcome.request, error = %message, "skipping rejected package");
                failed += 1;
            }
        }
    }

    if !outcomes.is_empty() && failed == outcomes.len() {
        return Err(QuoteError::AllPackagesFailed);
    }
    if lines.is_empty() {
        return Err(QuoteError::NoQuotes);
    }

    sort_by_price(&mut lines);
    Ok(lines)
}
