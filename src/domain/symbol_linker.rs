//! Deterministic, regex-driven ticker extraction from free text (C8,
//! §4.8). Confidence/method per pattern family; the caller picks the
//! `title_`/`body_` method prefix depending on whether the text came from
//! an article title or its body.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Tickers that match the bare-token shape but are never real instrument
/// symbols in this market (§4.8 stopword set).
const STOPWORDS: &[&str] = &[
    "ETF", "USD", "VND", "VNINDEX", "HNX", "HOSE", "UPCOM", "CTCP", "VNI",
];

static PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([A-Z]{2,5})\)").unwrap());
static EXCHANGE_PAREN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{2,5})\s*\((?:HOSE|HNX|UPCOM)\)").unwrap());
static EXCHANGE_COLON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:HOSE|HNX|UPCOM)[:\-]\s*([A-Z]{2,5})").unwrap());
static KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"CỔ PHIẾU ([A-Z]{2,5})|MÃ CHỨNG KHOÁN ([A-Z]{2,5})|MÃ (?:CK )?([A-Z]{2,5})").unwrap()
});
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z]{2,5})\b").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolLink {
    pub ticker: String,
    pub confidence: f64,
    pub method: String,
}

fn is_plausible_ticker(ticker: &str) -> bool {
    ticker.len() >= 2 && ticker.len() <= 5 && !STOPWORDS.contains(&ticker)
}

/// Runs every pattern family against `text` (uppercased first, per §4.8:
/// "matches on uppercased text"), keeping the highest confidence seen per
/// ticker, then filters by `known_tickers` (when given) and the stopword
/// set, and sorts `(confidence desc, ticker asc)`.
fn link_symbols(text: &str, known_tickers: Option<&HashSet<String>>, prefix: &str) -> Vec<SymbolLink> {
    let upper = text.to_uppercase();
    let mut best: std::collections::HashMap<String, SymbolLink> = std::collections::HashMap::new();

    let mut consider = |ticker: &str, confidence: f64, method: &str| {
        if !is_plausible_ticker(ticker) {
            return;
        }
        if let Some(known) = known_tickers
            && !known.contains(ticker)
        {
            return;
        }
        let entry = best.entry(ticker.to_string()).or_insert_with(|| SymbolLink {
            ticker: ticker.to_string(),
            confidence: 0.0,
            method: method.to_string(),
        });
        if confidence > entry.confidence {
            entry.confidence = confidence;
            entry.method = method.to_string();
        }
    };

    for caps in PAREN_RE.captures_iter(&upper) {
        consider(&caps[1], 0.95, &format!("{prefix}_paren"));
    }
    for caps in EXCHANGE_PAREN_RE.captures_iter(&upper) {
        consider(&caps[1], 0.92, &format!("{prefix}_exchange_paren"));
    }
    for caps in EXCHANGE_COLON_RE.captures_iter(&upper) {
        consider(&caps[1], 0.92, &format!("{prefix}_exchange_colon"));
    }
    for caps in KEYWORD_RE.captures_iter(&upper) {
        let ticker = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .expect("one keyword alternative always captures");
        consider(ticker.as_str(), 0.90, &format!("{prefix}_keyword"));
    }
    for caps in TOKEN_RE.captures_iter(&upper) {
        consider(&caps[1], 0.60, &format!("{prefix}_token"));
    }

    let mut out: Vec<SymbolLink> = best.into_values().collect();
    out.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    out
}

pub fn link_symbols_from_title(text: &str, known_tickers: Option<&HashSet<String>>) -> Vec<SymbolLink> {
    link_symbols(text, known_tickers, "title")
}

pub fn link_symbols_from_body(text: &str, known_tickers: Option<&HashSet<String>>) -> Vec<SymbolLink> {
    link_symbols(text, known_tickers, "body")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(tickers: &[&str]) -> HashSet<String> {
        tickers.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn scenario_5_from_spec() {
        let known = known(&["FPT", "HPG", "VNM"]);
        let links = link_symbols_from_title(
            "Cổ phiếu FPT tăng mạnh, HPG (HPG) bứt tốc",
            Some(&known),
        );
        let fpt = links.iter().find(|l| l.ticker == "FPT").expect("FPT present");
        assert!(fpt.confidence >= 0.9);
        let hpg = links.iter().find(|l| l.ticker == "HPG").expect("HPG present");
        assert!(hpg.confidence >= 0.9);
        assert_eq!(hpg.method, "title_paren");
        assert!(links.iter().all(|l| l.ticker != "VNM"));
    }

    #[test]
    fn output_is_sorted_confidence_desc_ticker_asc() {
        let links = link_symbols_from_body("FPT HPG (HPG) VNM", None);
        for w in links.windows(2) {
            assert!(
                w[0].confidence > w[1].confidence
                    || (w[0].confidence == w[1].confidence && w[0].ticker <= w[1].ticker)
            );
        }
    }

    #[test]
    fn stopwords_are_never_emitted() {
        let links = link_symbols_from_body("Chỉ số VNINDEX và ETF theo dõi USD, VND", None);
        assert!(links.is_empty());
    }

    #[test]
    fn known_tickers_filter_restricts_output() {
        let known = known(&["FPT"]);
        let links = link_symbols_from_body("FPT va HPG deu tang", Some(&known));
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].ticker, "FPT");
    }

    #[test]
    fn exchange_colon_pattern_is_recognized() {
        let links = link_symbols_from_body("HOSE: FPT dẫn đầu thanh khoản", None);
        let fpt = links.iter().find(|l| l.ticker == "FPT").expect("FPT present");
        assert_eq!(fpt.method, "body_exchange_colon");
        assert!((fpt.confidence - 0.92).abs() < 1e-9);
    }

    #[test]
    fn bare_token_gets_lowest_confidence() {
        let links = link_symbols_from_body("FPT la mot trong nhung co phieu dan dau", None);
        let fpt = links.iter().find(|l| l.ticker == "FPT").expect("FPT present");
        assert!((fpt.confidence - 0.60).abs() < 1e-9);
        assert_eq!(fpt.method, "body_token");
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let a = link_symbols_from_title("FPT (FPT) va HPG (HPG)", None);
        let b = link_symbols_from_title("FPT (FPT) va HPG (HPG)", None);
        assert_eq!(a, b);
    }
}
