//! News fetcher (C7 step 2/3, §4.7): dequeues `fetch_status='pending'`
//! articles, rate-limits outbound requests to `rate` req/s, downloads
//! HTML, extracts cleaned text, and retries once through a stubbed
//! headless-browser path when the plain fetch looks blocked or too thin.

use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::Result;
use governor::{Quota, RateLimiter};
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::config::NewsConfig;
use crate::domain::hashing::sha256_hex;
use crate::domain::repositories::ArticleRepository;
use crate::infra::source_client::{CallOptions, SourceClient};

/// CSS selectors preferred for body-text extraction before falling back
/// to stripping all tags (§4.7 step 2: "site-specific preferred classes,
/// fallback to generic tag-stripping").
const PREFERRED_BODY_SELECTORS: &[&str] = &["div.fck_detail", "div.article-content", "article"];

pub struct NewsFetcher {
    pub config: NewsConfig,
    pub client: SourceClient,
    pub articles: Arc<dyn ArticleRepository>,
    limiter: RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

#[derive(Debug, Default)]
pub struct FetchSummary {
    pub fetched: u32,
    pub failed: u32,
}

impl NewsFetcher {
    pub fn new(config: NewsConfig, client: SourceClient, articles: Arc<dyn ArticleRepository>) -> Self {
        let per_sec = config.rate_per_sec.max(0.1).round() as u32;
        let quota = Quota::per_second(NonZeroU32::new(per_sec.max(1)).unwrap());
        Self {
            config,
            client,
            articles,
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Dequeues up to `NewsConfig::fetch_batch_size` pending articles and
    /// fetches each one, one at a time, respecting the rate limiter
    /// between requests (§4.7 step 2).
    pub async fn run(&self) -> Result<FetchSummary> {
        let pending = self.articles.next_pending(self.config.fetch_batch_size).await?;
        let mut summary = FetchSummary::default();

        for article in pending {
            self.limiter.until_ready().await;
            match self.fetch_one(&article.url).await {
                Ok(()) => summary.fetched += 1,
                Err(e) => {
                    warn!(url = %article.url, error = %e, "article fetch failed");
                    self.articles.mark_failed(&article.url, &truncate(&e.to_string())).await?;
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn fetch_one(&self, url: &str) -> Result<()> {
        let opts = CallOptions {
            headers: vec![("user-agent".to_string(), self.config.user_agent.clone())],
            ..Default::default()
        };

        let response = self.client.get(url, &opts).await?;
        let looks_blocked = response.status == 403;
        let (text, method) = extract_text(&response.body);
        let word_count = text.split_whitespace().count() as i32;

        let (final_text, final_method, final_word_count) =
            if looks_blocked || word_count < self.config.min_word_count {
                info!(url, "plain fetch too thin or blocked; retrying via headless path");
                match self.fetch_via_headless(url).await {
                    Ok((t, wc)) => (t, "headless".to_string(), wc),
                    Err(_) => (text, method, word_count),
                }
            } else {
                (text, method, word_count)
            };

        if final_word_count < self.config.min_word_count {
            anyhow::bail!("extracted body too short ({final_word_count} words)");
        }

        let hash = sha256_hex(final_text.as_bytes());
        self.articles
            .mark_fetched(url, &final_text, &hash, final_word_count, None, &final_method)
            .await?;
        Ok(())
    }

    /// Headless-browser fallback. A real deployment shells out to a
    /// headless-relay endpoint configured via `NEWS_HEADLESS_RELAY_URL`;
    /// without one configured this simply reports not-available so the
    /// caller keeps the plain-fetch result.
    async fn fetch_via_headless(&self, url: &str) -> Result<(String, i32)> {
        let Some(relay) = &self.config.headless_relay_url else {
            anyhow::bail!("no headless relay configured");
        };
        let render_url = format!("{}/render?url={}", relay.trim_end_matches('/'), urlencoding_lite(url));
        let opts = CallOptions {
            headers: vec![("user-agent".to_string(), self.config.user_agent.clone())],
            timeout_ms: Some(30_000),
            ..Default::default()
        };
        let response = self.client.get(&render_url, &opts).await?;
        let (text, _) = extract_text(&response.body);
        let word_count = text.split_whitespace().count() as i32;
        Ok((text, word_count))
    }
}

fn urlencoding_lite(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn truncate(s: &str) -> String {
    const MAX: usize = 500;
    if s.chars().count() <= MAX {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(MAX).collect::<String>())
    }
}

/// Extracts cleaned article text: preferred-class body divs first, then
/// a generic whole-document tag-strip fallback. Returns `(text, method)`.
fn extract_text(html: &str) -> (String, String) {
    let doc = Html::parse_document(html);

    for sel in PREFERRED_BODY_SELECTORS {
        if let Ok(selector) = Selector::parse(sel)
            && let Some(el) = doc.select(&selector).next()
        {
            let text = el.text().collect::<Vec<_>>().join(" ");
            let cleaned = normalize_whitespace(&text);
            if !cleaned.is_empty() {
                return (cleaned, "http_preferred_selector".to_string());
            }
        }
    }

    let body_selector = Selector::parse("body").expect("'body' is a valid selector");
    let text = doc
        .select(&body_selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    (normalize_whitespace(&text), "http_generic_strip".to_string())
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_preferred_selector_first() {
        let html = r#"<html><body>
            <div class="article-content">Real article body text here with many words indeed.</div>
            <div>Sidebar junk</div>
        </body></html>"#;
        let (text, method) = extract_text(html);
        assert!(text.contains("Real article body"));
        assert_eq!(method, "http_preferred_selector");
    }

    #[test]
    fn falls_back_to_generic_body_strip() {
        let html = "<html><body><p>Just some plain paragraph text.</p></body></html>";
        let (text, method) = extract_text(html);
        assert!(text.contains("Just some plain paragraph text."));
        assert_eq!(method, "http_generic_strip");
    }

    #[test]
    fn normalize_whitespace_collapses_runs() {
        assert_eq!(normalize_whitespace("a   b\n\nc"), "a b c");
    }

    #[test]
    fn truncate_does_not_panic_on_multibyte_utf8() {
        let long = "bị chặn truy cập ".repeat(100);
        let out = truncate(&long);
        assert!(out.ends_with("..."));
    }
}
