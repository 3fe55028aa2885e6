//! News discovery (C7 step 1, §4.7): RSS-cache/relay-backed link discovery
//! plus category-listing pagination. The upstream blocks certain
//! user-agents directly, so every fetch here goes through a local
//! RSS-cache/relay rather than the publisher's origin (§4.7 intro).

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::config::NewsConfig;
use crate::domain::repositories::{ArticleRepository, NewsCrawlRepository};
use crate::domain::model::{CrawlState, Seed};
use crate::infra::source_client::{CallOptions, SourceClient};

pub struct NewsDiscoverer {
    pub config: NewsConfig,
    pub client: SourceClient,
    pub articles: Arc<dyn ArticleRepository>,
    pub crawl: Arc<dyn NewsCrawlRepository>,
}

#[derive(Debug, Default)]
pub struct DiscoverSummary {
    pub feeds_checked: u32,
    pub seeds_checked: u32,
    pub articles_discovered: u32,
    pub seeds_completed: u32,
}

impl NewsDiscoverer {
    /// Runs discovery over every enabled seed once (§4.7 step 1).
    pub async fn run(&self) -> Result<DiscoverSummary> {
        let mut summary = DiscoverSummary::default();
        let seeds = self.crawl.list_enabled_seeds().await?;

        for seed in &seeds {
            summary.seeds_checked += 1;
            match self.discover_seed(seed).await {
                Ok(discovered) => {
                    summary.articles_discovered += discovered;
                }
                Err(e) => warn!(seed = %seed.seed_url, error = %e, "seed discovery failed"),
            }
        }

        if !seeds.is_empty() {
            let mut all_done = true;
            for seed in &seeds {
                match self.crawl.get_crawl_state(&seed.seed_url).await? {
                    Some(state) if state.done => {}
                    _ => {
                        all_done = false;
                        break;
                    }
                }
            }
            if all_done {
                self.crawl.kv_set("backfill.done", "true").await?;
                info!("all seeds exhausted; backfill.done=true");
            }
        }

        Ok(summary)
    }

    async fn discover_seed(&self, seed: &Seed) -> Result<u32> {
        let mut state = self
            .crawl
            .get_crawl_state(&seed.seed_url)
            .await?
            .unwrap_or(CrawlState {
                seed_url: seed.seed_url.clone(),
                next_page: 1,
                done: false,
                no_new_pages_count: 0,
                oldest_seen_published_at: None,
                last_error: None,
            });

        if state.done {
            return Ok(0);
        }

        let page = state.next_page;
        let url = match &seed.channel_id {
            Some(channel) => format!(
                "{}/{}?channel_id={}&page={}",
                self.config.relay_base_url.trim_end_matches('/'),
                seed.seed_url.trim_start_matches('/'),
                channel,
                page
            ),
            None => format!(
                "{}/{}?page={}",
                self.config.relay_base_url.trim_end_matches('/'),
                seed.seed_url.trim_start_matches('/'),
                page
            ),
        };

        let opts = CallOptions {
            headers: vec![("user-agent".to_string(), self.config.user_agent.clone())],
            ..Default::default()
        };

        let response = self.client.get(&url, &opts).await.context("fetching seed page")?;
        let links = extract_article_links(&response.body);

        let mut new_count = 0u32;
        for (link, title) in &links {
            let inserted = self
                .articles
                .upsert_discovered(link, "rss", title, None, Some(&seed.seed_url))
                .await?;
            if inserted {
                new_count += 1;
            }
        }

        let just_finished = advance_page_state(
            &mut state,
            new_count,
            !links.is_empty(),
            self.config.consecutive_empty_pages_to_finish,
        );

        if just_finished {
            self.crawl.mark_seed_done(&seed.seed_url).await?;
            info!(seed = %seed.seed_url, "seed exhausted after consecutive empty pages");
        }

        self.crawl.upsert_crawl_state(&state).await?;
        Ok(new_count)
    }

    /// Parses a cached RSS feed and discovers any article links not yet
    /// known (§4.7 step 1, feed form).
    pub async fn discover_feed(&self, feed_url: &str) -> Result<u32> {
        let opts = CallOptions {
            headers: vec![("user-agent".to_string(), self.config.user_agent.clone())],
            ..Default::default()
        };
        let response = self
            .client
            .get(feed_url, &opts)
            .await
            .context("fetching rss feed")?;

        let channel = rss::Channel::read_from(response.body.as_bytes()).context("parsing rss feed")?;

        let mut discovered = 0u32;
        let mut newest_published: Option<DateTime<Utc>> = None;

        for item in channel.items() {
            let (Some(link), Some(title)) = (item.link(), item.title()) else {
                continue;
            };
            let published_at = item
                .pub_date()
                .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
                .map(|dt| dt.with_timezone(&Utc));

            if let Some(p) = published_at {
                newest_published = Some(newest_published.map_or(p, |n| n.max(p)));
            }

            self.articles
                .upsert_discovered(link, "rss", title, published_at, Some(feed_url))
                .await?;
            discovered += 1;
        }

        self.crawl.touch_feed(feed_url, newest_published).await?;
        Ok(discovered)
    }
}

/// Advances `state.next_page`/`no_new_pages_count` for one fetched page
/// and marks `done` once `threshold` consecutive pages in a row yielded
/// zero *newly inserted* URLs (§4.7 step 1). A page that is non-empty but
/// entirely duplicates (e.g. a relay clamping past the true last page)
/// must still count toward the threshold, not reset it. Returns whether
/// this call is the one that flipped `done`.
fn advance_page_state(state: &mut CrawlState, new_count: u32, page_had_links: bool, threshold: i32) -> bool {
    if new_count == 0 {
        state.no_new_pages_count += 1;
    } else {
        state.no_new_pages_count = 0;
    }
    if page_had_links {
        state.next_page += 1;
    }

    if !state.done && state.no_new_pages_count >= threshold {
        state.done = true;
        return true;
    }
    false
}

/// Extracts `(href, text)` pairs from anchor tags, preferring a handful of
/// common article-link CSS classes before falling back to any anchor with
/// non-trivial text (§4.7: "extract article links").
fn extract_article_links(html: &str) -> Vec<(String, String)> {
    let doc = Html::parse_document(html);
    const PREFERRED_SELECTORS: &[&str] = &["a.article-link", "a.box-category-link-title", "h3 a", "h2 a"];

    for sel in PREFERRED_SELECTORS {
        if let Ok(selector) = Selector::parse(sel) {
            let found: Vec<(String, String)> = doc
                .select(&selector)
                .filter_map(|el| {
                    let href = el.value().attr("href")?.to_string();
                    let text = el.text().collect::<String>().trim().to_string();
                    (!text.is_empty()).then_some((href, text))
                })
                .collect();
            if !found.is_empty() {
                return found;
            }
        }
    }

    let generic = Selector::parse("a").expect("'a' is a valid selector");
    doc.select(&generic)
        .filter_map(|el| {
            let href = el.value().attr("href")?.to_string();
            let text = el.text().collect::<String>().trim().to_string();
            (!text.is_empty() && text.len() > 10).then_some((href, text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_links_from_preferred_class() {
        let html = r#"<html><body>
            <a class="article-link" href="/a/1">First headline here</a>
            <a class="article-link" href="/a/2">Second headline here</a>
        </body></html>"#;
        let links = extract_article_links(html);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].0, "/a/1");
    }

    #[test]
    fn falls_back_to_generic_anchors_when_no_preferred_class_matches() {
        let html = r#"<html><body>
            <a href="/x/1">A reasonably long headline text</a>
            <a href="/nav">Home</a>
        </body></html>"#;
        let links = extract_article_links(html);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].0, "/x/1");
    }

    fn fresh_state() -> CrawlState {
        CrawlState {
            seed_url: "seed".to_string(),
            next_page: 1,
            done: false,
            no_new_pages_count: 0,
            oldest_seen_published_at: None,
            last_error: None,
        }
    }

    #[test]
    fn all_duplicate_page_counts_toward_no_new_pages_even_though_nonempty() {
        let mut state = fresh_state();
        // A relay clamps page 4+ to a repeat of the last real page: links
        // are present but every upsert reports "already known".
        for _ in 0..3 {
            advance_page_state(&mut state, 0, true, 3);
        }
        assert!(state.done);
    }

    #[test]
    fn fresh_urls_reset_the_counter() {
        let mut state = fresh_state();
        advance_page_state(&mut state, 0, true, 3);
        advance_page_state(&mut state, 0, true, 3);
        advance_page_state(&mut state, 5, true, 3);
        assert_eq!(state.no_new_pages_count, 0);
        assert!(!state.done);
    }

    #[test]
    fn empty_page_with_no_links_still_counts() {
        let mut state = fresh_state();
        for _ in 0..3 {
            advance_page_state(&mut state, 0, false, 3);
        }
        assert!(state.done);
        // next_page must not advance once the page itself is empty.
        assert_eq!(state.next_page, 1);
    }
}
