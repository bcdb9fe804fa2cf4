//! Active window discovery via the Gamma API.
//!
//! The 15-minute up/down markets use predictable slugs
//! (`btc-updown-15m-<window start>`), so discovery first probes computed
//! candidate slugs for the current and upcoming windows, then falls back to
//! scanning the open-market listing, then to a configured slug override.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::{parse_window_start, MarketId, MarketWindow, TokenId, WINDOW_SECS};
use crate::error::{Error, Result};
use crate::exchange::PairDiscovery;

/// Slug prefix for the 15-minute BTC up/down series.
pub const SLUG_PREFIX: &str = "btc-updown-15m-";

/// How many upcoming windows to probe by computed slug.
const CANDIDATE_WINDOWS: i64 = 7;

/// Market payload from the Gamma API.
///
/// `clobTokenIds` and `outcomes` arrive as JSON-encoded strings inside the
/// JSON document.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaMarket {
    pub id: Option<String>,
    pub slug: Option<String>,
    pub question: Option<String>,
    #[serde(rename = "clobTokenIds")]
    pub clob_token_ids: Option<String>,
}

/// Build a [`MarketWindow`] from a Gamma market payload.
///
/// Requires a binary market: exactly two CLOB tokens, first UP, second DOWN.
pub fn window_from_market(market: &GammaMarket) -> Result<MarketWindow> {
    let slug = market
        .slug
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Discovery("market payload missing slug".into()))?;
    let raw_tokens = market
        .clob_token_ids
        .as_deref()
        .ok_or_else(|| Error::Discovery(format!("market {slug} has no clob tokens")))?;
    let token_ids: Vec<String> = serde_json::from_str(raw_tokens)
        .map_err(|e| Error::Discovery(format!("market {slug} token list unreadable: {e}")))?;

    if token_ids.len() != 2 {
        return Err(Error::Discovery(format!(
            "market {slug} is not binary ({} tokens)",
            token_ids.len()
        )));
    }

    Ok(MarketWindow::new(
        slug,
        MarketId::from(market.id.clone().unwrap_or_default()),
        TokenId::from(token_ids[0].clone()),
        TokenId::from(token_ids[1].clone()),
    ))
}

/// Candidate slugs for the window containing `now` and the next few.
#[must_use]
pub fn candidate_slugs(now_unix: i64) -> Vec<String> {
    let bucket = now_unix - now_unix.rem_euclid(WINDOW_SECS);
    (0..CANDIDATE_WINDOWS)
        .map(|i| format!("{SLUG_PREFIX}{}", bucket + i * WINDOW_SECS))
        .collect()
}

/// Gamma-backed discovery of the active up/down pair.
pub struct SlugDiscovery {
    http: HttpClient,
    gamma_url: String,
    fallback_slug: Option<String>,
}

impl SlugDiscovery {
    #[must_use]
    pub fn new(gamma_url: String, fallback_slug: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            gamma_url,
            fallback_slug,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });

        Self {
            http,
            gamma_url: config.network.gamma_api_url.clone(),
            fallback_slug: config.market.slug.clone(),
        }
    }

    /// Fetch one market by slug.
    async fn fetch_market(&self, slug: &str) -> Result<MarketWindow> {
        let url = format!("{}/markets?slug={slug}", self.gamma_url);
        let markets: Vec<GammaMarket> = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let market = markets
            .iter()
            .find(|m| m.slug.as_deref() == Some(slug))
            .ok_or_else(|| Error::Discovery(format!("slug {slug} not listed")))?;
        window_from_market(market)
    }

    async fn find_via_computed(&self, now_unix: i64) -> Option<MarketWindow> {
        for slug in candidate_slugs(now_unix) {
            match self.fetch_market(&slug).await {
                Ok(window) if !window.is_closed(now_unix) => return Some(window),
                Ok(_) => continue,
                Err(e) => {
                    debug!(slug = %slug, error = %e, "Candidate slug not available");
                }
            }
        }
        None
    }

    async fn find_via_listing(&self, now_unix: i64) -> Option<MarketWindow> {
        let url = format!("{}/markets?closed=false&limit=500", self.gamma_url);
        let markets: Vec<GammaMarket> = match async {
            Ok::<_, Error>(
                self.http
                    .get(&url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?,
            )
        }
        .await
        {
            Ok(markets) => markets,
            Err(e) => {
                warn!(error = %e, "Market listing fetch failed");
                return None;
            }
        };

        let mut candidates: Vec<(i64, &GammaMarket)> = markets
            .iter()
            .filter_map(|m| {
                let slug = m.slug.as_deref()?;
                if !slug.starts_with(SLUG_PREFIX) {
                    return None;
                }
                parse_window_start(slug).map(|ts| (ts, m))
            })
            .collect();

        // prefer still-open windows, newest first
        candidates.sort_by_key(|(ts, _)| {
            let open = now_unix < ts + WINDOW_SECS;
            (std::cmp::Reverse(open), std::cmp::Reverse(*ts))
        });

        let (_, market) = candidates.first()?;
        window_from_market(market).ok()
    }
}

#[async_trait]
impl PairDiscovery for SlugDiscovery {
    async fn find_active_pair(&self) -> Result<MarketWindow> {
        let now_unix = Utc::now().timestamp();

        if let Some(window) = self.find_via_computed(now_unix).await {
            return Ok(window);
        }
        if let Some(window) = self.find_via_listing(now_unix).await {
            return Ok(window);
        }
        if let Some(slug) = &self.fallback_slug {
            if let Ok(window) = self.fetch_market(slug).await {
                return Ok(window);
            }
        }

        Err(Error::Discovery(
            "no active up/down window found via computed slugs or listing".into(),
        ))
    }
}
