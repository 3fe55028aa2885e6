//! Third-party OHLCV fetch boundary (C4 composed for C5). The concrete
//! price-data endpoint is an external collaborator out of scope for this
//! system (spec.md §1); `CandleSource` is the seam the worker depends on
//! so the wire shape of any one provider never leaks into `application`.

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::errors::SourceError;
use crate::domain::model::{Candle, Timeframe};
use crate::infra::source_client::{CallOptions, SourceClient};

#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetches up to `limit` bars for `ticker`/`tf` with `ts_ms >= from_ms`,
    /// oldest-first, so repeated pages walk forward toward `now`.
    async fn fetch_page(
        &self,
        ticker: &str,
        tf: Timeframe,
        from_ms: i64,
        limit: i64,
    ) -> Result<Vec<Candle>, SourceError>;
}

/// Wire row shape: `try JSON, fall back to raw text` (§4.4) means the
/// caller already has the parsed `Value`; this is just the known-good
/// array-of-objects shape this source emits when parsing succeeds.
#[derive(Debug, Deserialize)]
struct WireBar {
    #[serde(rename = "t")]
    ts_ms: i64,
    #[serde(rename = "o")]
    o: f64,
    #[serde(rename = "h")]
    h: f64,
    #[serde(rename = "l")]
    l: f64,
    #[serde(rename = "c")]
    c: f64,
    #[serde(rename = "v")]
    v: Option<f64>,
}

pub struct HttpCandleSource {
    client: SourceClient,
    base_url: String,
    bearer_token: Option<String>,
    source_name: String,
}

impl HttpCandleSource {
    pub fn new(
        client: SourceClient,
        base_url: String,
        bearer_token: Option<String>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url,
            bearer_token,
            source_name: source_name.into(),
        }
    }
}

#[async_trait]
impl CandleSource for HttpCandleSource {
    async fn fetch_page(
        &self,
        ticker: &str,
        tf: Timeframe,
        from_ms: i64,
        limit: i64,
    ) -> Result<Vec<Candle>, SourceError> {
        let url = format!("{}/candles", self.base_url.trim_end_matches('/'));
        let opts = CallOptions {
            bearer_token: self.bearer_token.clone(),
            query: vec![
                ("ticker".to_string(), ticker.to_string()),
                ("tf".to_string(), tf.as_str().to_string()),
                ("from".to_string(), from_ms.to_string()),
                ("limit".to_string(), limit.to_string()),
            ],
            ..Default::default()
        };

        let response = self.client.get(&url, &opts).await?;

        let bars: Vec<WireBar> = match &response.json {
            Some(serde_json::Value::Array(_)) | Some(serde_json::Value::Object(_)) => {
                serde_json::from_value(
                    response
                        .json
                        .clone()
                        .unwrap()
                        .get("bars")
                        .cloned()
                        .unwrap_or(response.json.clone().unwrap()),
                )
                .map_err(|e| SourceError::Transient {
                    status: Some(response.status),
                    message: format!("unexpected candle payload shape: {e}"),
                })?
            }
            _ => {
                return Err(SourceError::Transient {
                    status: Some(response.status),
                    message: format!("non-JSON candle response: {}", response.body),
                });
            }
        };

        Ok(bars
            .into_iter()
            .map(|b| Candle {
                ticker: ticker.to_string(),
                tf,
                ts_ms: b.ts_ms,
                o: b.o,
                h: b.h,
                l: b.l,
                c: b.c,
                v: b.v,
                source: Some(self.source_name.clone()),
                ingested_at: None,
            })
            .collect())
    }
}
