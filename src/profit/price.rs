//! BTC 汇率获取与缓存

use crate::error::OracleError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// 汇率来源，返回每 mBTC 的美元价格
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn fetch_rate(&self) -> Result<f64, OracleError>;
}

/// coindesk 风格的 HTTP 价格接口
pub struct HttpPriceOracle {
    client: reqwest::Client,
    url: String,
}

impl HttpPriceOracle {
    pub fn new(url: String, timeout: Duration) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Request {
                url: url.clone(),
                error: e.to_string(),
            })?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn fetch_rate(&self) -> Result<f64, OracleError> {
        let payload: Value = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OracleError::Request {
                url: self.url.clone(),
                error: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| OracleError::Parse {
                source_name: self.url.clone(),
                reason: e.to_string(),
            })?;

        parse_mbtc_price(&payload, &self.url)
    }
}

/// 解析 `bpi.USD.rate`（如 "63,123.4567"），去掉千位分隔符后换算为每 mBTC 价格
pub fn parse_mbtc_price(payload: &Value, source: &str) -> Result<f64, OracleError> {
    let parse_error = |reason: String| OracleError::Parse {
        source_name: source.to_string(),
        reason,
    };

    let rate = payload
        .pointer("/bpi/USD/rate")
        .and_then(Value::as_str)
        .ok_or_else(|| parse_error("missing bpi.USD.rate".to_string()))?;

    let cleaned: String = rate.chars().filter(|c| *c != ',').collect();
    let btc_price = cleaned
        .trim()
        .parse::<f64>()
        .map_err(|e| parse_error(format!("invalid rate {:?}: {}", rate, e)))?;

    if !btc_price.is_finite() || btc_price <= 0.0 {
        return Err(parse_error(format!("non-positive rate {:?}", rate)));
    }

    Ok(btc_price / 1000.0)
}

/// 汇率缓存
///
/// `refresh_interval` 为 None 时只获取一次，之后一直使用该值。
pub struct ExchangeRateCache {
    oracle: Arc<dyn PriceOracle>,
    refresh_interval: Option<Duration>,
    cached: Mutex<Option<(f64, Instant)>>,
}

impl ExchangeRateCache {
    pub fn new(oracle: Arc<dyn PriceOracle>, refresh_interval: Option<Duration>) -> Self {
        Self {
            oracle,
            refresh_interval,
            cached: Mutex::new(None),
        }
    }

    /// 当前汇率 (USD/mBTC)
    pub async fn rate(&self) -> Result<f64, OracleError> {
        let mut cached = self.cached.lock().await;

        if let Some((rate, fetched_at)) = *cached {
            let fresh = match self.refresh_interval {
                None => true,
                Some(interval) => fetched_at.elapsed() < interval,
            };
            if fresh {
                return Ok(rate);
            }
            debug!("Exchange rate is stale, refreshing");
        }

        let rate = self.oracle.fetch_rate().await?;
        info!("Exchange rate updated: {:.4} USD/mBTC", rate);
        *cached = Some((rate, Instant::now()));
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_price_with_grouping() {
        let payload = json!({ "bpi": { "USD": { "code": "USD", "rate": "30,000.0000" } } });
        assert_eq!(parse_mbtc_price(&payload, "coindesk").unwrap(), 30.0);
    }

    #[test]
    fn test_parse_price_errors() {
        let missing = json!({ "bpi": {} });
        assert!(parse_mbtc_price(&missing, "coindesk").is_err());

        let garbage = json!({ "bpi": { "USD": { "rate": "thirty" } } });
        assert!(matches!(
            parse_mbtc_price(&garbage, "coindesk"),
            Err(OracleError::Parse { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_fetches_once_without_refresh() {
        let mut oracle = MockPriceOracle::new();
        oracle.expect_fetch_rate().times(1).returning(|| Ok(30.0));

        let cache = ExchangeRateCache::new(Arc::new(oracle), None);
        assert_eq!(cache.rate().await.unwrap(), 30.0);
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(cache.rate().await.unwrap(), 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_refreshes_after_interval() {
        let mut oracle = MockPriceOracle::new();
        let mut seq = mockall::Sequence::new();
        oracle.expect_fetch_rate().times(1).in_sequence(&mut seq).returning(|| Ok(30.0));
        oracle.expect_fetch_rate().times(1).in_sequence(&mut seq).returning(|| Ok(45.0));

        let cache = ExchangeRateCache::new(Arc::new(oracle), Some(Duration::from_secs(600)));
        assert_eq!(cache.rate().await.unwrap(), 30.0);

        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(cache.rate().await.unwrap(), 30.0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.rate().await.unwrap(), 45.0);
    }

    #[tokio::test]
    async fn test_cache_propagates_failure() {
        let mut oracle = MockPriceOracle::new();
        oracle.expect_fetch_rate().returning(|| {
            Err(OracleError::Parse {
                source_name: "coindesk".to_string(),
                reason: "bad".to_string(),
            })
        });

        let cache = ExchangeRateCache::new(Arc::new(oracle), None);
        assert!(cache.rate().await.is_err());
    }
}
