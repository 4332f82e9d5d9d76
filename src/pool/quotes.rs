use crate::config::EndpointConfig;
use crate::error::OracleError;
use crate::pool::QuoteTable;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// 矿池报价来源
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteOracle: Send + Sync {
    /// 获取矿池的算法报价表
    async fn fetch_quotes(&self, endpoint: &EndpointConfig) -> Result<QuoteTable, OracleError>;
}

/// 通过矿池 HTTP 状态接口获取报价
pub struct HttpQuoteOracle {
    client: reqwest::Client,
}

impl HttpQuoteOracle {
    pub fn new(timeout: Duration) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Request {
                url: String::new(),
                error: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl QuoteOracle for HttpQuoteOracle {
    async fn fetch_quotes(&self, endpoint: &EndpointConfig) -> Result<QuoteTable, OracleError> {
        debug!("Fetching quotes for {} from {}", endpoint.name, endpoint.api_url);

        let request_error = |e: reqwest::Error| OracleError::Request {
            url: endpoint.api_url.clone(),
            error: e.to_string(),
        };

        let payload: serde_json::Value = self
            .client
            .get(&endpoint.api_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(request_error)?
            .json()
            .await
            .map_err(|e| OracleError::Parse {
                source_name: endpoint.name.clone(),
                reason: e.to_string(),
            })?;

        QuoteTable::from_json(&payload, &endpoint.name)
    }
}
