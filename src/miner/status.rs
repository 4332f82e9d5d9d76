//! 矿工状态端口协议
//!
//! 连接后发送请求文本（默认 `summary`），读取到终止符（默认 `|`）为止。
//! 记录由 `;` 分隔的 `KEY=VALUE` 字段组成，关注 `HS`/`KHS`、`ACC`、`REJ`。

use crate::config::StatusConfig;
use crate::error::StatusError;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::debug;

/// 一次状态采样
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusSample {
    /// 当前算力 (H/s)
    pub hashrate: f64,
    pub accepted: u64,
    pub rejected: u64,
}

/// 状态端口客户端
#[derive(Debug, Clone)]
pub struct StatusClient {
    address: String,
    request: Vec<u8>,
    terminator: u8,
    attempts: u32,
    retry_delay: Duration,
    read_timeout: Duration,
}

impl StatusClient {
    pub fn from_config(config: &StatusConfig) -> Self {
        Self {
            address: config.address(),
            request: config.request.as_bytes().to_vec(),
            terminator: config.terminator_byte(),
            attempts: config.connect_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// 查询一次状态
    pub async fn query(&self) -> Result<StatusSample, StatusError> {
        let mut stream = self.connect().await?;

        let record = timeout(self.read_timeout, self.exchange(&mut stream))
            .await
            .map_err(|_| StatusError::Timeout {
                timeout_ms: self.read_timeout.as_millis() as u64,
            })??;

        parse_status_record(&record)
    }

    async fn connect(&self) -> Result<TcpStream, StatusError> {
        for attempt in 1..=self.attempts {
            match TcpStream::connect(&self.address).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(
                        "Status connect to {} failed (attempt {}/{}): {}",
                        self.address, attempt, self.attempts, e
                    );
                    if attempt < self.attempts {
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(StatusError::Unavailable {
            address: self.address.clone(),
            attempts: self.attempts,
        })
    }

    async fn exchange(&self, stream: &mut TcpStream) -> Result<String, StatusError> {
        let io_error = |e: std::io::Error| StatusError::Io { error: e.to_string() };

        stream.write_all(&self.request).await.map_err(io_error)?;

        let mut buffer = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            if let Some(end) = buffer.iter().position(|b| *b == self.terminator) {
                buffer.truncate(end);
                break;
            }

            let read = stream.read(&mut chunk).await.map_err(io_error)?;
            if read == 0 {
                return Err(StatusError::Malformed {
                    reason: "connection closed before terminator".to_string(),
                });
            }
            buffer.extend_from_slice(&chunk[..read]);
        }

        String::from_utf8(buffer).map_err(|e| StatusError::Malformed {
            reason: format!("record is not UTF-8: {}", e),
        })
    }
}

/// 解析状态记录；`HS` 优先，否则使用 `KHS` × 1000
pub fn parse_status_record(record: &str) -> Result<StatusSample, StatusError> {
    let fields: HashMap<&str, &str> = record
        .split(';')
        .filter_map(|field| field.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect();

    let hashrate = match (fields.get("HS"), fields.get("KHS")) {
        (Some(hs), _) => parse_number("HS", hs)?,
        (None, Some(khs)) => parse_number("KHS", khs)? * 1000.0,
        (None, None) => {
            return Err(StatusError::Malformed {
                reason: "missing HS/KHS".to_string(),
            })
        }
    };

    Ok(StatusSample {
        hashrate,
        accepted: parse_count(&fields, "ACC")?,
        rejected: parse_count(&fields, "REJ")?,
    })
}

fn parse_number(key: &str, value: &str) -> Result<f64, StatusError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| StatusError::Malformed {
            reason: format!("invalid {} value {:?}", key, value),
        })
}

fn parse_count(fields: &HashMap<&str, &str>, key: &str) -> Result<u64, StatusError> {
    let value = fields.get(key).ok_or_else(|| StatusError::Malformed {
        reason: format!("missing {}", key),
    })?;

    match value.parse::<u64>() {
        Ok(count) => Ok(count),
        Err(_) => parse_number(key, value).map(|count| count as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpuminer_summary() {
        let record = "NAME=cpuminer;VER=2.5;API=1.0;ALGO=x11;CPUS=4;KHS=1234.56;ACC=12;REJ=1;ACCMN=0.5;DIFF=0.01;UPTIME=120";
        let sample = parse_status_record(record).unwrap();
        assert!((sample.hashrate - 1_234_560.0).abs() < 1e-6);
        assert_eq!(sample.accepted, 12);
        assert_eq!(sample.rejected, 1);
    }

    #[test]
    fn test_hs_preferred_over_khs() {
        let sample = parse_status_record("HS=500;KHS=9;ACC=0;REJ=0").unwrap();
        assert_eq!(sample.hashrate, 500.0);
    }

    #[test]
    fn test_fields_ignore_order_and_noise() {
        let sample = parse_status_record("REJ=2; ACC=3 ;garbage;KHS=1.5;").unwrap();
        assert_eq!(sample, StatusSample { hashrate: 1500.0, accepted: 3, rejected: 2 });
    }

    #[test]
    fn test_missing_required_fields() {
        assert!(matches!(
            parse_status_record("ACC=1;REJ=0"),
            Err(StatusError::Malformed { .. })
        ));
        assert!(matches!(
            parse_status_record("KHS=1.0;REJ=0"),
            Err(StatusError::Malformed { reason }) if reason.contains("ACC")
        ));
        assert!(parse_status_record("KHS=abc;ACC=1;REJ=0").is_err());
        assert!(parse_status_record("KHS=-5;ACC=1;REJ=0").is_err());
    }

    #[test]
    fn test_fractional_counts_truncate() {
        let sample = parse_status_record("KHS=1;ACC=4.0;REJ=0").unwrap();
        assert_eq!(sample.accepted, 4);
    }
}
