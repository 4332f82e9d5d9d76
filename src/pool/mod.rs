pub mod quotes;

use crate::error::OracleError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub use quotes::{HttpQuoteOracle, QuoteOracle};

/// 报价字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteField {
    /// 实时估算 (BTC/MH/天)
    #[default]
    EstimateCurrent,
    /// 24小时估算 (BTC/MH/天)
    EstimateLast24h,
    /// 24小时实际 (mBTC/MH/天)
    ActualLast24h,
}

impl QuoteField {
    pub const ALL: [QuoteField; 3] = [
        QuoteField::EstimateCurrent,
        QuoteField::EstimateLast24h,
        QuoteField::ActualLast24h,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            QuoteField::EstimateCurrent => "estimate_current",
            QuoteField::EstimateLast24h => "estimate_last24h",
            QuoteField::ActualLast24h => "actual_last24h",
        }
    }

    /// 转换为 mBTC 的倍数
    pub fn mbtc_multiplier(&self) -> f64 {
        match self {
            QuoteField::EstimateCurrent | QuoteField::EstimateLast24h => 1000.0,
            QuoteField::ActualLast24h => 1.0,
        }
    }
}

/// 单个算法的矿池报价
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgoQuote {
    pub estimate_current: f64,
    pub estimate_last24h: f64,
    pub actual_last24h: f64,
    /// 矿池声明的单位系数，缺省时按算法类别推断
    pub mbtc_mh_factor: Option<f64>,
    pub port: u16,
}

impl AlgoQuote {
    pub fn field(&self, field: QuoteField) -> f64 {
        match field {
            QuoteField::EstimateCurrent => self.estimate_current,
            QuoteField::EstimateLast24h => self.estimate_last24h,
            QuoteField::ActualLast24h => self.actual_last24h,
        }
    }

    fn from_json(algo: &str, entry: &Value, source: &str) -> Result<Self, OracleError> {
        let number = |field: &str| -> Result<f64, OracleError> {
            let value = entry.get(field).ok_or_else(|| OracleError::MissingField {
                algo: algo.to_string(),
                field: field.to_string(),
            })?;
            json_number(value).ok_or_else(|| OracleError::Parse {
                source_name: source.to_string(),
                reason: format!("{}.{} is not numeric: {}", algo, field, value),
            })
        };

        let mbtc_mh_factor = match entry.get("mbtc_mh_factor") {
            None | Some(Value::Null) => None,
            Some(_) => Some(number("mbtc_mh_factor")?),
        };

        let port = number("port")?;
        if !(0.0..=u16::MAX as f64).contains(&port) || port.fract() != 0.0 {
            return Err(OracleError::Parse {
                source_name: source.to_string(),
                reason: format!("{}.port out of range: {}", algo, port),
            });
        }

        Ok(Self {
            estimate_current: number("estimate_current")?,
            estimate_last24h: number("estimate_last24h")?,
            actual_last24h: number("actual_last24h")?,
            mbtc_mh_factor,
            port: port as u16,
        })
    }
}

/// 矿池报价表 (矿池算法名 -> 报价)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteTable {
    quotes: BTreeMap<String, AlgoQuote>,
}

impl QuoteTable {
    pub fn new(quotes: BTreeMap<String, AlgoQuote>) -> Self {
        Self { quotes }
    }

    /// 解析报价接口返回的 JSON；任何字段无法解析都视为整体失败
    pub fn from_json(value: &Value, source: &str) -> Result<Self, OracleError> {
        let object = value.as_object().ok_or_else(|| OracleError::Parse {
            source_name: source.to_string(),
            reason: "expected a JSON object keyed by algorithm".to_string(),
        })?;

        let quotes = object
            .iter()
            .map(|(algo, entry)| {
                AlgoQuote::from_json(algo, entry, source).map(|q| (algo.clone(), q))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Self { quotes })
    }

    pub fn get(&self, algo: &str) -> Option<&AlgoQuote> {
        self.quotes.get(algo)
    }

    pub fn algos(&self) -> Vec<String> {
        self.quotes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

/// 矿池运行时状态（探测结果），与不可变的 EndpointConfig 分离
#[derive(Debug, Clone, Default)]
pub struct EndpointRuntime {
    pub quotes: QuoteTable,
}

impl EndpointRuntime {
    pub fn supported_algos(&self) -> Vec<String> {
        self.quotes.algos()
    }
}

/// 数字或数字字符串
fn json_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quote_table_from_json() {
        let payload = json!({
            "x11": {
                "estimate_current": "0.00001234",
                "estimate_last24h": 0.000011,
                "actual_last24h": "0.0102",
                "mbtc_mh_factor": 1000,
                "port": 3533
            },
            "yescrypt": {
                "estimate_current": 0.5,
                "estimate_last24h": 0.4,
                "actual_last24h": 380.0,
                "port": "6233"
            }
        });

        let table = QuoteTable::from_json(&payload, "zpool").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.algos(), vec!["x11", "yescrypt"]);

        let x11 = table.get("x11").unwrap();
        assert_eq!(x11.estimate_current, 0.00001234);
        assert_eq!(x11.mbtc_mh_factor, Some(1000.0));
        assert_eq!(x11.port, 3533);

        let yescrypt = table.get("yescrypt").unwrap();
        assert_eq!(yescrypt.mbtc_mh_factor, None);
        assert_eq!(yescrypt.port, 6233);
        assert_eq!(yescrypt.field(QuoteField::ActualLast24h), 380.0);
    }

    #[test]
    fn test_non_numeric_field_fails_whole_table() {
        let payload = json!({
            "x11": {
                "estimate_current": "n/a",
                "estimate_last24h": 0.1,
                "actual_last24h": 0.1,
                "port": 3533
            }
        });

        let err = QuoteTable::from_json(&payload, "zpool").unwrap_err();
        assert!(matches!(err, OracleError::Parse { .. }));
    }

    #[test]
    fn test_missing_field_fails() {
        let payload = json!({ "x11": { "estimate_current": 0.1, "port": 3533 } });
        let err = QuoteTable::from_json(&payload, "zpool").unwrap_err();
        assert!(matches!(
            err,
            OracleError::MissingField { ref field, .. } if field == "estimate_last24h"
        ));
    }

    #[test]
    fn test_non_object_payload() {
        assert!(QuoteTable::from_json(&json!([1, 2, 3]), "zpool").is_err());
    }

    #[test]
    fn test_quote_field_serde_names() {
        let field: QuoteField = serde_json::from_str("\"actual_last24h\"").unwrap();
        assert_eq!(field, QuoteField::ActualLast24h);
        assert_eq!(QuoteField::EstimateLast24h.key(), "estimate_last24h");
        assert_eq!(QuoteField::default(), QuoteField::EstimateCurrent);
    }
}
