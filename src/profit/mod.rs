//! 收益估算与排名

pub mod price;
pub mod units;

use crate::algo::AlgoCatalog;
use crate::benchmark::BenchmarkResults;
use crate::error::{OracleError, SwitchError};
use crate::hashrate;
use crate::pool::{AlgoQuote, QuoteField, QuoteTable};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::debug;

pub use price::{ExchangeRateCache, HttpPriceOracle, PriceOracle};
pub use units::{unit_scale, UnitClass};

/// 每日收益 (USD)
///
/// `rate` 为每 mBTC 的美元价格，`scale` 为该算法相对 MH/s 的计价系数。
pub fn revenue_per_day(
    quote: &AlgoQuote,
    field: QuoteField,
    hashrate: f64,
    scale: f64,
    rate: f64,
) -> f64 {
    quote.field(field) * field.mbtc_multiplier() * ((hashrate / 1_000_000.0) / scale) * rate
}

/// 各报价字段的收益估算
#[derive(Debug, Clone, PartialEq)]
pub struct RevenueEstimate {
    pub by_field: BTreeMap<QuoteField, f64>,
}

impl RevenueEstimate {
    pub fn get(&self, field: QuoteField) -> f64 {
        self.by_field.get(&field).copied().unwrap_or(0.0)
    }
}

/// 固定报价和汇率下的收益计算器，用于基准测试和会话监控
#[derive(Debug, Clone, PartialEq)]
pub struct RevenueProbe {
    quote: AlgoQuote,
    field: QuoteField,
    scale: f64,
    rate: f64,
}

impl RevenueProbe {
    pub fn new(quote: AlgoQuote, field: QuoteField, scale: f64, rate: f64) -> Self {
        Self { quote, field, scale, rate }
    }

    /// 给定算力 (H/s) 下的每日收益 (USD)
    pub fn revenue(&self, hashrate: f64) -> f64 {
        revenue_per_day(&self.quote, self.field, hashrate.max(0.0), self.scale, self.rate)
    }
}

/// 收益排名中的一行
#[derive(Debug, Clone, PartialEq)]
pub struct ProfitEntry {
    pub tool: String,
    pub endpoint: String,
    /// 矿工使用的算法名
    pub algo: String,
    /// 矿池使用的算法名
    pub endpoint_algo: String,
    pub hashrate: f64,
    /// 每日收益 (USD)，取自排名字段
    pub revenue: f64,
}

impl ProfitEntry {
    /// 判断是否为同一 (矿工, 矿池, 算法) 组合
    pub fn same_target(&self, other: &ProfitEntry) -> bool {
        self.tool == other.tool && self.endpoint == other.endpoint && self.algo == other.algo
    }
}

/// 按收益降序排列的收益表
#[derive(Debug, Clone, Default)]
pub struct ProfitTable {
    entries: Vec<ProfitEntry>,
}

impl ProfitTable {
    pub fn from_entries(mut entries: Vec<ProfitEntry>) -> Self {
        entries.sort_by(|a, b| {
            b.revenue
                .total_cmp(&a.revenue)
                .then_with(|| a.tool.cmp(&b.tool))
                .then_with(|| a.endpoint.cmp(&b.endpoint))
                .then_with(|| a.algo.cmp(&b.algo))
        });
        Self { entries }
    }

    pub fn top(&self) -> Option<&ProfitEntry> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[ProfitEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 渲染为文本表格
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<16} {:<12} {:<16} {:>14} {:>12}",
            "TOOL", "ENDPOINT", "ALGO", "HASHRATE", "USD/DAY"
        );
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "{:<16} {:<12} {:<16} {:>14} {:>12.5}",
                entry.tool,
                entry.endpoint,
                entry.algo,
                hashrate!(entry.hashrate),
                entry.revenue
            );
        }
        out
    }
}

/// 收益引擎
pub struct ProfitabilityEngine {
    prices: ExchangeRateCache,
    ranking_field: QuoteField,
    min_profit: f64,
    unit_overrides: BTreeMap<String, f64>,
}

impl ProfitabilityEngine {
    pub fn new(
        prices: ExchangeRateCache,
        ranking_field: QuoteField,
        min_profit: f64,
        unit_overrides: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            prices,
            ranking_field,
            min_profit,
            unit_overrides,
        }
    }

    pub fn ranking_field(&self) -> QuoteField {
        self.ranking_field
    }

    pub fn min_profit(&self) -> f64 {
        self.min_profit
    }

    pub async fn exchange_rate(&self) -> Result<f64, OracleError> {
        self.prices.rate().await
    }

    /// 用给定汇率估算所有报价字段的收益
    pub fn estimate_with_rate(
        &self,
        endpoint_algo: &str,
        quote: &AlgoQuote,
        hashrate: f64,
        rate: f64,
    ) -> RevenueEstimate {
        let scale = unit_scale(endpoint_algo, quote.mbtc_mh_factor, &self.unit_overrides);
        let by_field = QuoteField::ALL
            .iter()
            .map(|field| (*field, revenue_per_day(quote, *field, hashrate.max(0.0), scale, rate)))
            .collect();
        RevenueEstimate { by_field }
    }

    /// 估算某矿池某算法在给定算力下的收益；矿池不报价该算法时返回 None
    pub async fn estimate(
        &self,
        quotes: &QuoteTable,
        endpoint_algo: &str,
        hashrate: f64,
    ) -> Result<Option<RevenueEstimate>, OracleError> {
        let Some(quote) = quotes.get(endpoint_algo) else {
            return Ok(None);
        };
        let rate = self.exchange_rate().await?;
        Ok(Some(self.estimate_with_rate(endpoint_algo, quote, hashrate, rate)))
    }

    /// 为某矿池某算法生成收益计算器；矿池不报价该算法时返回 None
    pub async fn probe(
        &self,
        quotes: &QuoteTable,
        endpoint_algo: &str,
    ) -> Result<Option<RevenueProbe>, OracleError> {
        let Some(quote) = quotes.get(endpoint_algo) else {
            return Ok(None);
        };
        let rate = self.exchange_rate().await?;
        let scale = unit_scale(endpoint_algo, quote.mbtc_mh_factor, &self.unit_overrides);
        Ok(Some(RevenueProbe::new(quote.clone(), self.ranking_field, scale, rate)))
    }

    /// 为所有已测算法生成收益排名
    ///
    /// 低于 `min_profit` 的组合以及黑名单中的算法不会出现在结果中。
    pub async fn rank<'a>(
        &self,
        catalog: &AlgoCatalog,
        tools: impl IntoIterator<Item = (&'a str, &'a BenchmarkResults)>,
        endpoints: &[(&str, &QuoteTable)],
        blacklist: &[String],
    ) -> Result<ProfitTable, SwitchError> {
        let rate = self.exchange_rate().await?;
        let mut entries = Vec::new();

        for (tool, results) in tools {
            for (endpoint, quotes) in endpoints {
                let quoted = quotes.algos();
                for (algo, hashrate) in results.iter() {
                    if blacklist.iter().any(|b| b == algo) {
                        continue;
                    }
                    let Some(endpoint_algo) = catalog.resolve(algo, &quoted) else {
                        continue;
                    };
                    let Some(quote) = quotes.get(endpoint_algo) else {
                        continue;
                    };

                    let revenue = self
                        .estimate_with_rate(endpoint_algo, quote, hashrate, rate)
                        .get(self.ranking_field);
                    debug!("{} {} {} -> {:.5} USD/day", tool, endpoint, algo, revenue);

                    if revenue > self.min_profit {
                        entries.push(ProfitEntry {
                            tool: tool.to_string(),
                            endpoint: endpoint.to_string(),
                            algo: algo.to_string(),
                            endpoint_algo: endpoint_algo.to_string(),
                            hashrate,
                            revenue,
                        });
                    }
                }
            }
        }

        Ok(ProfitTable::from_entries(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profit::price::MockPriceOracle;
    use std::sync::Arc;

    fn quote(estimate_current: f64, factor: Option<f64>) -> AlgoQuote {
        AlgoQuote {
            estimate_current,
            estimate_last24h: estimate_current / 2.0,
            actual_last24h: estimate_current * 1000.0,
            mbtc_mh_factor: factor,
            port: 3333,
        }
    }

    fn engine(rate: f64, min_profit: f64) -> ProfitabilityEngine {
        let mut oracle = MockPriceOracle::new();
        oracle.expect_fetch_rate().returning(move || Ok(rate));
        ProfitabilityEngine::new(
            ExchangeRateCache::new(Arc::new(oracle), None),
            QuoteField::EstimateCurrent,
            min_profit,
            BTreeMap::new(),
        )
    }

    #[tokio::test]
    async fn test_concrete_revenue() {
        let mut quotes = BTreeMap::new();
        quotes.insert("x11".to_string(), quote(12.5, Some(1.0)));
        let table = QuoteTable::new(quotes);

        let estimate = engine(30.0, 0.0)
            .estimate(&table, "x11", 5_000_000.0)
            .await
            .unwrap()
            .unwrap();
        // 12.5 BTC/MH/天 × 1000 × 5 MH/s ÷ 1 × 30 USD/mBTC
        assert_eq!(estimate.get(QuoteField::EstimateCurrent), 1_875_000.0);
        assert_eq!(estimate.get(QuoteField::EstimateLast24h), 937_500.0);
        // actual_last24h 已是 mBTC 单位：12500 × 5 × 30
        assert_eq!(estimate.get(QuoteField::ActualLast24h), 1_875_000.0);
    }

    #[tokio::test]
    async fn test_revenue_linear_in_hashrate() {
        let mut quotes = BTreeMap::new();
        quotes.insert("lyra2z".to_string(), quote(0.00042, None));
        let table = QuoteTable::new(quotes);
        let engine = engine(61.37, 0.0);

        for hashrate in [1.0, 1_234.5, 987_654.321, 5_000_000.0] {
            let single = engine.estimate(&table, "lyra2z", hashrate).await.unwrap().unwrap();
            let double = engine.estimate(&table, "lyra2z", hashrate * 2.0).await.unwrap().unwrap();
            for field in QuoteField::ALL {
                assert_eq!(double.get(field), 2.0 * single.get(field));
            }
        }
    }

    #[tokio::test]
    async fn test_unquoted_algo_has_no_estimate() {
        let table = QuoteTable::default();
        assert!(engine(30.0, 0.0).estimate(&table, "x11", 1.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_probe_matches_ranking_field() {
        let mut quotes = BTreeMap::new();
        quotes.insert("x11".to_string(), quote(12.5, Some(1.0)));
        let table = QuoteTable::new(quotes);
        let engine = engine(30.0, 0.0);

        let probe = engine.probe(&table, "x11").await.unwrap().unwrap();
        assert_eq!(probe.revenue(5_000_000.0), 1_875_000.0);
        assert_eq!(probe.revenue(-1.0), 0.0);
        assert!(engine.probe(&table, "scrypt").await.unwrap().is_none());
    }

    #[test]
    fn test_scale_fallback_uses_unit_class() {
        let engine = engine(1.0, 0.0);
        // scrypt 按 GH/s 计价：1 GH/s × 1 mBTC/GH/天 = 1 USD
        let estimate =
            engine.estimate_with_rate("scrypt", &quote(0.001, None), 1_000_000_000.0, 1.0);
        assert!((estimate.get(QuoteField::EstimateCurrent) - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_rank_sorted_and_filtered() {
        let mut quotes = BTreeMap::new();
        quotes.insert("x11".to_string(), quote(0.002, Some(1.0)));
        quotes.insert("lyra2rev2".to_string(), quote(0.004, Some(1.0)));
        quotes.insert("yescrypt".to_string(), quote(0.0001, Some(1.0)));
        let table = QuoteTable::new(quotes);

        let mut results = BenchmarkResults::default();
        results.insert("x11", 1_000_000.0);
        results.insert("lyra2v2", 1_000_000.0);
        results.insert("yescrypt", 1_000_000.0);
        results.insert("scrypt", 1_000_000.0);
        results.insert("quark", 0.0);

        let catalog = AlgoCatalog::new(vec![vec!["lyra2v2".to_string(), "lyra2rev2".to_string()]]);
        // x11: 0.002×1000×1×1 = 2, lyra2v2: 4, yescrypt: 0.1
        let ranked = engine(1.0, 0.5)
            .rank(&catalog, [("cpuminer", &results)], &[("zpool", &table)], &[])
            .await
            .unwrap();

        let algos: Vec<_> = ranked.entries().iter().map(|e| e.algo.as_str()).collect();
        assert_eq!(algos, vec!["lyra2v2", "x11"]);
        assert_eq!(ranked.top().unwrap().endpoint_algo, "lyra2rev2");
        assert!(ranked.entries().windows(2).all(|w| w[0].revenue >= w[1].revenue));
    }

    #[tokio::test]
    async fn test_rank_respects_blacklist() {
        let mut quotes = BTreeMap::new();
        quotes.insert("x11".to_string(), quote(0.002, Some(1.0)));
        let table = QuoteTable::new(quotes);

        let mut results = BenchmarkResults::default();
        results.insert("x11", 1_000_000.0);

        let ranked = engine(1.0, 0.0)
            .rank(
                &AlgoCatalog::default(),
                [("cpuminer", &results)],
                &[("zpool", &table)],
                &["x11".to_string()],
            )
            .await
            .unwrap();
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn test_rank_fails_on_price_error() {
        let mut oracle = MockPriceOracle::new();
        oracle.expect_fetch_rate().returning(|| {
            Err(OracleError::Parse {
                source_name: "coindesk".to_string(),
                reason: "bad".to_string(),
            })
        });
        let engine = ProfitabilityEngine::new(
            ExchangeRateCache::new(Arc::new(oracle), None),
            QuoteField::EstimateCurrent,
            0.0,
            BTreeMap::new(),
        );

        let results = BenchmarkResults::default();
        let table = QuoteTable::default();
        let err = engine
            .rank(&AlgoCatalog::default(), [("cpuminer", &results)], &[("zpool", &table)], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::Oracle(_)));
    }

    #[test]
    fn test_render_contains_rows() {
        let table = ProfitTable::from_entries(vec![ProfitEntry {
            tool: "cpuminer".to_string(),
            endpoint: "zpool".to_string(),
            algo: "x11".to_string(),
            endpoint_algo: "x11".to_string(),
            hashrate: 1_234_567.0,
            revenue: 0.12345,
        }]);
        let rendered = table.render();
        assert!(rendered.contains("x11"));
        assert!(rendered.contains("1.235 MH/s"));
        assert!(rendered.contains("0.12345"));
    }
}
