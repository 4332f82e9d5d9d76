#![allow(dead_code)]

use async_trait::async_trait;
use hashswitch::config::{Config, EndpointConfig};
use hashswitch::error::{OracleError, StatusError, SupervisorError};
use hashswitch::miner::{LaunchCommand, MinerSupervisor, ProcessHandle, ProcessState, StatusSample};
use hashswitch::pool::{AlgoQuote, QuoteOracle, QuoteTable};
use hashswitch::profit::PriceOracle;
use mockall::mock;
use std::path::Path;
use tokio::time::Instant;

mock! {
    pub Supervisor {}

    #[async_trait]
    impl MinerSupervisor for Supervisor {
        async fn start(
            &mut self,
            command: &LaunchCommand,
        ) -> Result<ProcessHandle, SupervisorError>;
        async fn stop(&mut self, handle: &ProcessHandle) -> Result<(), SupervisorError>;
        async fn is_alive(&mut self) -> bool;
        fn state(&self) -> &ProcessState;
        async fn query_status(&self) -> Result<StatusSample, StatusError>;
    }
}

mock! {
    pub Quotes {}

    #[async_trait]
    impl QuoteOracle for Quotes {
        async fn fetch_quotes(&self, endpoint: &EndpointConfig) -> Result<QuoteTable, OracleError>;
    }
}

mock! {
    pub Price {}

    #[async_trait]
    impl PriceOracle for Price {
        async fn fetch_rate(&self) -> Result<f64, OracleError>;
    }
}

/// 固定汇率 1 USD/mBTC
pub fn flat_price() -> MockPrice {
    let mut price = MockPrice::new();
    price.expect_fetch_rate().returning(|| Ok(1.0));
    price
}

/// 以 MH/s 计价的报价表，`estimate_current` 单位为 BTC/MH/天
pub fn quotes(entries: &[(&str, f64)]) -> QuoteTable {
    QuoteTable::new(
        entries
            .iter()
            .map(|(algo, estimate)| {
                let quote = AlgoQuote {
                    estimate_current: *estimate,
                    estimate_last24h: *estimate,
                    actual_last24h: estimate * 1000.0,
                    mbtc_mh_factor: Some(1.0),
                    port: 3333,
                };
                (algo.to_string(), quote)
            })
            .collect(),
    )
}

pub fn handle(id: u64, command: &LaunchCommand) -> ProcessHandle {
    ProcessHandle {
        id,
        pid: Some(1000 + id as u32),
        command: command.clone(),
        started_at: Instant::now(),
    }
}

/// 单矿工单矿池的测试配置
pub fn test_config(results_dir: &Path, algos: &[&str]) -> Config {
    let mut config = Config::default();
    config.general.results_dir = results_dir.to_path_buf();
    config.tools[0].std_algos = algos.iter().map(|a| a.to_string()).collect();
    config.switching.min_profit = 0.01;
    config.benchmark.min_shares = 3;
    config.benchmark.grace_period_secs = 5;
    config
}

pub fn has_arg(command: &LaunchCommand, arg: &str) -> bool {
    command.args.iter().any(|a| a == arg)
}
