//! 收益切换控制器
//!
//! 状态流转：`Idle → Benchmarking → Running ⇄ ReEvaluating`。
//! 每个会话结束时重新排名，只有排名第一的 (矿工, 矿池, 算法) 变化时才重启矿工。

use crate::algo::{discover_capabilities, AlgoCatalog};
use crate::benchmark::{
    BenchmarkEngine, BenchmarkSettings, BenchmarkTarget, ResultsStore, ToolRuntime, POLL_INTERVAL,
};
use crate::config::Config;
use crate::error::SwitchError;
use crate::miner::{
    build_launch_command, ConnectionParams, MinerSupervisor, ProcessHandle, ProcessState,
};
use crate::pool::{EndpointRuntime, QuoteOracle, QuoteTable};
use crate::profit::{ExchangeRateCache, PriceOracle, ProfitEntry, ProfitTable, ProfitabilityEngine};
use crate::{hashrate, switch_info, switch_warn};
use chrono::{DateTime, Local};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// 会话中每隔多少次采样输出一次汇总
const SESSION_REPORT_EVERY: u32 = 60;

/// 当前运行的挖矿会话
#[derive(Debug, Clone, PartialEq)]
pub struct RunningSession {
    pub entry: ProfitEntry,
    pub handle: ProcessHandle,
}

impl RunningSession {
    pub fn started_at(&self) -> Instant {
        self.handle.started_at
    }
}

/// 控制器状态
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerState {
    Idle,
    Benchmarking,
    Running(RunningSession),
    ReEvaluating { previous: Option<RunningSession> },
}

impl ControllerState {
    pub fn session(&self) -> Option<&RunningSession> {
        match self {
            ControllerState::Running(session) => Some(session),
            ControllerState::ReEvaluating { previous } => previous.as_ref(),
            ControllerState::Idle | ControllerState::Benchmarking => None,
        }
    }

    fn settle(session: Option<RunningSession>) -> Self {
        match session {
            Some(session) => ControllerState::Running(session),
            None => ControllerState::Idle,
        }
    }
}

/// 一次重新评估的结果
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchDecision {
    /// 排名第一未变化，不重启
    Keep(ProfitEntry),
    /// 切换到新的组合
    Switch { from: Option<ProfitEntry>, to: ProfitEntry },
    /// 排名未变化但矿工已退出，重新启动
    Restart(ProfitEntry),
    /// 收益表为空，保持现状
    NoCandidate,
}

/// 切换记录
#[derive(Debug, Clone)]
pub struct SwitchEvent {
    pub timestamp: DateTime<Local>,
    pub from: Option<String>,
    pub to: String,
    /// 切换时的每日收益估算 (USD)
    pub revenue: f64,
}

fn describe(entry: &ProfitEntry) -> String {
    format!("{}/{}@{}", entry.tool, entry.algo, entry.endpoint)
}

/// 收益切换控制器
pub struct SwitchController<S: MinerSupervisor> {
    config: Config,
    catalog: AlgoCatalog,
    supervisor: S,
    quote_oracle: Arc<dyn QuoteOracle>,
    profit: ProfitabilityEngine,
    engine: BenchmarkEngine,
    store: ResultsStore,
    tools: BTreeMap<String, ToolRuntime>,
    endpoints: BTreeMap<String, EndpointRuntime>,
    state: ControllerState,
    history: Vec<SwitchEvent>,
}

impl<S: MinerSupervisor> SwitchController<S> {
    pub fn new(
        config: Config,
        supervisor: S,
        quote_oracle: Arc<dyn QuoteOracle>,
        price_oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        let catalog = AlgoCatalog::new(config.alias_groups.clone());
        let prices = ExchangeRateCache::new(price_oracle, config.price.refresh_interval());
        let profit = ProfitabilityEngine::new(
            prices,
            config.switching.ranking_field,
            config.switching.min_profit,
            config.unit_scale_overrides.clone(),
        );
        let settings =
            BenchmarkSettings::from_config(&config.benchmark, config.switching.min_profit);
        let engine = BenchmarkEngine::new(settings);
        let store = ResultsStore::new(config.general.results_dir.clone());

        Self {
            config,
            catalog,
            supervisor,
            quote_oracle,
            profit,
            engine,
            store,
            tools: BTreeMap::new(),
            endpoints: BTreeMap::new(),
            state: ControllerState::Idle,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn history(&self) -> &[SwitchEvent] {
        &self.history
    }

    pub fn tool_runtime(&self, name: &str) -> Option<&ToolRuntime> {
        self.tools.get(name)
    }

    pub fn endpoint_runtime(&self, name: &str) -> Option<&EndpointRuntime> {
        self.endpoints.get(name)
    }

    pub fn supervisor(&self) -> &S {
        &self.supervisor
    }

    /// 探测矿工能力、读取已有结果、获取矿池报价
    pub async fn initialize(&mut self) -> Result<(), SwitchError> {
        self.probe_tools().await;
        self.load_results().await?;
        self.refresh_quotes().await
    }

    pub async fn probe_tools(&mut self) {
        for tool in &self.config.tools {
            let algos = discover_capabilities(tool).await;
            info!("Tool {} supports {} algorithms", tool.name, algos.len());
            self.tools.entry(tool.name.clone()).or_default().supported_algos = algos;
        }
    }

    pub async fn load_results(&mut self) -> Result<(), SwitchError> {
        for tool in &self.config.tools {
            let results = self.store.load(&tool.name).await?;
            info!("Loaded {} stored results for {}", results.len(), tool.name);
            self.tools.entry(tool.name.clone()).or_default().results = results;
        }
        Ok(())
    }

    /// 刷新所有矿池报价；任一矿池失败时保留原有报价
    pub async fn refresh_quotes(&mut self) -> Result<(), SwitchError> {
        let mut refreshed = BTreeMap::new();
        for endpoint in &self.config.endpoints {
            let quotes = self.quote_oracle.fetch_quotes(endpoint).await?;
            debug!("Endpoint {} quotes {} algorithms", endpoint.name, quotes.len());
            refreshed.insert(endpoint.name.clone(), EndpointRuntime { quotes });
        }
        self.endpoints = refreshed;
        Ok(())
    }

    /// 对所有 (矿工, 算法) 组合执行基准测试，返回记录的结果数
    pub async fn run_benchmarks(&mut self, force: bool) -> Result<usize, SwitchError> {
        if let Some(session) = self.state.session().cloned() {
            self.supervisor.stop(&session.handle).await?;
        }

        self.state = ControllerState::Benchmarking;
        let result = self.benchmark_all(force).await;
        self.state = ControllerState::Idle;
        result
    }

    async fn benchmark_all(&mut self, force: bool) -> Result<usize, SwitchError> {
        let skip_existing = self.config.benchmark.skip_existing && !force;
        let blacklist = &self.config.switching.blacklisted_algos;
        let mut recorded = 0;

        for tool in &self.config.tools {
            let supported = self
                .tools
                .get(&tool.name)
                .map(|runtime| runtime.supported_algos.clone())
                .unwrap_or_default();
            let mut attempted = BTreeSet::new();

            for endpoint in &self.config.endpoints {
                let Some(endpoint_runtime) = self.endpoints.get(&endpoint.name) else {
                    continue;
                };
                let common =
                    self.catalog.reconcile(&supported, &endpoint_runtime.supported_algos());
                info!(
                    "{} and {} have {} algorithms in common",
                    tool.name,
                    endpoint.name,
                    common.len()
                );

                for (algo, endpoint_algo) in common {
                    if blacklist.contains(&algo) || attempted.contains(&algo) {
                        continue;
                    }
                    let existing = self
                        .tools
                        .get(&tool.name)
                        .map_or(false, |runtime| runtime.results.contains(&algo));
                    if existing && skip_existing {
                        debug!("Skipping {} on {}, result already stored", algo, tool.name);
                        continue;
                    }

                    let target = if self.config.benchmark.offline {
                        BenchmarkTarget::Offline
                    } else {
                        let Some(quote) = endpoint_runtime.quotes.get(&endpoint_algo) else {
                            continue;
                        };
                        let params =
                            ConnectionParams::resolve(endpoint, &algo, &endpoint_algo, quote);
                        let revenue =
                            self.profit.probe(&endpoint_runtime.quotes, &endpoint_algo).await?;
                        BenchmarkTarget::Endpoint { params, revenue }
                    };

                    attempted.insert(algo.clone());
                    let outcome =
                        self.engine.measure(&mut self.supervisor, tool, &algo, &target).await?;
                    match outcome.persisted_hashrate() {
                        Some(hashrate) => {
                            let runtime = self.tools.entry(tool.name.clone()).or_default();
                            self.store
                                .record(&tool.name, &mut runtime.results, &algo, hashrate)
                                .await?;
                            recorded += 1;
                        }
                        None => warn!(
                            "Benchmark of {} on {} not recorded: {:?}",
                            algo, tool.name, outcome
                        ),
                    }
                }
            }
        }

        Ok(recorded)
    }

    /// 当前收益排名
    pub async fn rank(&self) -> Result<ProfitTable, SwitchError> {
        let endpoints: Vec<(&str, &QuoteTable)> = self
            .endpoints
            .iter()
            .map(|(name, runtime)| (name.as_str(), &runtime.quotes))
            .collect();
        let tools = self
            .tools
            .iter()
            .map(|(name, runtime)| (name.as_str(), &runtime.results));

        self.profit
            .rank(&self.catalog, tools, &endpoints, &self.config.switching.blacklisted_algos)
            .await
    }

    /// 重新评估；失败时保持当前会话不变
    pub async fn reevaluate(&mut self) -> Result<SwitchDecision, SwitchError> {
        let current = self.state.session().cloned();
        self.state = ControllerState::ReEvaluating { previous: current.clone() };

        let top = match self.refresh_and_rank().await {
            Ok(top) => top,
            Err(e) => {
                self.state = ControllerState::settle(current);
                return Err(e);
            }
        };

        let Some(top) = top else {
            switch_warn!("No algorithm above the minimum profit, keeping current state");
            self.state = ControllerState::settle(current);
            return Ok(SwitchDecision::NoCandidate);
        };

        let mut restart = false;
        if let Some(session) = &current {
            if session.entry.same_target(&top) {
                if self.supervisor.is_alive().await {
                    debug!("{} is still the most profitable", describe(&top));
                    let session = RunningSession {
                        entry: top.clone(),
                        handle: session.handle.clone(),
                    };
                    self.state = ControllerState::Running(session);
                    return Ok(SwitchDecision::Keep(top));
                }
                switch_warn!("Miner for {} is no longer running, restarting", describe(&top));
                restart = true;
            }

            if let Err(e) = self.supervisor.stop(&session.handle).await {
                self.state = ControllerState::settle(current.clone());
                return Err(e.into());
            }
        }

        let handle = match self.launch(&top).await {
            Ok(handle) => handle,
            Err(e) => {
                self.state = ControllerState::Idle;
                return Err(e);
            }
        };
        self.state = ControllerState::Running(RunningSession {
            entry: top.clone(),
            handle,
        });

        if restart {
            return Ok(SwitchDecision::Restart(top));
        }

        let from = current.map(|session| session.entry);
        switch_info!(
            "Switching {} -> {} ({:.4} USD/day)",
            from.as_ref().map(describe).unwrap_or_else(|| "idle".to_string()),
            describe(&top),
            top.revenue
        );
        self.history.push(SwitchEvent {
            timestamp: Local::now(),
            from: from.as_ref().map(describe),
            to: describe(&top),
            revenue: top.revenue,
        });

        Ok(SwitchDecision::Switch { from, to: top })
    }

    async fn refresh_and_rank(&mut self) -> Result<Option<ProfitEntry>, SwitchError> {
        self.refresh_quotes().await?;
        let table = self.rank().await?;
        info!("Profit table:\n{}", table.render());
        Ok(table.top().cloned())
    }

    async fn launch(&mut self, entry: &ProfitEntry) -> Result<ProcessHandle, SwitchError> {
        let tool = self
            .config
            .tool(&entry.tool)
            .ok_or_else(|| SwitchError::UnknownTool { name: entry.tool.clone() })?;
        let endpoint = self
            .config
            .endpoint(&entry.endpoint)
            .ok_or_else(|| SwitchError::UnknownEndpoint { name: entry.endpoint.clone() })?;
        let quote = self
            .endpoints
            .get(&entry.endpoint)
            .and_then(|runtime| runtime.quotes.get(&entry.endpoint_algo))
            .ok_or_else(|| SwitchError::AlgoNotQuoted {
                endpoint: entry.endpoint.clone(),
                algo: entry.endpoint_algo.clone(),
            })?;

        let params = ConnectionParams::resolve(endpoint, &entry.algo, &entry.endpoint_algo, quote);
        let command = build_launch_command(tool, &entry.algo, &params);
        Ok(self.supervisor.start(&command).await?)
    }

    /// 监控当前会话直到超时；采样只用于输出，不会触发切换
    pub async fn monitor_session(&mut self) {
        let timeout = self.config.switching.session_timeout();
        let Some(session) = self.state.session().cloned() else {
            sleep(timeout).await;
            return;
        };

        let probe = match self.endpoints.get(&session.entry.endpoint) {
            Some(runtime) => {
                match self.profit.probe(&runtime.quotes, &session.entry.endpoint_algo).await {
                    Ok(probe) => probe,
                    Err(e) => {
                        warn!("Revenue unavailable for {}: {}", describe(&session.entry), e);
                        None
                    }
                }
            }
            None => None,
        };

        let deadline = Instant::now() + timeout;
        let mut polls = 0u32;
        let mut alive = true;
        while Instant::now() < deadline {
            if alive && !self.supervisor.is_alive().await {
                switch_warn!("Miner process {} exited during session", session.handle.id);
                alive = false;
            }

            if alive {
                match self.supervisor.query_status().await {
                    Ok(sample) => {
                        polls += 1;
                        let revenue =
                            probe.as_ref().map(|p| p.revenue(sample.hashrate)).unwrap_or(0.0);
                        let line = format!(
                            "{}: {} {}A/{}R {:.4} USD/day",
                            describe(&session.entry),
                            hashrate!(sample.hashrate),
                            sample.accepted,
                            sample.rejected,
                            revenue
                        );
                        if polls % SESSION_REPORT_EVERY == 1 {
                            info!(target: "miner", "{}", line);
                        } else {
                            debug!(target: "miner", "{}", line);
                        }
                    }
                    Err(e) => debug!("Status unavailable: {}", e),
                }
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    /// 探测、测试，然后按会话周期循环切换；仅在外部中断时退出
    pub async fn run(
        &mut self,
        force_benchmark: bool,
        benchmark_only: bool,
    ) -> Result<(), SwitchError> {
        self.initialize().await?;
        let recorded = self.run_benchmarks(force_benchmark).await?;
        info!("Benchmarking finished, {} new results", recorded);

        if benchmark_only {
            let table = self.rank().await?;
            info!("Profit table:\n{}", table.render());
            return Ok(());
        }

        loop {
            match self.reevaluate().await {
                Ok(decision) => debug!("Re-evaluation: {:?}", decision),
                Err(e) => switch_warn!("Re-evaluation failed, keeping current state: {}", e),
            }
            self.monitor_session().await;
        }
    }

    /// 停止任何存活的矿工进程
    pub async fn shutdown(&mut self) -> Result<(), SwitchError> {
        if let ProcessState::Running(handle) = self.supervisor.state().clone() {
            info!("Stopping miner process {}", handle.id);
            self.supervisor.stop(&handle).await?;
        }
        self.state = ControllerState::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::LaunchCommand;
    use std::path::PathBuf;

    fn entry(algo: &str, revenue: f64) -> ProfitEntry {
        ProfitEntry {
            tool: "cpuminer".to_string(),
            endpoint: "zpool".to_string(),
            algo: algo.to_string(),
            endpoint_algo: algo.to_string(),
            hashrate: 1_000.0,
            revenue,
        }
    }

    fn session(algo: &str) -> RunningSession {
        RunningSession {
            entry: entry(algo, 1.0),
            handle: ProcessHandle {
                id: 1,
                pid: None,
                command: LaunchCommand { program: PathBuf::from("cpuminer"), args: Vec::new() },
                started_at: Instant::now(),
            },
        }
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&entry("x11", 0.5)), "cpuminer/x11@zpool");
    }

    #[tokio::test]
    async fn test_state_session() {
        assert!(ControllerState::Idle.session().is_none());
        assert!(ControllerState::Benchmarking.session().is_none());

        let running = ControllerState::Running(session("x11"));
        assert_eq!(running.session().unwrap().entry.algo, "x11");

        let reevaluating = ControllerState::ReEvaluating { previous: Some(session("lyra2v2")) };
        assert_eq!(reevaluating.session().unwrap().entry.algo, "lyra2v2");

        assert_eq!(ControllerState::settle(None), ControllerState::Idle);
        assert!(matches!(
            ControllerState::settle(Some(session("x11"))),
            ControllerState::Running(_)
        ));
    }
}
