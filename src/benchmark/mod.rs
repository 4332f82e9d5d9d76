//! 基准测试引擎
//!
//! 启动矿工，每秒轮询一次状态端口，直到满足以下条件之一（按优先级）：
//! 1. 接受份额达到 `min_shares`
//! 2. 超过低收益放弃时间且收益不高于 `min_profit`
//! 3. 拒绝份额达到 `max_rejected_shares`
//! 4. 超过测试时长
//!
//! 结束后停止矿工，返回观测到的最大算力；从未接受份额时算力记为 0。

pub mod store;

use crate::config::{BenchmarkConfig, ToolConfig};
use crate::error::SupervisorError;
use crate::miner::{
    build_launch_command, build_offline_command, ConnectionParams, MinerSupervisor, StatusSample,
};
use crate::profit::RevenueProbe;
use crate::{bench_info, bench_warn, hashrate};
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

pub use store::{BenchmarkResults, ResultsStore};

/// 状态轮询间隔
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 矿工运行时状态（探测和测试结果），与不可变的 ToolConfig 分离
#[derive(Debug, Clone, Default)]
pub struct ToolRuntime {
    pub supported_algos: Vec<String>,
    pub results: BenchmarkResults,
}

/// 终止条件参数
#[derive(Debug, Clone)]
pub struct BenchmarkSettings {
    pub period: Duration,
    pub give_up_after: Duration,
    pub min_shares: u64,
    /// 0 表示不限制
    pub max_rejected: u64,
    pub grace_period: Duration,
    pub min_profit: f64,
    pub poll_interval: Duration,
}

impl BenchmarkSettings {
    pub fn from_config(config: &BenchmarkConfig, min_profit: f64) -> Self {
        Self {
            period: config.period(),
            give_up_after: config.give_up_after(),
            min_shares: config.min_shares,
            max_rejected: config.max_rejected_shares,
            grace_period: config.grace_period(),
            min_profit,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// 测试目标
#[derive(Debug, Clone)]
pub enum BenchmarkTarget {
    /// 连接矿池测试；没有收益计算器时低收益规则不生效
    Endpoint {
        params: ConnectionParams,
        revenue: Option<RevenueProbe>,
    },
    /// 矿工自带的离线测试模式
    Offline,
}

/// 结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    SharesCollected,
    LowProfit,
    TooManyRejected,
    PeriodElapsed,
    Exited,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::SharesCollected => "enough shares accepted",
            StopReason::LowProfit => "revenue below minimum",
            StopReason::TooManyRejected => "too many rejected shares",
            StopReason::PeriodElapsed => "period elapsed",
            StopReason::Exited => "miner exited",
        };
        f.write_str(text)
    }
}

/// 单次测试的观测数据
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkReport {
    /// 最大算力 (H/s)
    pub hashrate: f64,
    pub last_hashrate: f64,
    pub accepted: u64,
    pub rejected: u64,
    /// 最近一次的每日收益估算 (USD)
    pub revenue: Option<f64>,
    pub stop_reason: StopReason,
    /// 从开始轮询起的时长
    pub elapsed: Duration,
    /// 成功的状态采样次数
    pub samples: u32,
}

/// 测试结果
#[derive(Debug, Clone, PartialEq)]
pub enum BenchmarkOutcome {
    Measured(BenchmarkReport),
    /// 算法不可用（崩溃或从未接受份额），记为 0
    Unsupported(BenchmarkReport),
    /// 暂时无法测试，不记录
    Unavailable { reason: String },
}

impl BenchmarkOutcome {
    /// 需要持久化的算力
    pub fn persisted_hashrate(&self) -> Option<f64> {
        match self {
            BenchmarkOutcome::Measured(report) => Some(report.hashrate),
            BenchmarkOutcome::Unsupported(_) => Some(0.0),
            BenchmarkOutcome::Unavailable { .. } => None,
        }
    }

    pub fn report(&self) -> Option<&BenchmarkReport> {
        match self {
            BenchmarkOutcome::Measured(report) | BenchmarkOutcome::Unsupported(report) => {
                Some(report)
            }
            BenchmarkOutcome::Unavailable { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
struct Progress {
    max_hashrate: f64,
    last_hashrate: f64,
    accepted: u64,
    rejected: u64,
    revenue: Option<f64>,
    samples: u32,
}

impl Progress {
    fn observe(&mut self, sample: StatusSample, probe: Option<&RevenueProbe>) {
        self.samples += 1;
        self.last_hashrate = sample.hashrate;
        self.max_hashrate = self.max_hashrate.max(sample.hashrate);
        self.accepted = sample.accepted;
        self.rejected = sample.rejected;
        // 算力为 0 的采样不更新收益
        if let Some(probe) = probe.filter(|_| sample.hashrate > 0.0) {
            self.revenue = Some(probe.revenue(sample.hashrate));
        }
    }

    fn into_report(self, stop_reason: StopReason, elapsed: Duration) -> BenchmarkReport {
        BenchmarkReport {
            hashrate: self.max_hashrate,
            last_hashrate: self.last_hashrate,
            accepted: self.accepted,
            rejected: self.rejected,
            revenue: self.revenue,
            stop_reason,
            elapsed,
            samples: self.samples,
        }
    }
}

/// 基准测试引擎
#[derive(Debug, Clone)]
pub struct BenchmarkEngine {
    settings: BenchmarkSettings,
}

impl BenchmarkEngine {
    pub fn new(settings: BenchmarkSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &BenchmarkSettings {
        &self.settings
    }

    /// 测量某矿工在某算法上的算力
    pub async fn measure<S: MinerSupervisor + ?Sized>(
        &self,
        supervisor: &mut S,
        tool: &ToolConfig,
        algo: &str,
        target: &BenchmarkTarget,
    ) -> Result<BenchmarkOutcome, SupervisorError> {
        let (command, probe) = match target {
            BenchmarkTarget::Endpoint { params, revenue } => {
                (build_launch_command(tool, algo, params), revenue.as_ref())
            }
            BenchmarkTarget::Offline => (build_offline_command(tool, algo), None),
        };

        bench_info!("Benchmarking {} on {}: {}", algo, tool.name, command);
        let handle = match supervisor.start(&command).await {
            Ok(handle) => handle,
            Err(SupervisorError::SpawnFailed { program, error }) => {
                bench_warn!("Could not launch {} for {}: {}", program, algo, error);
                return Ok(BenchmarkOutcome::Unavailable {
                    reason: format!("spawn failed: {}", error),
                });
            }
            Err(e) => return Err(e),
        };

        sleep(self.settings.grace_period).await;

        let started = Instant::now();
        let mut progress = Progress::default();
        let stop_reason = loop {
            if !supervisor.is_alive().await {
                break StopReason::Exited;
            }

            match supervisor.query_status().await {
                Ok(sample) => {
                    progress.observe(sample, probe);
                    bench_info!(
                        "{} {}: {} accepted={} rejected={} elapsed={}s",
                        tool.name,
                        algo,
                        hashrate!(sample.hashrate),
                        sample.accepted,
                        sample.rejected,
                        started.elapsed().as_secs()
                    );
                }
                Err(e) if e.is_transient() => debug!("Status not ready for {}: {}", algo, e),
                Err(e) => bench_warn!("Bad status from {} running {}: {}", tool.name, algo, e),
            }

            if let Some(reason) = self.check_stop(&progress, started.elapsed()) {
                break reason;
            }
            sleep(self.settings.poll_interval).await;
        };
        let elapsed = started.elapsed();

        supervisor.stop(&handle).await?;

        let report = progress.into_report(stop_reason, elapsed);
        // 离线测试没有矿池接受份额，以算力为准
        let produced_work = match target {
            BenchmarkTarget::Endpoint { .. } => report.accepted > 0,
            BenchmarkTarget::Offline => report.hashrate > 0.0,
        };
        let outcome = if produced_work {
            bench_info!("{} {}: {} ({})", tool.name, algo, hashrate!(report.hashrate), stop_reason);
            BenchmarkOutcome::Measured(report)
        } else if report.samples == 0 && stop_reason != StopReason::Exited {
            bench_warn!("{} {}: status endpoint never answered", tool.name, algo);
            BenchmarkOutcome::Unavailable {
                reason: "status endpoint unreachable".to_string(),
            }
        } else {
            bench_warn!(
                "{} {}: no accepted shares ({}), marking unsupported",
                tool.name,
                algo,
                stop_reason
            );
            BenchmarkOutcome::Unsupported(report)
        };

        Ok(outcome)
    }

    fn check_stop(&self, progress: &Progress, elapsed: Duration) -> Option<StopReason> {
        let settings = &self.settings;

        if progress.accepted >= settings.min_shares {
            return Some(StopReason::SharesCollected);
        }
        if let Some(revenue) = progress.revenue {
            if elapsed >= settings.give_up_after && revenue <= settings.min_profit {
                return Some(StopReason::LowProfit);
            }
        }
        if settings.max_rejected > 0 && progress.rejected >= settings.max_rejected {
            return Some(StopReason::TooManyRejected);
        }
        if elapsed >= settings.period {
            return Some(StopReason::PeriodElapsed);
        }
        None
    }
}
