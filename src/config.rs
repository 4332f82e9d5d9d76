use crate::algo::discovery::ToolVariant;
use crate::pool::QuoteField;
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;


#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "hashswitch.toml")]
    pub config: String,

    /// Re-run benchmarks even when a stored result exists
    #[arg(long)]
    pub force_benchmark: bool,

    /// Exit after benchmarking and printing the profit table
    #[arg(long)]
    pub benchmark_only: bool,

    /// Log level (overrides the config file)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub benchmark: BenchmarkConfig,
    pub switching: SwitchingConfig,
    #[serde(default)]
    pub status: StatusConfig,
    pub price: PriceConfig,
    /// 算法别名组，组内名称视为同一算法
    #[serde(default)]
    pub alias_groups: Vec<Vec<String>>,
    /// 矿池未提供 mbtc_mh_factor 时使用的单位系数
    #[serde(default)]
    pub unit_scale_overrides: BTreeMap<String, f64>,
    pub tools: Vec<ToolConfig>,
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    /// 控制台彩色输出
    #[serde(default = "default_log_colored")]
    pub log_colored: bool,
    pub results_dir: PathBuf,
}

fn default_log_colored() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// 单次基准测试的最长时间 (秒)
    pub period_secs: u64,
    /// 低收益放弃阈值 (秒)
    pub give_up_low_profit_secs: u64,
    /// 达到该接受份额数即结束
    pub min_shares: u64,
    /// 达到该拒绝份额数即中止
    pub max_rejected_shares: u64,
    /// 启动后等待状态端口就绪的时间 (秒)
    pub grace_period_secs: u64,
    pub skip_existing: bool,
    /// 使用矿工自带的离线测试代替连接矿池
    #[serde(default)]
    pub offline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchingConfig {
    /// 重新评估间隔 (秒)
    pub session_timeout_secs: u64,
    /// 每日最低收益 (USD)
    pub min_profit: f64,
    #[serde(default)]
    pub ranking_field: QuoteField,
    #[serde(default)]
    pub blacklisted_algos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    pub host: String,
    pub port: u16,
    pub request: String,
    pub terminator: String,
    pub connect_attempts: u32,
    pub retry_delay_ms: u64,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    pub url: String,
    /// 汇率缓存刷新间隔 (秒)，0 表示进程生命周期内只获取一次
    #[serde(default)]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    pub executable: PathBuf,
    #[serde(default)]
    pub variant: ToolVariant,
    pub launch_pattern: String,
    #[serde(default)]
    pub std_algos: Vec<String>,
    /// 算法 -> 启动参数 (flag -> value)
    #[serde(default)]
    pub custom_algos: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub offline_bench: String,
}

impl ToolConfig {
    /// 配置中声明的全部算法
    pub fn declared_algos(&self) -> Vec<String> {
        let mut algos = self.std_algos.clone();
        algos.extend(self.custom_algos.keys().cloned());
        algos
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    /// 报价接口
    pub api_url: String,
    /// 挖矿地址模板，支持 {algo}
    pub mine_url: String,
    pub wallet: String,
    pub password: String,
}

impl BenchmarkConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn give_up_after(&self) -> Duration {
        Duration::from_secs(self.give_up_low_profit_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl SwitchingConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

impl StatusConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn terminator_byte(&self) -> u8 {
        self.terminator.as_bytes().first().copied().unwrap_or(b'|')
    }
}

impl PriceConfig {
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.refresh_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 40101,
            request: "summary".to_string(),
            terminator: "|".to_string(),
            connect_attempts: 3,
            retry_delay_ms: 2000,
            read_timeout_ms: 5000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig {
                log_level: "info".to_string(),
                log_file: None,
                log_colored: true,
                results_dir: PathBuf::from("."),
            },
            benchmark: BenchmarkConfig {
                period_secs: 300,
                give_up_low_profit_secs: 60,
                min_shares: 3,
                max_rejected_shares: 5,
                grace_period_secs: 5,
                skip_existing: true,
                offline: false,
            },
            switching: SwitchingConfig {
                session_timeout_secs: 600,
                min_profit: 0.01,
                ranking_field: QuoteField::EstimateCurrent,
                blacklisted_algos: Vec::new(),
            },
            status: StatusConfig::default(),
            price: PriceConfig {
                url: "https://api.coindesk.com/v1/bpi/currentprice.json".to_string(),
                refresh_interval_secs: 3600,
            },
            alias_groups: vec![
                vec!["lyra2v2".to_string(), "lyra2rev2".to_string()],
                vec!["myr-gr".to_string(), "myriad-groestl".to_string()],
            ],
            unit_scale_overrides: BTreeMap::new(),
            tools: vec![ToolConfig {
                name: "cpuminer".to_string(),
                executable: PathBuf::from("/usr/local/bin/cpuminer"),
                variant: ToolVariant::Cpuminer,
                launch_pattern:
                    "-o stratum+tcp://{url}:{port} -u {wallet} -p {password} -b 127.0.0.1:40101"
                        .to_string(),
                std_algos: vec!["x11".to_string(), "lyra2v2".to_string(), "yescrypt".to_string()],
                custom_algos: BTreeMap::new(),
                offline_bench: "--benchmark -b 127.0.0.1:40101".to_string(),
            }],
            endpoints: vec![EndpointConfig {
                name: "zpool".to_string(),
                api_url: "https://www.zpool.ca/api/status".to_string(),
                mine_url: "{algo}.mine.zpool.ca".to_string(),
                wallet: "wallet-address".to_string(),
                password: "c=BTC".to_string(),
            }],
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let config_content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let config_content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, config_content)
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.tools.is_empty() {
            anyhow::bail!("At least one tool must be configured");
        }

        if self.endpoints.is_empty() {
            anyhow::bail!("At least one endpoint must be configured");
        }

        // 验证基准测试配置
        if self.benchmark.period_secs == 0 {
            anyhow::bail!("Benchmark period must be greater than 0");
        }
        if self.benchmark.give_up_low_profit_secs > self.benchmark.period_secs {
            anyhow::bail!(
                "give_up_low_profit_secs ({}) cannot exceed period_secs ({})",
                self.benchmark.give_up_low_profit_secs,
                self.benchmark.period_secs
            );
        }
        if self.benchmark.min_shares == 0 {
            anyhow::bail!("Benchmark min_shares must be greater than 0");
        }

        if self.switching.session_timeout_secs == 0 {
            anyhow::bail!("Session timeout must be greater than 0");
        }

        // 验证状态端口配置
        if self.status.terminator.len() != 1 {
            anyhow::bail!(
                "Status terminator must be a single byte, got {:?}",
                self.status.terminator
            );
        }
        if self.status.connect_attempts == 0 {
            anyhow::bail!("Status connect_attempts must be at least 1");
        }
        if self.status.request.is_empty() {
            anyhow::bail!("Status request token cannot be empty");
        }

        url::Url::parse(&self.price.url)
            .with_context(|| format!("Invalid price oracle URL: {}", self.price.url))?;

        let mut tool_names = std::collections::BTreeSet::new();
        for tool in &self.tools {
            if !tool_names.insert(tool.name.as_str()) {
                anyhow::bail!("Duplicate tool name: {}", tool.name);
            }
            if tool.launch_pattern.trim().is_empty() {
                anyhow::bail!("Tool {} has an empty launch_pattern", tool.name);
            }
        }

        let mut endpoint_names = std::collections::BTreeSet::new();
        for endpoint in &self.endpoints {
            if !endpoint_names.insert(endpoint.name.as_str()) {
                anyhow::bail!("Duplicate endpoint name: {}", endpoint.name);
            }
            url::Url::parse(&endpoint.api_url).with_context(|| {
                format!("Invalid api_url for endpoint {}: {}", endpoint.name, endpoint.api_url)
            })?;
        }

        for (algo, factor) in &self.unit_scale_overrides {
            if *factor <= 0.0 || !factor.is_finite() {
                anyhow::bail!("Unit scale override for {} must be positive, got {}", algo, factor);
            }
        }

        Ok(())
    }

    /// 检查配置是否有效
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn tool(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn endpoint(&self, name: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.name == name)
    }
}
