//! HashSwitch - 收益驱动的挖矿算法切换器
//!
//! 监管一个外部 CPU/GPU 矿工进程，在矿池报价的各个算法之间自动选择收益最高者：
//! - 对矿工与矿池共同支持的每个算法做基准测试，结果持久化
//! - 结合矿池报价和 BTC 汇率估算每日收益并排名
//! - 按固定周期重新评估，只在最优组合变化时重启矿工
//!
//! ## 模块
//! - `algo`: 算法名称对齐与矿工能力探测
//! - `miner`: 矿工进程管理与状态端口协议
//! - `benchmark`: 基准测试引擎与结果存储
//! - `pool` / `profit`: 矿池报价、汇率与收益排名
//! - `switcher`: 切换控制器

pub mod algo;
pub mod benchmark;
pub mod config;
pub mod error;
pub mod logging;
pub mod miner;
pub mod pool;
pub mod profit;
pub mod switcher;
pub mod utils;

pub use config::Config;
pub use error::SwitchError;
pub use switcher::SwitchController;

/// 程序版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 程序名称
pub const NAME: &str = "hashswitch";
