//! 外部矿工进程管理
//!
//! 同一时间最多只有一个矿工进程存活：所有矿工都绑定同一个状态端口。

pub mod launch;
pub mod process;
pub mod status;

use crate::error::{StatusError, SupervisorError};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use tokio::time::Instant;

pub use launch::{build_launch_command, build_offline_command, ConnectionParams};
pub use process::ProcessSupervisor;
pub use status::{parse_status_record, StatusClient, StatusSample};

/// 矿工启动命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// 矿工进程句柄，其他组件只通过它引用进程
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub id: u64,
    pub pid: Option<u32>,
    pub command: LaunchCommand,
    pub started_at: Instant,
}

impl PartialEq for ProcessHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// 进程生命周期
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessState {
    NotStarted,
    Running(ProcessHandle),
    Stopped(ProcessHandle),
}

/// 矿工进程监管接口
#[async_trait]
pub trait MinerSupervisor: Send {
    /// 启动矿工进程；已有存活进程时返回 `AlreadyRunning`
    async fn start(&mut self, command: &LaunchCommand) -> Result<ProcessHandle, SupervisorError>;

    /// 停止指定进程；对已停止的句柄调用不做任何事
    async fn stop(&mut self, handle: &ProcessHandle) -> Result<(), SupervisorError>;

    /// 进程是否仍在运行
    async fn is_alive(&mut self) -> bool;

    /// 当前生命周期状态
    fn state(&self) -> &ProcessState;

    /// 通过状态端口查询算力和份额
    async fn query_status(&self) -> Result<StatusSample, StatusError>;
}
