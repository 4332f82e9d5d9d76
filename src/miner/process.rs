use crate::config::StatusConfig;
use crate::error::{StatusError, SupervisorError};
use crate::miner::{
    LaunchCommand, MinerSupervisor, ProcessHandle, ProcessState, StatusClient, StatusSample,
};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// 等待进程响应 SIGTERM 的时间
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// 基于操作系统进程的矿工监管器
pub struct ProcessSupervisor {
    status: StatusClient,
    stop_timeout: Duration,
    next_id: u64,
    state: ProcessState,
    child: Option<Child>,
}

impl ProcessSupervisor {
    pub fn new(status: &StatusConfig) -> Self {
        Self {
            status: StatusClient::from_config(status),
            stop_timeout: STOP_TIMEOUT,
            next_id: 0,
            state: ProcessState::NotStarted,
            child: None,
        }
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// 先发送 SIGTERM，超时后强制结束
    async fn terminate(&self, child: &mut Child, id: u64) -> Result<(), SupervisorError> {
        let Some(pid) = child.id() else {
            // 已被回收
            return Ok(());
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => match timeout(self.stop_timeout, child.wait()).await {
                    Ok(Ok(status)) => {
                        debug!("Miner process {} exited after SIGTERM: {}", id, status);
                        return Ok(());
                    }
                    Ok(Err(e)) => warn!("Failed to wait for miner process {}: {}", id, e),
                    Err(_) => warn!("Miner process {} ignored SIGTERM, killing", id),
                },
                Err(e) => warn!("Failed to send SIGTERM to pid {}: {}", pid, e),
            }
        }
        #[cfg(not(unix))]
        let _ = pid;

        child.kill().await.map_err(|e| SupervisorError::KillFailed {
            id,
            error: e.to_string(),
        })
    }
}

#[async_trait]
impl MinerSupervisor for ProcessSupervisor {
    async fn start(&mut self, command: &LaunchCommand) -> Result<ProcessHandle, SupervisorError> {
        if self.is_alive().await {
            if let ProcessState::Running(current) = &self.state {
                return Err(SupervisorError::AlreadyRunning { id: current.id });
            }
        }

        if command.program.as_os_str().is_empty() {
            return Err(SupervisorError::EmptyCommand);
        }

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::SpawnFailed {
                program: command.program.display().to_string(),
                error: e.to_string(),
            })?;

        self.next_id += 1;
        let handle = ProcessHandle {
            id: self.next_id,
            pid: child.id(),
            command: command.clone(),
            started_at: Instant::now(),
        };

        info!("Started miner process {} (pid {:?}): {}", handle.id, handle.pid, command);
        self.state = ProcessState::Running(handle.clone());
        self.child = Some(child);
        Ok(handle)
    }

    async fn stop(&mut self, handle: &ProcessHandle) -> Result<(), SupervisorError> {
        let is_current = matches!(&self.state, ProcessState::Running(current) if current == handle);
        if !is_current {
            debug!("Miner process {} is not running, nothing to stop", handle.id);
            return Ok(());
        }

        if let Some(mut child) = self.child.take() {
            if let Err(e) = self.terminate(&mut child, handle.id).await {
                self.child = Some(child);
                return Err(e);
            }
        }

        info!("Stopped miner process {}", handle.id);
        self.state = ProcessState::Stopped(handle.clone());
        Ok(())
    }

    async fn is_alive(&mut self) -> bool {
        let ProcessState::Running(handle) = &self.state else {
            return false;
        };
        let handle = handle.clone();

        let alive = match self.child.as_mut() {
            Some(child) => poll_liveness(child.try_wait(), handle.id),
            None => false,
        };

        if !alive {
            self.child = None;
            self.state = ProcessState::Stopped(handle);
        }
        alive
    }

    fn state(&self) -> &ProcessState {
        &self.state
    }

    async fn query_status(&self) -> Result<StatusSample, StatusError> {
        self.status.query().await
    }
}

/// 根据 try_wait 的结果判断进程是否存活；查询失败时仍视为存活，由 stop 负责回收
fn poll_liveness(poll: std::io::Result<Option<ExitStatus>>, id: u64) -> bool {
    match poll {
        Ok(None) => true,
        Ok(Some(status)) => {
            warn!("Miner process {} exited: {}", id, status);
            false
        }
        Err(e) => {
            warn!("Failed to poll miner process {}, assuming it is running: {}", id, e);
            true
        }
    }
}
