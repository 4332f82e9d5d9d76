use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwitchError {
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Results store error: {0}")]
    Store(#[from] StoreError),

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Unknown endpoint: {name}")]
    UnknownEndpoint { name: String },

    #[error("Algorithm {algo} is not quoted by endpoint {endpoint}")]
    AlgoNotQuoted { endpoint: String, algo: String },
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("A miner process is already running: {id}")]
    AlreadyRunning { id: u64 },

    #[error("Empty launch command")]
    EmptyCommand,

    #[error("Failed to spawn {program}: {error}")]
    SpawnFailed { program: String, error: String },

    #[error("Failed to terminate process {id}: {error}")]
    KillFailed { id: u64, error: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatusError {
    #[error("Status endpoint {address} unavailable after {attempts} attempts")]
    Unavailable { address: String, attempts: u32 },

    #[error("Status I/O error: {error}")]
    Io { error: String },

    #[error("Status read timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Malformed status record: {reason}")]
    Malformed { reason: String },
}

impl StatusError {
    /// 可在下一次轮询重试的错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StatusError::Unavailable { .. } | StatusError::Timeout { .. } | StatusError::Io { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("HTTP request to {url} failed: {error}")]
    Request { url: String, error: String },

    #[error("Failed to parse response from {source_name}: {reason}")]
    Parse { source_name: String, reason: String },

    #[error("Missing field {field} for {algo}")]
    MissingField { algo: String, field: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read {path}: {error}")]
    Read { path: String, error: String },

    #[error("Failed to write {path}: {error}")]
    Write { path: String, error: String },

    #[error("Corrupt results file {path}: {error}")]
    Corrupt { path: String, error: String },
}
