//! 基准测试结果持久化
//!
//! 每个矿工一个文件 `benchmark-<tool>.json`，内容为算法到算力 (H/s) 的映射。

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// 某个矿工的基准测试结果，0 表示不支持
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BenchmarkResults(BTreeMap<String, f64>);

impl BenchmarkResults {
    pub fn get(&self, algo: &str) -> Option<f64> {
        self.0.get(algo).copied()
    }

    pub fn insert(&mut self, algo: &str, hashrate: f64) {
        self.0.insert(algo.to_string(), hashrate);
    }

    pub fn contains(&self, algo: &str) -> bool {
        self.0.contains_key(algo)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.0.iter().map(|(algo, hashrate)| (algo.as_str(), *hashrate))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 结果目录
#[derive(Debug, Clone)]
pub struct ResultsStore {
    dir: PathBuf,
}

impl ResultsStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, tool: &str) -> PathBuf {
        self.dir.join(format!("benchmark-{}.json", tool))
    }

    /// 读取结果，文件不存在时返回空表
    pub async fn load(&self, tool: &str) -> Result<BenchmarkResults, StoreError> {
        let path = self.path_for(tool);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No results file at {}", path.display());
                return Ok(BenchmarkResults::default());
            }
            Err(e) => {
                return Err(StoreError::Read {
                    path: path.display().to_string(),
                    error: e.to_string(),
                })
            }
        };

        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// 先写临时文件再重命名，避免留下半写入的结果文件
    pub async fn save(&self, tool: &str, results: &BenchmarkResults) -> Result<(), StoreError> {
        let path = self.path_for(tool);
        let write_error = |path: &Path, e: String| StoreError::Write {
            path: path.display().to_string(),
            error: e,
        };

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| write_error(&self.dir, e.to_string()))?;

        let content =
            serde_json::to_string_pretty(results).map_err(|e| write_error(&path, e.to_string()))?;
        let tmp_path = path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| write_error(&tmp_path, e.to_string()))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| write_error(&tmp_path, e.to_string()))?;
        file.sync_all().await.map_err(|e| write_error(&tmp_path, e.to_string()))?;
        drop(file);

        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| write_error(&path, e.to_string()))?;

        debug!("Saved {} results to {}", results.len(), path.display());
        Ok(())
    }

    /// 记录一条结果并立即落盘
    pub async fn record(
        &self,
        tool: &str,
        results: &mut BenchmarkResults,
        algo: &str,
        hashrate: f64,
    ) -> Result<(), StoreError> {
        results.insert(algo, hashrate);
        self.save(tool, results).await
    }
}
