//! 矿工能力发现
//!
//! 优先使用配置中声明的算法列表；未声明时才解析矿工 `--help` 的自描述输出。

use crate::config::ToolConfig;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// 矿工程序类型，决定使用哪个帮助文本解析器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolVariant {
    #[default]
    Cpuminer,
}

impl ToolVariant {
    pub fn parser(&self) -> Box<dyn CapabilityParser> {
        match self {
            ToolVariant::Cpuminer => Box::new(CpuminerHelpParser),
        }
    }
}

/// 从矿工自描述文本中提取算法列表
pub trait CapabilityParser: Send + Sync {
    /// 获取自描述文本所需的参数
    fn help_args(&self) -> &[&str];

    /// 解析算法名称
    fn parse(&self, help_text: &str) -> Vec<String>;
}

/// cpuminer 系列：`-a` 选项之后、`-o` 选项之前的每行第一个词是算法名
pub struct CpuminerHelpParser;

impl CapabilityParser for CpuminerHelpParser {
    fn help_args(&self) -> &[&str] {
        &["--help"]
    }

    fn parse(&self, help_text: &str) -> Vec<String> {
        let mut in_algo_section = false;
        let mut algos = Vec::new();

        for line in help_text.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("-o") {
                in_algo_section = false;
            }
            if in_algo_section {
                if let Some(name) = trimmed.split_whitespace().next() {
                    algos.push(name.to_string());
                }
            }
            if trimmed.starts_with("-a") {
                in_algo_section = true;
            }
        }

        algos
    }
}

/// 确定矿工支持的算法
pub async fn discover_capabilities(tool: &ToolConfig) -> Vec<String> {
    let declared = tool.declared_algos();
    if !declared.is_empty() {
        info!("Tool {} declares {} algorithms", tool.name, declared.len());
        return declared;
    }

    let parser = tool.variant.parser();
    debug!("Probing {} via {:?}", tool.executable.display(), parser.help_args());

    let output = Command::new(&tool.executable)
        .args(parser.help_args())
        .stdin(Stdio::null())
        .output()
        .await;

    match output {
        Ok(output) => {
            // 部分矿工把帮助输出到 stderr
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            let algos = parser.parse(&text);
            info!("Tool {} reports {} algorithms", tool.name, algos.len());
            algos
        }
        Err(e) => {
            warn!("Failed to probe tool {}: {}", tool.name, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const HELP_TEXT: &str = "\
Usage: cpuminer [OPTIONS]
Options:
  -a, --algo=ALGO       specify the algorithm to use
                          lyra2v2      Lyra2REv2
                          x11          X11
                          yescrypt     Yescrypt
  -o, --url=URL         URL of mining server
  -O, --userpass=U:P    username:password pair for mining server
";

    #[test]
    fn test_cpuminer_help_parser() {
        let algos = CpuminerHelpParser.parse(HELP_TEXT);
        assert_eq!(algos, vec!["lyra2v2", "x11", "yescrypt"]);
    }

    #[test]
    fn test_parser_without_algo_section() {
        assert!(CpuminerHelpParser.parse("Usage: something else\n").is_empty());
    }

    #[tokio::test]
    async fn test_declared_list_preferred() {
        let mut tool = Config::default().tools.remove(0);
        // 可执行文件不存在，声明列表必须直接返回
        tool.executable = "/nonexistent/cpuminer".into();
        let algos = discover_capabilities(&tool).await;
        assert_eq!(algos, vec!["x11", "lyra2v2", "yescrypt"]);
    }

    #[tokio::test]
    async fn test_missing_binary_yields_nothing() {
        let mut tool = Config::default().tools.remove(0);
        tool.executable = "/nonexistent/cpuminer".into();
        tool.std_algos.clear();
        assert!(discover_capabilities(&tool).await.is_empty());
    }
}
