use crate::config::{EndpointConfig, ToolConfig};
use crate::miner::LaunchCommand;
use crate::pool::AlgoQuote;

/// 连接某矿池某算法所需的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// 矿工使用的算法名
    pub algo: String,
    /// 矿池使用的算法名
    pub endpoint_algo: String,
    pub url: String,
    pub port: u16,
    pub wallet: String,
    pub password: String,
}

impl ConnectionParams {
    pub fn resolve(
        endpoint: &EndpointConfig,
        algo: &str,
        endpoint_algo: &str,
        quote: &AlgoQuote,
    ) -> Self {
        Self {
            algo: algo.to_string(),
            endpoint_algo: endpoint_algo.to_string(),
            url: endpoint.mine_url.replace("{algo}", endpoint_algo),
            port: quote.port,
            wallet: endpoint.wallet.clone(),
            password: endpoint.password.clone(),
        }
    }

    fn fill(&self, token: &str) -> String {
        token
            .replace("{algo}", &self.algo)
            .replace("{url}", &self.url)
            .replace("{port}", &self.port.to_string())
            .replace("{wallet}", &self.wallet)
            .replace("{password}", &self.password)
    }
}

/// 算法选择参数：标准算法用 `-a <algo>`，自定义算法用配置的参数表
fn algo_selector(tool: &ToolConfig, algo: &str) -> Vec<String> {
    match tool.custom_algos.get(algo) {
        Some(flags) if !tool.std_algos.iter().any(|a| a == algo) => flags
            .iter()
            .flat_map(|(flag, value)| [flag.clone(), value.clone()])
            .collect(),
        _ => vec!["-a".to_string(), algo.to_string()],
    }
}

/// 构建连接矿池的启动命令
pub fn build_launch_command(
    tool: &ToolConfig,
    algo: &str,
    params: &ConnectionParams,
) -> LaunchCommand {
    let mut args = algo_selector(tool, algo);
    args.extend(tool.launch_pattern.split_whitespace().map(|token| params.fill(token)));

    LaunchCommand {
        program: tool.executable.clone(),
        args,
    }
}

/// 构建离线自测命令
pub fn build_offline_command(tool: &ToolConfig, algo: &str) -> LaunchCommand {
    let mut args = vec!["-a".to_string(), algo.to_string()];
    args.extend(tool.offline_bench.split_whitespace().map(str::to_string));

    LaunchCommand {
        program: tool.executable.clone(),
        args,
    }
}
