//! 算法名称目录
//!
//! 矿工程序与矿池对同一算法的叫法可能不同（大小写、别名）。
//! 解析顺序固定：完全相同 → 忽略大小写相同 → 同一别名组，先命中者为准。

pub mod discovery;

use std::collections::BTreeMap;

pub use discovery::{discover_capabilities, CapabilityParser, CpuminerHelpParser, ToolVariant};

/// 算法目录（别名组配置）
#[derive(Debug, Clone, Default)]
pub struct AlgoCatalog {
    alias_groups: Vec<Vec<String>>,
}

impl AlgoCatalog {
    pub fn new(alias_groups: Vec<Vec<String>>) -> Self {
        Self { alias_groups }
    }

    /// 在候选名称中解析出与 `algo` 对应的名称
    pub fn resolve<'a, S: AsRef<str>>(&self, algo: &str, candidates: &'a [S]) -> Option<&'a str> {
        let names: Vec<&'a str> = candidates.iter().map(|c| c.as_ref()).collect();

        if let Some(exact) = names.iter().find(|name| **name == algo) {
            return Some(*exact);
        }

        if let Some(folded) = names.iter().find(|name| name.eq_ignore_ascii_case(algo)) {
            return Some(*folded);
        }

        for group in self.alias_groups.iter().filter(|g| g.iter().any(|alias| alias == algo)) {
            for alias in group {
                if let Some(hit) = names.iter().find(|name| **name == alias.as_str()) {
                    return Some(*hit);
                }
            }
        }

        None
    }

    /// 计算矿工算法与矿池算法的交集 (矿工名称 -> 矿池名称)
    ///
    /// 无法匹配的矿工算法直接丢弃，不视为错误。
    pub fn reconcile<S: AsRef<str>>(
        &self,
        tool_algos: &[S],
        endpoint_algos: &[S],
    ) -> BTreeMap<String, String> {
        tool_algos
            .iter()
            .filter_map(|algo| {
                let algo: &str = algo.as_ref();
                self.resolve(algo, endpoint_algos)
                    .map(|endpoint_algo| (algo.to_string(), endpoint_algo.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> AlgoCatalog {
        AlgoCatalog::new(vec![
            vec!["lyra2v2".to_string(), "lyra2rev2".to_string()],
            vec!["myr-gr".to_string(), "myriad-groestl".to_string(), "myriadgroestl".to_string()],
        ])
    }

    #[test]
    fn test_reconcile_identity() {
        let algos = vec!["X11", "lyra2v2", "Yescrypt", "sha256d"];
        let mapping = catalog().reconcile(&algos, &algos);

        assert_eq!(mapping.len(), algos.len());
        for algo in &algos {
            assert_eq!(mapping[*algo], *algo);
        }
    }

    #[test]
    fn test_reconcile_case_insensitive() {
        let tool = vec!["x11", "YESCRYPT"];
        let pool = vec!["X11", "yescrypt"];
        let mapping = catalog().reconcile(&tool, &pool);

        assert_eq!(mapping["x11"], "X11");
        assert_eq!(mapping["YESCRYPT"], "yescrypt");
    }

    #[test]
    fn test_reconcile_alias_group() {
        let tool = vec!["lyra2v2", "myr-gr"];
        let pool = vec!["lyra2rev2", "myriadgroestl"];
        let mapping = catalog().reconcile(&tool, &pool);

        assert_eq!(mapping["lyra2v2"], "lyra2rev2");
        assert_eq!(mapping["myr-gr"], "myriadgroestl");
    }

    #[test]
    fn test_exact_match_beats_case_and_alias() {
        let pool = vec!["LYRA2V2", "lyra2rev2", "lyra2v2"];
        assert_eq!(catalog().resolve("lyra2v2", &pool), Some("lyra2v2"));

        let pool = vec!["lyra2rev2", "LYRA2V2"];
        assert_eq!(catalog().resolve("lyra2v2", &pool), Some("LYRA2V2"));
    }

    #[test]
    fn test_alias_first_hit_wins() {
        // 别名组内按配置顺序匹配
        let pool = vec!["myriadgroestl", "myriad-groestl"];
        assert_eq!(catalog().resolve("myr-gr", &pool), Some("myriad-groestl"));
    }

    #[test]
    fn test_unmatched_dropped() {
        let tool = vec!["x11", "cryptonight"];
        let pool = vec!["x11", "scrypt"];
        let mapping = catalog().reconcile(&tool, &pool);

        assert_eq!(mapping.len(), 1);
        assert!(!mapping.contains_key("cryptonight"));
        assert_eq!(catalog().resolve("cryptonight", &pool), None);
    }

    #[test]
    fn test_reconcile_deterministic() {
        let tool = vec!["yescrypt", "x11", "lyra2v2"];
        let pool = vec!["lyra2rev2", "X11", "yescrypt"];
        let first = catalog().reconcile(&tool, &pool);
        let second = catalog().reconcile(&tool, &pool);

        assert_eq!(first, second);
        let keys: Vec<_> = first.keys().cloned().collect();
        assert_eq!(keys, vec!["lyra2v2", "x11", "yescrypt"]);
    }
}
