//! 算法计价单位
//!
//! 矿池按不同的算力单位为算法报价（例如 sha256 按 TH/s、scrypt 按 GH/s）。
//! 报价数据中带有 `mbtc_mh_factor` 时以其为准，否则按下表推断。

use std::collections::BTreeMap;

/// 计价单位类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitClass {
    /// 按 kH/s (或 kSol/s) 计价
    Kilo,
    /// 按 MH/s 计价
    Mega,
    /// 按 GH/s 计价
    Giga,
    /// 按 TH/s 计价
    Tera,
}

impl UnitClass {
    /// 相对于 MH/s 的系数
    pub fn factor(&self) -> f64 {
        match self {
            UnitClass::Kilo => 0.001,
            UnitClass::Mega => 1.0,
            UnitClass::Giga => 1_000.0,
            UnitClass::Tera => 1_000_000.0,
        }
    }

    pub fn of(algo: &str) -> UnitClass {
        let algo = algo.to_ascii_lowercase();
        KNOWN_CLASSES
            .iter()
            .find(|(names, _)| names.contains(&algo.as_str()))
            .map(|(_, class)| *class)
            .unwrap_or(UnitClass::Mega)
    }
}

const KNOWN_CLASSES: &[(&[&str], UnitClass)] = &[
    (&["sha256", "sha256d", "sha256t", "sha256csm"], UnitClass::Tera),
    (
        &[
            "scrypt", "x11", "x13", "x15", "quark", "qubit", "keccak", "keccakc", "blake2s",
            "blakecoin", "decred", "lbry", "myr-gr", "skein", "nist5",
        ],
        UnitClass::Giga,
    ),
    (
        &[
            "equihash", "equihash125", "equihash144", "equihash192", "yescrypt", "yescryptr16",
            "yescryptr32", "yespower", "yespowerr16", "argon2d4096", "cpupower", "power2b",
            "minotaurx",
        ],
        UnitClass::Kilo,
    ),
];

/// 确定单位系数：报价数据 → 配置覆盖 → 类别表
pub fn unit_scale(algo: &str, quoted: Option<f64>, overrides: &BTreeMap<String, f64>) -> f64 {
    quoted
        .filter(|factor| *factor > 0.0)
        .or_else(|| overrides.get(algo).copied())
        .unwrap_or_else(|| UnitClass::of(algo).factor())
}
