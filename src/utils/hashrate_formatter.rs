//! 算力格式化工具

const UNITS: [(f64, &str); 5] = [
    (1_000_000_000_000_000.0, "PH/s"),
    (1_000_000_000_000.0, "TH/s"),
    (1_000_000_000.0, "GH/s"),
    (1_000_000.0, "MH/s"),
    (1_000.0, "KH/s"),
];

/// 格式化算力显示（智能单位自适应）
///
/// # 示例
/// ```
/// use hashswitch::utils::hashrate_formatter::format_hashrate;
///
/// assert_eq!(format_hashrate(1234.0), "1.234 KH/s");
/// assert_eq!(format_hashrate(1234567.0), "1.235 MH/s");
/// ```
pub fn format_hashrate(hashrate: f64) -> String {
    if hashrate <= 0.0 {
        return "0.00 H/s".to_string();
    }

    if !hashrate.is_finite() {
        return "∞ H/s".to_string();
    }

    let (value, unit) = UNITS
        .iter()
        .find(|(threshold, _)| hashrate >= *threshold)
        .map(|(threshold, unit)| (hashrate / threshold, *unit))
        .unwrap_or((hashrate, "H/s"));

    if value >= 100.0 {
        format!("{:.1} {}", value, unit)
    } else if value >= 10.0 {
        format!("{:.2} {}", value, unit)
    } else {
        format!("{:.3} {}", value, unit)
    }
}
