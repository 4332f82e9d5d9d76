//! 控制台日志格式化器

use chrono::{DateTime, Local};
use std::fmt;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// cgminer 风格的简洁格式：`[时间] 级别 [目标] 消息`
pub struct SwitchFormatter {
    /// 是否启用彩色输出
    colored: bool,
}

impl SwitchFormatter {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    fn level_tag(&self, level: &tracing::Level) -> (&'static str, &'static str) {
        let (tag, color) = match *level {
            tracing::Level::ERROR => ("ERR", "\x1b[31m"),
            tracing::Level::WARN => ("WRN", "\x1b[33m"),
            tracing::Level::INFO => ("   ", "\x1b[32m"),
            tracing::Level::DEBUG => ("DBG", "\x1b[36m"),
            tracing::Level::TRACE => ("TRC", "\x1b[37m"),
        };
        (tag, if self.colored { color } else { "" })
    }
}

/// 日志目标对应的短标签
pub fn target_label(target: &str) -> Option<&'static str> {
    match target {
        "benchmark" => Some("BENCH"),
        "switch" => Some("SWITCH"),
        "miner" => Some("MINER"),
        _ => None,
    }
}

impl<S, N> FormatEvent<S, N> for SwitchFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let now: DateTime<Local> = Local::now();
        let (level_str, level_color) = self.level_tag(metadata.level());
        let reset = if self.colored { "\x1b[0m" } else { "" };

        write!(writer, "[{}] {}{}{} ", now.format("%H:%M:%S"), level_color, level_str, reset)?;

        if let Some(label) = target_label(metadata.target()) {
            write!(writer, "[{}] ", label)?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_label() {
        assert_eq!(target_label("benchmark"), Some("BENCH"));
        assert_eq!(target_label("switch"), Some("SWITCH"));
        assert_eq!(target_label("hashswitch::miner::status"), None);
    }

    #[test]
    fn test_level_tag_without_color() {
        let formatter = SwitchFormatter::new(false);
        assert_eq!(formatter.level_tag(&tracing::Level::WARN), ("WRN", ""));
        assert_eq!(formatter.level_tag(&tracing::Level::INFO), ("   ", ""));
    }
}
