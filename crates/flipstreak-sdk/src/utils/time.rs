//! 时间工具
//!
//! - **存储层**: 所有时间字段使用 UTC 毫秒时间戳
//! - **业务层**: 通过注入的 `Clock` 取时间，测试中可替换为固定时钟

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{TimeZone, Utc};

/// 时钟抽象
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// 当前 UTC 毫秒时间戳
    fn now_millis(&self) -> i64;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// 手动推进的时钟（测试用）
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// 格式化为 RFC 3339（日志用），非法时间戳原样输出数字
pub fn format_millis(utc_timestamp_ms: i64) -> String {
    match Utc.timestamp_millis_opt(utc_timestamp_ms).single() {
        Some(dt) => dt.to_rfc3339(),
        None => utc_timestamp_ms.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        clock.advance(250);
        assert_eq!(clock.now_millis(), 1_250);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn format_epoch() {
        assert_eq!(format_millis(0), "1970-01-01T00:00:00+00:00");
    }
}
