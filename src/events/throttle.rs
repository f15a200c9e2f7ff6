//! 进度事件节流器
//!
//! 控制进度事件的发布频率，避免事件风暴（建议 200-250ms）
//! 完成/失败等关键事件不经过节流器

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// 默认节流间隔（毫秒）
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 200;

/// 进度事件节流器
///
/// 线程安全的时间节流器，使用原子操作避免锁竞争
/// 典型用法：每次进度更新时调用 `should_emit()`，返回 true 时才发布事件
#[derive(Debug)]
pub struct ProgressThrottler {
    /// 上次发布事件的时间戳（纳秒，相对进程启动）
    last_emit_nanos: AtomicU64,
    /// 节流间隔（纳秒）
    interval_nanos: u64,
}

impl ProgressThrottler {
    /// 创建新的节流器
    pub fn new(interval: Duration) -> Self {
        Self {
            last_emit_nanos: AtomicU64::new(0),
            interval_nanos: interval.as_nanos() as u64,
        }
    }

    /// 使用默认间隔（200ms）创建节流器
    pub fn default_interval() -> Self {
        Self::new(Duration::from_millis(DEFAULT_THROTTLE_INTERVAL_MS))
    }

    /// 使用指定毫秒间隔创建节流器
    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// 检查是否应该发布事件
    ///
    /// 首次调用一定放行；之后距离上次发布超过节流间隔时返回 true
    /// 并更新时间戳，使用 CAS 保证并发下同一时间片只有一个调用方得到 true
    pub fn should_emit(&self) -> bool {
        let now_nanos = Self::current_nanos();
        let last = self.last_emit_nanos.load(Ordering::Relaxed);

        // 0 是"从未发布"哨兵值：进程刚启动时 now 可能还不足一个间隔，
        // 不能拿它和 0 做差来判断
        if last == 0 || now_nanos.saturating_sub(last) >= self.interval_nanos {
            self.last_emit_nanos
                .compare_exchange(last, now_nanos, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        } else {
            false
        }
    }

    /// 强制发布（用于最后一次更新或完成时）
    pub fn force_emit(&self) -> bool {
        self.last_emit_nanos
            .store(Self::current_nanos(), Ordering::Relaxed);
        true
    }

    /// 当前时间（相对进程内基准点的纳秒数，恒不为 0，0 留作哨兵值）
    fn current_nanos() -> u64 {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = EPOCH.get_or_init(Instant::now);
        (epoch.elapsed().as_nanos() as u64).max(1)
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::default_interval()
    }
}
