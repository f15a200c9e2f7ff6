// 有界并发调度器
//
// 用信号量给 JoinSet 限流：任意时刻执行中的任务数不超过上限。
// 队列层和分块层共用同一个原语——队列限制同时上传的文件数，
// 引擎限制单个文件内同时在途的分块数

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// 有界并发调度器
///
/// `run_all` 按输入顺序返回结果；被 panic 或取消打断的槽位为 `None`，
/// 其余任务不受影响
pub struct BoundedScheduler {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl BoundedScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 并发上限
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// 当前执行中的任务数
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// 观测到的最大并发数
    pub fn peak_count(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// 对每个输入项执行 `f`，受并发上限约束，全部完成后按原顺序返回
    pub async fn run_all<T, R, F, Fut>(&self, items: Vec<T>, f: F) -> Vec<Option<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = items.len();
        let mut results: Vec<Option<R>> = Vec::with_capacity(total);
        results.resize_with(total, || None);

        let f = Arc::new(f);
        let mut join_set: JoinSet<(usize, R)> = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            // 先拿许可再 spawn，保证在途任务数不超上限
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let f = Arc::clone(&f);
            let active = Arc::clone(&self.active);
            let peak = Arc::clone(&self.peak);

            join_set.spawn(async move {
                let running = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(running, Ordering::SeqCst);
                // 任务 panic 时也要释放计数，否则 active 会虚高
                let guard = ActiveGuard { active };

                let result = f(index, item).await;

                // 先减计数再放许可：顺序反过来的话，等许可的任务
                // 可能在本任务计数归还前加一，active 瞬时读到 max+1。
                // 展开（panic）路径按声明逆序析构，顺序同样正确
                drop(guard);
                drop(permit);
                (index, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => warn!("调度任务异常退出: {}", e),
            }
        }

        results
    }
}

struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
