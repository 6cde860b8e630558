//! Fetch orchestration: decides when a subscriber's fetcher actually runs.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;

use crate::{
    fetcher::Fetcher,
    record::{CheckOutcome, RequestRecord},
    types::FetchArgsBounds,
};

/// Run one coordinator check for a subscriber.
///
/// If the record is neither in flight nor fresh for `interval`, a cycle is
/// started and the fetch is spawned as a detached task. The fetch is never
/// aborted; its outcome is written back with the cycle's token, so an outcome
/// from a superseded cycle is dropped by the record.
pub fn check<F, Args>(
    record: &Arc<RequestRecord<F::Output, F::Error>>,
    fetcher: &F,
    args: &Args,
    interval: Duration,
) -> CheckOutcome
where
    F: Fetcher<Args>,
    Args: FetchArgsBounds,
{
    let outcome = record.begin_cycle_if_due(interval);
    if let CheckOutcome::Started(token) = outcome {
        let record = record.clone();
        let fetcher = fetcher.clone();
        let args = args.clone();
        tokio::spawn(async move {
            match fetcher.run(args).await {
                Ok(value) => {
                    record.resolve(token, value);
                }
                Err(error) => {
                    record.reject(token, error);
                }
            }
        });
    }
    outcome
}

/// Spawn the task that re-runs [`check`] on attach and after every published
/// snapshot of `record`, until aborted.
///
/// Bursts of changes are coalesced by the watch channel, so the check sees the
/// latest state rather than every intermediate one.
pub fn spawn_driver<F, Args>(
    record: Arc<RequestRecord<F::Output, F::Error>>,
    fetcher: F,
    args: Args,
    interval: Duration,
) -> JoinHandle<()>
where
    F: Fetcher<Args>,
    Args: FetchArgsBounds,
{
    let mut changes = record.watch();
    tokio::spawn(async move {
        loop {
            drop(changes.borrow_and_update());
            check(&record, &fetcher, &args, interval);
            if changes.changed().await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CacheKey;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    #[derive(Clone)]
    struct Slow {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Fetcher<String> for Slow {
        type Output = String;
        type Error = String;

        fn run(&self, symbol: String) -> impl Future<Output = Result<String, String>> + Send {
            let calls = self.calls.clone();
            let fail = self.fail;
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                sleep(Duration::from_millis(700)).await;
                if fail {
                    Err(format!("{symbol} unavailable"))
                } else {
                    Ok(format!("{symbol}#{n}"))
                }
            }
        }
    }

    fn record() -> Arc<RequestRecord<String, String>> {
        Arc::new(RequestRecord::new(CacheKey::from_raw("[\"slow\",\"BTCUSDT\"]")))
    }

    #[tokio::test(start_paused = true)]
    async fn check_fetches_once_and_settles() {
        let record = record();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Slow { calls: calls.clone(), fail: false };
        let args = "BTCUSDT".to_string();

        let first = check(&record, &fetcher, &args, Duration::ZERO);
        assert!(matches!(first, CheckOutcome::Started(_)));
        assert_eq!(check(&record, &fetcher, &args, Duration::ZERO), CheckOutcome::InFlight);

        let outcome = record.pending().outcome().await;
        assert_eq!(outcome, Some(Ok("BTCUSDT#1".to_string())));
        assert_eq!(check(&record, &fetcher, &args, Duration::ZERO), CheckOutcome::Fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_settle_as_errors() {
        let record = record();
        let fetcher = Slow { calls: Arc::default(), fail: true };

        check(&record, &fetcher, &"BTCUSDT".to_string(), Duration::ZERO);
        let outcome = record.pending().outcome().await;

        assert_eq!(outcome, Some(Err("BTCUSDT unavailable".to_string())));
        assert_eq!(record.snapshot().error(), Some(&"BTCUSDT unavailable".to_string()));
        assert!(!record.snapshot().is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn driver_refetches_after_refresh() {
        let record = record();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Slow { calls: calls.clone(), fail: false };
        let driver = spawn_driver(record.clone(), fetcher, "BTCUSDT".to_string(), Duration::ZERO);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(record.snapshot().data(), Some(&"BTCUSDT#1".to_string()));

        record.refresh();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(record.snapshot().data(), Some(&"BTCUSDT#2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        driver.abort();
    }
}
