//! Background freshness polling.

use std::{sync::Arc, time::Duration};

use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::{
    lifecycle::Teardown,
    record::RequestRecord,
    types::{FetchErrorBounds, FetchOutputBounds},
};

/// Minimum interval for periodic tasks to prevent busy spinning.
const MIN_TASK_INTERVAL: Duration = Duration::from_millis(1);

/// Spawn the periodic staleness check for one record.
///
/// Each tick marks the record due when it is idle and stale for its shortest
/// observed revalidate interval. The poll never fetches: the subscribers'
/// coordinator checks pick up the change and one of them performs the fetch.
/// The returned teardown stops the poll.
pub fn spawn_freshness_poll<T, E>(record: Arc<RequestRecord<T, E>>, period: Duration) -> Teardown
where
    T: FetchOutputBounds,
    E: FetchErrorBounds,
{
    let period = std::cmp::max(period, MIN_TASK_INTERVAL);
    crate::debug_log!(
        "⏱️ [FRESHNESS-POLL] Polling key: {} every {:?}",
        record.key(),
        period
    );

    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            record.refresh_if_stale();
        }
    });

    Box::new(move || task.abort())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CacheKey;
    use crate::state::RequestStatus;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn poll_marks_stale_records_due_until_stopped() {
        let record = Arc::new(RequestRecord::<u32, ()>::new(CacheKey::from_raw("[\"p\",null]")));
        record.observe_interval(Duration::from_secs(2));
        let token = record.begin_cycle().unwrap();
        record.resolve(token, 1);

        let stop = spawn_freshness_poll(record.clone(), Duration::from_millis(500));

        sleep(Duration::from_millis(1900)).await;
        assert_eq!(record.snapshot().status(), RequestStatus::SettledOk);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(record.snapshot().status(), RequestStatus::Due);

        let token = record.begin_cycle().unwrap();
        record.resolve(token, 2);
        stop();

        sleep(Duration::from_secs(10)).await;
        assert_eq!(record.snapshot().status(), RequestStatus::SettledOk);
    }
}
