use std::time::Duration;

use async_stream::stream;
use futures_util::Stream;
use tokio::time::{self, MissedTickBehavior};

/// Endless stream of 1-based iteration numbers. The first tick fires at once,
/// later ones `period` apart. A slow iteration pushes the schedule back rather
/// than causing a burst of catch-up ticks.
pub fn tick_stream(period: Duration) -> impl Stream<Item = u64> {
    stream! {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut iteration: u64 = 0;
        loop {
            interval.tick().await;
            iteration += 1;
            yield iteration;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn ticks_are_numbered_and_spaced() {
        let start = time::Instant::now();
        let ticks: Vec<u64> = tick_stream(Duration::from_secs(5)).take(3).collect().await;
        assert_eq!(ticks, vec![1, 2, 3]);
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(11));
    }
}
