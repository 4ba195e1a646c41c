use crate::select_stream_or_shutdown::{select_stream_or_shutdown, Next};
use crate::types::GenericBoxedStream;

use std::future::Future;
use tokio::sync::Notify;
use tracing::info;
use std::sync::Arc;

/// Drive `handler` once per stream item until the stream ends or shutdown is requested.
///
/// Each handler future is awaited before the next item is pulled, so
/// iterations never overlap. A shutdown raised while a handler is running
/// drops that handler at its next await point. Returns how many items were
/// handled to completion.
pub async fn run_until_shutdown<T, F, Fut>(
    mut stream: GenericBoxedStream<T>,
    shutdown_notify: Arc<Notify>,
    mut handler: F,
) -> u64
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut handled = 0;
    loop {
        match select_stream_or_shutdown(stream.as_mut(), &shutdown_notify).await {
            Next::Item(item) => {
                tokio::select! {
                    biased;
                    _ = shutdown_notify.notified() => {
                        info!("Shutdown requested, abandoning iteration in progress");
                        break;
                    }
                    _ = handler(item) => handled += 1,
                }
            }
            Next::Ended => {
                info!("Tick stream ended");
                break;
            }
            Next::Shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    handled
}
