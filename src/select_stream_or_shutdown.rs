use std::pin::Pin;
use tokio::sync::Notify;
use futures_util::Stream;
use futures_util::StreamExt;

#[derive(Debug, PartialEq, Eq)]
pub enum Next<T> {
    Item(T),
    Ended,
    Shutdown,
}

/// Await the next item from a stream or a shutdown signal.
///
/// A pending shutdown permit wins over a ready item, so a signal raised while
/// the previous item was being handled stops the caller before the next one.
pub async fn select_stream_or_shutdown<T>(
    mut stream: Pin<&mut (dyn Stream<Item = T> + Send)>,
    shutdown_notify: &Notify,
) -> Next<T> {
    tokio::select! {
        biased;
        _ = shutdown_notify.notified() => Next::Shutdown,
        item = stream.next() => match item {
            Some(item) => Next::Item(item),
            None => Next::Ended,
        },
    }
}

/// Raise the shutdown signal. Stored as a permit if nobody is waiting yet.
pub fn request_shutdown(shutdown_notify: &Notify) {
    shutdown_notify.notify_one();
}
