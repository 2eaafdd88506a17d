use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, warn};

use super::DecodeEvent;
use crate::{backend::Subscription, error::BindError, types::LogRecord};

/// Handle to a background event forwarding task.
///
/// The task decodes each live log record and delivers it to the caller's
/// sink until cancelled, until the sink is dropped, or until the
/// subscription fails. Dropping the handle also requests cancellation.
#[derive(Debug)]
pub struct EventWatch {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), BindError>>,
}

impl EventWatch {
    /// Requests cooperative termination. One-shot and idempotent; the task
    /// observes the signal at its next scheduling point.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Waits for the forwarding task to finish and reports how it ended:
    /// `Ok(())` after cancellation or a clean feed/sink close, the decode or
    /// subscription failure otherwise.
    pub async fn join(self) -> Result<(), BindError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(BindError::Subscription(format!(
                "forwarding task aborted: {err}"
            ))),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Starts the forwarding task for an already-open feed.
pub(crate) fn spawn<D: DecodeEvent>(
    decoder: D,
    logs: mpsc::Receiver<LogRecord>,
    sub: Subscription,
    sink: mpsc::Sender<D::Event>,
) -> EventWatch {
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let task = tokio::spawn(forward(decoder, logs, sub, sink, cancel_rx));
    EventWatch {
        cancel: Some(cancel_tx),
        task,
    }
}

async fn forward<D: DecodeEvent>(
    decoder: D,
    mut logs: mpsc::Receiver<LogRecord>,
    mut sub: Subscription,
    sink: mpsc::Sender<D::Event>,
    mut cancel: oneshot::Receiver<()>,
) -> Result<(), BindError> {
    let result = loop {
        tokio::select! {
            // Sent or dropped, either is a cancellation request.
            _ = &mut cancel => {
                debug!("watch cancelled");
                break Ok(());
            }
            err = sub.failure() => break Err(err),
            received = logs.recv() => {
                let Some(log) = received else {
                    debug!("log feed closed");
                    break Ok(());
                };
                let event = match decoder.decode(&log) {
                    Ok(event) => event,
                    Err(err) => break Err(err),
                };
                // Delivery races cancellation and feed failure so a
                // blocked consumer cannot wedge shutdown.
                tokio::select! {
                    sent = sink.send(event) => {
                        if sent.is_err() {
                            debug!("sink dropped, stopping watch");
                            break Ok(());
                        }
                    }
                    _ = &mut cancel => {
                        debug!("watch cancelled during delivery");
                        break Ok(());
                    }
                    err = sub.failure() => break Err(err),
                }
            }
        }
    };
    if let Err(err) = &result {
        warn!(%err, "watch terminated abnormally");
    }
    sub.unsubscribe();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_number(log: &LogRecord) -> Result<u64, BindError> {
        if log.removed {
            return Err(BindError::Decode("poisoned record".into()));
        }
        Ok(log.block_number)
    }

    fn record(block_number: u64) -> LogRecord {
        LogRecord {
            block_number,
            ..Default::default()
        }
    }

    struct Feed {
        logs: mpsc::Sender<LogRecord>,
        errors: mpsc::Sender<BindError>,
        unsub: oneshot::Receiver<()>,
    }

    fn watch(sink_capacity: usize) -> (EventWatch, mpsc::Receiver<u64>, Feed) {
        let (log_tx, log_rx) = mpsc::channel(16);
        let (err_tx, err_rx) = mpsc::channel(1);
        let (unsub_tx, unsub_rx) = oneshot::channel();
        let (sink_tx, sink_rx) = mpsc::channel(sink_capacity);
        let watch = spawn(
            block_number as fn(&LogRecord) -> Result<u64, BindError>,
            log_rx,
            Subscription::new(err_rx, unsub_tx),
            sink_tx,
        );
        (
            watch,
            sink_rx,
            Feed {
                logs: log_tx,
                errors: err_tx,
                unsub: unsub_rx,
            },
        )
    }

    #[tokio::test]
    async fn test_forwards_in_order_until_cancelled() {
        let (mut watch, mut sink, feed) = watch(16);
        for n in 1..=3u64 {
            feed.logs.send(record(n)).await.unwrap();
        }
        for n in 1..=3u64 {
            assert_eq!(sink.recv().await, Some(n));
        }
        watch.cancel();
        assert!(watch.join().await.is_ok());
        assert!(feed.unsub.await.is_ok(), "must unsubscribe on exit");
    }

    #[tokio::test]
    async fn test_cancel_before_any_record() {
        let (mut watch, mut sink, feed) = watch(1);
        watch.cancel();
        assert!(watch.join().await.is_ok());
        assert_eq!(sink.recv().await, None, "nothing delivered");
        assert!(feed.unsub.await.is_ok());
    }

    #[tokio::test]
    async fn test_subscription_failure_surfaces_via_join() {
        let (watch, _sink, feed) = watch(16);
        feed.errors
            .send(BindError::Subscription("feed lost".into()))
            .await
            .unwrap();
        let err = watch.join().await.unwrap_err();
        assert!(matches!(err, BindError::Subscription(_)), "got {err:?}");
        assert!(feed.unsub.await.is_ok());
    }

    #[tokio::test]
    async fn test_decode_failure_terminates_task() {
        let (watch, _sink, feed) = watch(16);
        let mut poisoned = record(1);
        poisoned.removed = true;
        feed.logs.send(poisoned).await.unwrap();
        let err = watch.join().await.unwrap_err();
        assert!(matches!(err, BindError::Decode(_)), "got {err:?}");
        assert!(feed.unsub.await.is_ok());
    }

    #[tokio::test]
    async fn test_blocked_sink_does_not_wedge_cancellation() {
        // Capacity 1, no consumer: the second delivery blocks.
        let (mut watch, sink, feed) = watch(1);
        feed.logs.send(record(1)).await.unwrap();
        feed.logs.send(record(2)).await.unwrap();
        tokio::task::yield_now().await;
        watch.cancel();
        assert!(watch.join().await.is_ok());
        assert!(feed.unsub.await.is_ok());
        drop(sink);
    }

    #[tokio::test]
    async fn test_dropped_sink_stops_task_cleanly() {
        let (watch, sink, feed) = watch(1);
        drop(sink);
        feed.logs.send(record(1)).await.unwrap();
        assert!(watch.join().await.is_ok());
        assert!(feed.unsub.await.is_ok());
    }
}
