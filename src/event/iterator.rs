use std::collections::VecDeque;

use tokio::sync::mpsc;

use super::DecodeEvent;
use crate::{backend::Subscription, error::BindError, types::LogRecord};

/// Pull-based cursor over one event type's occurrences.
///
/// Drains an already-retrieved historical result set first, then continues
/// transparently from the live subscription that was opened *before* the
/// historical query ran. That ordering closes the race window between
/// "query executed" and "feed established": nothing emitted in the gap is
/// lost, at the cost of a possible duplicate across the boundary.
///
/// Single consumer; not for concurrent reads.
pub struct EventIterator<D: DecodeEvent> {
    decoder: D,
    history: VecDeque<LogRecord>,
    live: mpsc::Receiver<LogRecord>,
    sub: Subscription,
    event: Option<D::Event>,
    failure: Option<BindError>,
    /// The live feed has ended (failure or clean close); only its backlog
    /// remains.
    done: bool,
    /// Terminal: nothing further will ever be delivered.
    closed: bool,
}

impl<D: DecodeEvent> EventIterator<D> {
    /// `history` is the completed bounded query result; `live` and `sub`
    /// are the feed opened before that query ran.
    pub fn new(
        decoder: D,
        history: Vec<LogRecord>,
        live: mpsc::Receiver<LogRecord>,
        sub: Subscription,
    ) -> Self {
        Self {
            decoder,
            history: history.into(),
            live,
            sub,
            event: None,
            failure: None,
            done: false,
            closed: false,
        }
    }

    /// Advances to the next occurrence.
    ///
    /// Returns `true` with [`Self::event`] updated, or `false` once the
    /// iterator is exhausted or failed. May block while the feed is live;
    /// after the feed has ended only the already-buffered backlog is
    /// drained, non-blockingly. A recorded failure is terminal and
    /// `false` is permanent.
    pub async fn next(&mut self) -> bool {
        loop {
            if self.closed {
                return false;
            }
            if let Some(log) = self.history.pop_front() {
                return self.deliver(log);
            }
            if self.done {
                // Feed is gone; flush whatever it buffered before ending.
                return match self.live.try_recv() {
                    Ok(log) => self.deliver(log),
                    Err(_) => {
                        self.closed = true;
                        false
                    }
                };
            }
            tokio::select! {
                received = self.live.recv() => match received {
                    Some(log) => return self.deliver(log),
                    // Producer dropped the channel without reporting an
                    // error: clean end of feed.
                    None => self.done = true,
                },
                err = self.sub.failure() => {
                    self.failure = Some(err);
                    self.done = true;
                }
            }
        }
    }

    fn deliver(&mut self, log: LogRecord) -> bool {
        match self.decoder.decode(&log) {
            Ok(event) => {
                self.event = Some(event);
                true
            }
            Err(err) => {
                self.failure = Some(err);
                self.closed = true;
                false
            }
        }
    }

    /// The occurrence produced by the last successful [`Self::next`].
    pub fn event(&self) -> Option<&D::Event> {
        self.event.as_ref()
    }

    /// Sticky failure, if the iterator has failed.
    pub fn error(&self) -> Option<&BindError> {
        self.failure.as_ref()
    }

    /// Releases the subscription. Idempotent; safe before exhaustion and
    /// called automatically on drop.
    pub fn close(&mut self) {
        self.sub.unsubscribe();
    }
}

impl<D: DecodeEvent> Drop for EventIterator<D> {
    fn drop(&mut self) {
        self.close();
    }
}
