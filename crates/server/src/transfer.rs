//! Push-to-pull bridge for streamed transfers.
//!
//! A [`TransferQueue`] decouples a producer that receives chunks on its own
//! schedule from a consumer that reads them in order. Items are delivered in
//! push order; a consumer waiting on an empty queue is paired with the next
//! pushed item, oldest waiter first. The sequence ends with exactly one
//! terminal signal: end of sequence (`stop`, `close`) or an error (`fail`).

use futures::Stream;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// One pull from the queue: `Some(Ok(item))`, `Some(Err(error))`, or `None`
/// for end of sequence.
pub type QueueItem<T, E> = Option<Result<T, E>>;

type Waiter<T, E> = oneshot::Sender<QueueItem<T, E>>;

enum QueueState<E> {
    Open,
    /// Closed by `fail`; the error has not been handed to a consumer yet.
    Failed(E),
    /// Closed; every further pull reports end of sequence once the buffer drains.
    Ended,
}

struct Inner<T, E> {
    buffer: VecDeque<T>,
    waiters: VecDeque<Waiter<T, E>>,
    state: QueueState<E>,
}

/// Unbounded single-producer queue with FIFO waiter pairing.
///
/// Cloning yields another handle to the same queue.
pub struct TransferQueue<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
}

impl<T, E> Clone for TransferQueue<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Default for TransferQueue<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> TransferQueue<T, E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                buffer: VecDeque::new(),
                waiters: VecDeque::new(),
                state: QueueState::Open,
            })),
        }
    }

    /// Whether `stop`, `fail` or `close` has been called.
    pub fn is_closed(&self) -> bool {
        !matches!(self.inner.lock().state, QueueState::Open)
    }

    /// Number of buffered items not yet pulled.
    pub fn buffered(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    /// Enqueue an item, handing it straight to the oldest waiting consumer if
    /// there is one. No-op once the queue is closed.
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, QueueState::Open) {
            return;
        }

        let mut item = item;
        while let Some(waiter) = inner.waiters.pop_front() {
            match waiter.send(Some(Ok(item))) {
                Ok(()) => return,
                // Waiter gave up (its pull was dropped); try the next one.
                Err(Some(Ok(returned))) => item = returned,
                Err(_) => return,
            }
        }
        inner.buffer.push_back(item);
    }

    /// Close the queue. Waiting consumers receive end of sequence; buffered
    /// items remain available. Idempotent.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, QueueState::Open) {
            return;
        }
        inner.state = QueueState::Ended;
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(None);
        }
    }

    /// Close the queue without delivering anything further and discard the
    /// buffer. Waiting consumers receive end of sequence.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.state = QueueState::Ended;
        inner.buffer.clear();
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(None);
        }
    }

    /// Pull the next item, suspending until one is pushed or the queue closes.
    pub async fn next(&self) -> QueueItem<T, E> {
        let rx = {
            let mut inner = self.inner.lock();
            if let Some(item) = inner.buffer.pop_front() {
                return Some(Ok(item));
            }
            match std::mem::replace(&mut inner.state, QueueState::Ended) {
                QueueState::Open => {
                    inner.state = QueueState::Open;
                    let (tx, rx) = oneshot::channel();
                    inner.waiters.push_back(tx);
                    rx
                }
                QueueState::Failed(error) => return Some(Err(error)),
                QueueState::Ended => return None,
            }
        };
        // A dropped sender means the queue itself was dropped.
        rx.await.unwrap_or(None)
    }
}

impl<T, E: Clone> TransferQueue<T, E> {
    /// Close the queue with an error. Every waiting consumer receives it; with
    /// none waiting, the pull after the buffer drains does. Idempotent.
    pub fn fail(&self, error: E) {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, QueueState::Open) {
            return;
        }
        let waiters: Vec<_> = inner.waiters.drain(..).collect();
        let mut delivered = false;
        for waiter in waiters {
            delivered |= waiter.send(Some(Err(error.clone()))).is_ok();
        }
        inner.state = if delivered {
            QueueState::Ended
        } else {
            QueueState::Failed(error)
        };
    }
}

impl<T, E> TransferQueue<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Consume the queue as a [`Stream`]. Dropping the stream closes the queue.
    pub fn into_stream(self) -> TransferStream<T, E> {
        let inner = futures::stream::unfold(self.clone(), |queue| async move {
            queue.next().await.map(|item| (item, queue))
        });
        TransferStream {
            queue: self,
            inner: Box::pin(inner),
        }
    }
}

/// Stream adapter over a [`TransferQueue`]; closes the queue when dropped.
pub struct TransferStream<T, E> {
    queue: TransferQueue<T, E>,
    inner: BoxStream<'static, Result<T, E>>,
}

impl<T, E> Stream for TransferStream<T, E> {
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<T, E> Drop for TransferStream<T, E> {
    fn drop(&mut self) {
        self.queue.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    type Queue = TransferQueue<&'static str, String>;

    #[tokio::test]
    async fn buffered_items_then_end() {
        let queue = Queue::new();
        queue.push("a");
        queue.push("b");
        queue.push("c");
        queue.stop();

        assert_eq!(queue.next().await, Some(Ok("a")));
        assert_eq!(queue.next().await, Some(Ok("b")));
        assert_eq!(queue.next().await, Some(Ok("c")));
        assert_eq!(queue.next().await, None);
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn waiting_consumer_receives_push() {
        let queue = Queue::new();
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.push("x");
        assert_eq!(consumer.await.unwrap(), Some(Ok("x")));
        assert_eq!(queue.buffered(), 0);
    }

    #[tokio::test]
    async fn waiters_are_served_oldest_first() {
        let queue = Queue::new();
        let first = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.push("one");
        queue.push("two");
        assert_eq!(first.await.unwrap(), Some(Ok("one")));
        assert_eq!(second.await.unwrap(), Some(Ok("two")));
    }

    #[tokio::test]
    async fn fail_reaches_waiting_consumer() {
        let queue = Queue::new();
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.fail("boom".to_string());
        assert_eq!(consumer.await.unwrap(), Some(Err("boom".to_string())));
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn fail_without_waiter_reaches_next_pull_after_buffer() {
        let queue = Queue::new();
        queue.push("a");
        queue.fail("boom".to_string());

        assert_eq!(queue.next().await, Some(Ok("a")));
        assert_eq!(queue.next().await, Some(Err("boom".to_string())));
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn terminal_calls_are_idempotent() {
        let queue = Queue::new();
        queue.stop();
        queue.stop();
        queue.fail("late".to_string());
        queue.push("ignored");
        assert_eq!(queue.next().await, None);

        let queue = Queue::new();
        queue.fail("first".to_string());
        queue.fail("second".to_string());
        queue.stop();
        assert_eq!(queue.next().await, Some(Err("first".to_string())));
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn stop_wakes_all_waiters() {
        let queue = Queue::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.next().await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.stop();
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn close_discards_buffer() {
        let queue = Queue::new();
        queue.push("a");
        queue.push("b");
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn dropped_pull_does_not_swallow_items() {
        let queue = Queue::new();
        let abandoned = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        abandoned.abort();
        let _ = abandoned.await;

        queue.push("kept");
        assert_eq!(queue.next().await, Some(Ok("kept")));
    }

    #[tokio::test]
    async fn stream_adapter_yields_items_and_closes_on_drop() {
        let queue = Queue::new();
        queue.push("a");
        queue.push("b");

        let mut stream = queue.clone().into_stream();
        assert_eq!(stream.next().await, Some(Ok("a")));
        drop(stream);

        assert!(queue.is_closed());
        queue.push("c");
        assert_eq!(queue.next().await, None);
    }

    #[tokio::test]
    async fn stream_adapter_ends_after_error() {
        let queue = Queue::new();
        queue.push("a");
        queue.fail("boom".to_string());

        let items: Vec<_> = queue.into_stream().collect().await;
        assert_eq!(items, vec![Ok("a"), Err("boom".to_string())]);
    }
}
