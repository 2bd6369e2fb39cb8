//! Trigger queue: unbounded handoff of buffer ownership from the acquisition
//! front end to the core loop. Many producers, one consumer, never blocks.

use crossbeam_channel as cb;

use crate::pool::BufferHandle;

/// Create a connected producer/consumer pair.
pub fn trigger_queue() -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = cb::unbounded();
    (QueueProducer { tx }, QueueConsumer { rx })
}

/// Push side. Clone it for each acquisition thread.
#[derive(Clone)]
pub struct QueueProducer {
    tx: cb::Sender<BufferHandle>,
}

impl QueueProducer {
    /// Hand a buffer to the consumer. If the consumer is gone the handle comes back.
    pub fn push(&self, handle: BufferHandle) -> Result<(), BufferHandle> {
        self.tx.try_send(handle).map_err(|e| e.into_inner())
    }
}

/// Pop side. Deliberately not `Clone`: there is exactly one consumer.
pub struct QueueConsumer {
    rx: cb::Receiver<BufferHandle>,
}

impl QueueConsumer {
    /// Non-blocking pop. None means the queue is currently empty.
    #[inline]
    pub fn pop(&self) -> Option<BufferHandle> {
        self.rx.try_recv().ok()
    }

    /// Buffers waiting to be consumed.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferPool;

    #[test]
    fn test_fifo_order_and_empty_pop() {
        let pool = BufferPool::new(16, 3);
        let (tx, rx) = trigger_queue();
        assert!(rx.pop().is_none());

        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        let (ia, ib) = (a.index(), b.index());
        tx.push(a).unwrap();
        tx.clone().push(b).unwrap();
        assert_eq!(rx.len(), 2);

        assert_eq!(rx.pop().unwrap().index(), ia);
        assert_eq!(rx.pop().unwrap().index(), ib);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_push_after_consumer_dropped_returns_handle() {
        let pool = BufferPool::new(16, 1);
        let (tx, rx) = trigger_queue();
        drop(rx);
        let h = pool.allocate().unwrap();
        let back = tx.push(h).unwrap_err();
        pool.reclaim(back);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_multiple_producers() {
        let pool = std::sync::Arc::new(BufferPool::new(16, 64));
        let (tx, rx) = trigger_queue();
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let tx = tx.clone();
                let pool = std::sync::Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..16 {
                        let h = pool.allocate().unwrap();
                        tx.push(h).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let mut count = 0;
        while let Some(h) = rx.pop() {
            pool.reclaim(h);
            count += 1;
        }
        assert_eq!(count, 64);
        assert_eq!(pool.available(), 64);
    }
}
