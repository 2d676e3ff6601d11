//! Serializes writes to a session's device control socket. Inbound
//! control frames are enqueued into a bounded queue; under overflow, the
//! oldest droppable frame (a touch `MOVE`) is discarded, never `UP`/`DOWN`
//! or power events.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::wire::control;

struct Shared {
    queue: Mutex<VecDeque<Bytes>>,
    notify: Notify,
    capacity: usize,
}

/// Handle held by the client-facing side: enqueues frames for the writer
/// task to forward to the device.
#[derive(Clone)]
pub struct ControlRouter {
    shared: Arc<Shared>,
}

impl ControlRouter {
    /// Spawns the single writer task for `socket` and returns the handle
    /// used to enqueue frames, plus the writer task's own `JoinHandle` so
    /// teardown can wait for it to actually drain rather than guessing at
    /// a fixed delay. `capacity` bounds the queue per §4.5 (default 1024).
    pub fn spawn<W>(
        mut socket: W,
        cancel: CancellationToken,
        capacity: usize,
    ) -> (Self, tokio::task::JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        });

        let writer_shared = shared.clone();
        let handle = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    frame = Self::next_frame(&writer_shared) => frame,
                };

                if socket.write_all(&frame).await.is_err() {
                    break;
                }
            }
        });

        (Self { shared }, handle)
    }

    /// Waits for and pops the oldest queued frame.
    async fn next_frame(shared: &Shared) -> Bytes {
        loop {
            if let Some(frame) = shared.queue.lock().pop_front() {
                return frame;
            }
            shared.notify.notified().await;
        }
    }

    /// Enqueues a frame. Malformed (empty) frames are dropped with a
    /// warning at the call site by the caller (`ClientGateway`), never
    /// forwarded here.
    ///
    /// On queue overflow: if `frame` itself is droppable
    /// ([`should_drop_on_overflow`]), it is dropped outright. Otherwise the
    /// oldest droppable frame already queued is evicted to make room; if
    /// every queued frame is itself essential, the oldest one is evicted
    /// anyway rather than growing the queue unbounded.
    pub fn try_enqueue(&self, frame: Bytes) -> Result<()> {
        let mut queue = self.shared.queue.lock();

        if queue.len() >= self.shared.capacity {
            if should_drop_on_overflow(&frame) {
                return Err(AppError::SocketWriteError("control queue full".to_string()));
            }
            let evict_at = queue.iter().position(|queued| should_drop_on_overflow(queued));
            match evict_at {
                Some(index) => {
                    queue.remove(index);
                }
                None => {
                    queue.pop_front();
                }
            }
        }

        queue.push_back(frame);
        drop(queue);
        self.shared.notify.notify_one();
        Ok(())
    }
}

/// Whether `frame` is safe to discard when the queue is full, i.e. it is
/// not one of the frame types §4.5 requires never be dropped.
pub fn should_drop_on_overflow(frame: &[u8]) -> bool {
    !control::is_essential(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_frames_in_order() {
        let (client, mut server) = tokio::io::duplex(256);
        let cancel = CancellationToken::new();
        let (router, _handle) = ControlRouter::spawn(client, cancel.clone(), 8);

        router.try_enqueue(Bytes::from_static(&[2, 0])).unwrap();
        router.try_enqueue(Bytes::from_static(&[3, 1])).unwrap();

        let mut buf = [0u8; 4];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut buf)
            .await
            .unwrap();
        assert_eq!(buf, [2, 0, 3, 1]);

        cancel.cancel();
    }

    #[test]
    fn touch_move_is_droppable_on_overflow() {
        assert!(should_drop_on_overflow(&[2, 2]));
        assert!(!should_drop_on_overflow(&[2, 0]));
        assert!(!should_drop_on_overflow(&[10, 1]));
    }

    #[tokio::test]
    async fn overflow_evicts_oldest_move_before_essential_frame() {
        // A socket nobody drains: the writer task never pulls from the
        // queue, so every enqueue goes straight to `try_enqueue`'s
        // overflow path once capacity is reached.
        let (client, _server) = tokio::io::duplex(4);
        let cancel = CancellationToken::new();
        let (router, _handle) = ControlRouter::spawn(client, cancel.clone(), 2);

        // Give the writer task a chance to pull the first frame only if it
        // runs; either way, fill the queue to capacity with a MOVE then a
        // DOWN.
        router
            .try_enqueue(Bytes::from_static(&[2, 2])) // touch MOVE, droppable
            .unwrap();
        router
            .try_enqueue(Bytes::from_static(&[2, 0])) // touch DOWN, essential
            .unwrap();

        // Queue is now at capacity (2). Enqueuing another essential frame
        // must evict the MOVE, not fail and not evict the DOWN.
        let result = router.try_enqueue(Bytes::from_static(&[10, 1]));
        assert!(result.is_ok());

        let remaining: Vec<Bytes> = router.shared.queue.lock().iter().cloned().collect();
        assert!(remaining.iter().any(|f| f.as_ref() == [2, 0]));
        assert!(remaining.iter().any(|f| f.as_ref() == [10, 1]));
        assert!(!remaining.iter().any(|f| f.as_ref() == [2, 2]));

        cancel.cancel();
    }

    #[test]
    fn overflow_drops_new_move_outright_when_full_of_essential_frames() {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::from(vec![
                Bytes::from_static(&[2, 0]),
                Bytes::from_static(&[2, 1]),
            ])),
            notify: Notify::new(),
            capacity: 2,
        });
        let router = ControlRouter { shared };

        let result = router.try_enqueue(Bytes::from_static(&[2, 2]));
        assert!(result.is_err());

        let remaining: Vec<Bytes> = router.shared.queue.lock().iter().cloned().collect();
        assert_eq!(remaining.len(), 2);
    }
}
