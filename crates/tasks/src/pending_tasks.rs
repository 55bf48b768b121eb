use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use futures_util::task::AtomicWaker;

/// Count of tasks still holding a [`ShutdownGuard`](crate::ShutdownGuard).
#[derive(Debug, Default)]
pub(crate) struct PendingTasks {
    counter: AtomicUsize,
    waker: AtomicWaker,
}

impl PendingTasks {
    pub(crate) fn current(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    pub(crate) fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.waker.wake();
        }
    }

    pub(crate) fn wait_for_zero(self: Arc<Self>) -> WaitForZero {
        WaitForZero { pending: self }
    }
}

pub(crate) struct WaitForZero {
    pending: Arc<PendingTasks>,
}

impl Future for WaitForZero {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.pending.current() == 0 {
            return Poll::Ready(());
        }
        self.pending.waker.register(cx.waker());
        // the last guard may have dropped between the check and the registration
        if self.pending.current() == 0 {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_wait_for_zero_wakes_on_last_decrement() {
        let pending = Arc::new(PendingTasks::default());
        pending.increment();
        pending.increment();

        let p = pending.clone();
        tokio::spawn(async move {
            p.decrement();
            tokio::time::sleep(Duration::from_millis(10)).await;
            p.decrement();
        });

        tokio::time::timeout(Duration::from_secs(1), pending.clone().wait_for_zero())
            .await
            .expect("counter should reach zero");
        assert_eq!(pending.current(), 0);
    }
}
