//! One-shot background jobs whose result is collected by polling from the owning thread.

use std::sync::mpsc;
use std::time::Duration;

#[derive(Debug, PartialEq, Eq)]
pub enum WorkerPoll<T> {
    Pending,
    Ready(T),
    /// The worker went away without sending, e.g. it panicked.
    Lost,
}

/// Receiving end of a job started with [`spawn_worker`].
///
/// Dropping the handle detaches the job; its result is discarded when it arrives.
#[derive(Debug)]
pub struct WorkerHandle<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> WorkerHandle<T> {
    pub fn try_take(&self) -> WorkerPoll<T> {
        match self.rx.try_recv() {
            Ok(result) => WorkerPoll::Ready(result),
            Err(mpsc::TryRecvError::Empty) => WorkerPoll::Pending,
            Err(mpsc::TryRecvError::Disconnected) => WorkerPoll::Lost,
        }
    }

    /// Blocks up to `timeout` for the result.
    pub fn wait(&self, timeout: Duration) -> WorkerPoll<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => WorkerPoll::Ready(result),
            Err(mpsc::RecvTimeoutError::Timeout) => WorkerPoll::Pending,
            Err(mpsc::RecvTimeoutError::Disconnected) => WorkerPoll::Lost,
        }
    }
}

pub fn spawn_worker<T, W>(work: W) -> WorkerHandle<T>
where
    T: Send + 'static,
    W: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<T>();
    std::thread::spawn(move || {
        let result = work();
        if tx.send(result).is_err() {
            tracing::debug!("worker result discarded; receiver dropped");
        }
    });
    WorkerHandle { rx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn worker_result_is_delivered_once() {
        let handle = spawn_worker(|| 21 * 2);
        assert_eq!(handle.wait(Duration::from_secs(5)), WorkerPoll::Ready(42));
        assert_eq!(handle.try_take(), WorkerPoll::Lost);
    }

    #[test]
    fn pending_until_worker_finishes() {
        let (release_tx, release_rx) = channel::<()>();
        let handle = spawn_worker(move || {
            let _ = release_rx.recv();
            "done"
        });
        assert_eq!(handle.try_take(), WorkerPoll::Pending);
        release_tx.send(()).expect("worker should be waiting");
        assert_eq!(handle.wait(Duration::from_secs(5)), WorkerPoll::Ready("done"));
    }

    #[test]
    fn panicking_worker_is_reported_lost() {
        let handle = spawn_worker(|| -> u8 { panic!("worker failure") });
        assert_eq!(handle.wait(Duration::from_secs(5)), WorkerPoll::Lost);
    }
}
