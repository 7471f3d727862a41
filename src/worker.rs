//! Background threads owned through a stop channel.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Owner of a background thread. The thread receives the stop channel and is
/// expected to exit once a message arrives or the sender goes away.
///
/// Dropping the handle signals the thread without waiting for it.
#[derive(Debug)]
pub struct WorkerHandle {
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn<F>(body: F) -> Self
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel();
        let join = thread::spawn(move || body(stop_rx));
        Self {
            stop_tx: Some(stop_tx),
            join: Some(join),
        }
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().map(|j| !j.is_finished()).unwrap_or(false)
    }

    /// Signal the thread and detach it. Work already in flight, such as an
    /// HTTP request, finishes in the background.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.join.take();
    }

    /// Signal the thread and wait for it to exit.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
