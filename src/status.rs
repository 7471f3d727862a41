use crate::client::{ControlTransport, HttpReply};
use crate::worker::WorkerHandle;
use serde::Deserialize;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Server-side restore availability as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreAvailability {
    /// Endpoint absent, failing, or not queried yet.
    #[default]
    Unknown,
    /// Shed state exists; the count of stopped processes when reported.
    Ready(Option<u64>),
    Unavailable,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    can_restore: bool,
    #[serde(default)]
    stopped_count: Option<u64>,
}

/// Any failure, including a 404 from a server that predates the endpoint,
/// maps to `Unknown` rather than `Unavailable`.
pub fn interpret_status(reply: anyhow::Result<HttpReply>) -> RestoreAvailability {
    let reply = match reply {
        Ok(reply) => reply,
        Err(err) => {
            tracing::debug!(error = %format!("{err:#}"), "status request failed");
            return RestoreAvailability::Unknown;
        }
    };
    if !reply.is_success() {
        tracing::debug!(status = reply.status, "status endpoint unavailable");
        return RestoreAvailability::Unknown;
    }
    let parsed = reply
        .body
        .and_then(|body| serde_json::from_value::<StatusBody>(body).ok());
    match parsed {
        Some(StatusBody {
            can_restore: true,
            stopped_count,
        }) => RestoreAvailability::Ready(stopped_count),
        Some(_) => RestoreAvailability::Unavailable,
        None => RestoreAvailability::Unknown,
    }
}

type Listener = Arc<dyn Fn(RestoreAvailability) + Send + Sync>;

/// Polls the status endpoint and keeps the latest [`RestoreAvailability`].
///
/// Clones share the same slot. Refreshes may overlap; whichever completes
/// last wins.
#[derive(Clone)]
pub struct StatusPoller {
    transport: Arc<dyn ControlTransport>,
    path: String,
    current: Arc<Mutex<RestoreAvailability>>,
    listener: Option<Listener>,
}

impl StatusPoller {
    pub fn new(transport: Arc<dyn ControlTransport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
            current: Arc::new(Mutex::new(RestoreAvailability::Unknown)),
            listener: None,
        }
    }

    /// Called with every refreshed value.
    pub fn on_change<F>(mut self, listener: F) -> Self
    where
        F: Fn(RestoreAvailability) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn current(&self) -> RestoreAvailability {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn refresh(&self) -> RestoreAvailability {
        let availability = interpret_status(self.transport.get_json(&self.path));
        let previous = {
            let mut slot = self.current.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *slot, availability)
        };
        if previous != availability {
            tracing::debug!(from = ?previous, to = ?availability, "restore availability updated");
        }
        if let Some(listener) = &self.listener {
            listener(availability);
        }
        availability
    }

    /// Refresh now and then every `interval` until the handle is stopped
    /// or dropped.
    pub fn start(&self, interval: Duration) -> WorkerHandle {
        let poller = self.clone();
        tracing::debug!(?interval, "status polling started");
        WorkerHandle::spawn(move |stop_rx| {
            loop {
                poller.refresh();
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            tracing::debug!("status polling stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::mpsc::{self, Receiver, Sender};

    #[test]
    fn maps_status_bodies() {
        let ready = interpret_status(Ok(HttpReply::new(
            200,
            Some(json!({"can_restore": true, "stopped_count": 3})),
        )));
        assert_eq!(ready, RestoreAvailability::Ready(Some(3)));

        let ready = interpret_status(Ok(HttpReply::new(200, Some(json!({"can_restore": true})))));
        assert_eq!(ready, RestoreAvailability::Ready(None));

        let none = interpret_status(Ok(HttpReply::new(200, Some(json!({"can_restore": false})))));
        assert_eq!(none, RestoreAvailability::Unavailable);
    }

    #[test]
    fn failures_are_unknown_never_unavailable() {
        for reply in [
            Ok(HttpReply::new(404, None)),
            Ok(HttpReply::new(404, Some(json!({"can_restore": false})))),
            Ok(HttpReply::new(500, Some(json!({"error": "boom"})))),
            Ok(HttpReply::new(200, None)),
            Ok(HttpReply::new(200, Some(json!({"stopped_count": 1})))),
            Err(anyhow::anyhow!("connection refused")),
        ] {
            assert_eq!(interpret_status(reply), RestoreAvailability::Unknown);
        }
    }

    /// Hands out queued replies; a gated reply blocks until its gate opens.
    struct QueuedTransport {
        replies: Mutex<VecDeque<(Option<Receiver<()>>, HttpReply)>>,
        started: Mutex<Sender<()>>,
    }

    impl ControlTransport for QueuedTransport {
        fn post_json(&self, _path: &str, _body: &Value) -> anyhow::Result<HttpReply> {
            Err(anyhow::anyhow!("not scripted"))
        }

        fn get_json(&self, _path: &str) -> anyhow::Result<HttpReply> {
            let (gate, reply) = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no reply queued"))?;
            let _ = self.started.lock().unwrap().send(());
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            Ok(reply)
        }
    }

    #[test]
    fn slowest_refresh_wins() {
        let (gate_tx, gate_rx) = mpsc::channel();
        let (started_tx, started_rx) = mpsc::channel();
        let transport = QueuedTransport {
            replies: Mutex::new(VecDeque::from([
                (
                    Some(gate_rx),
                    HttpReply::new(200, Some(json!({"can_restore": true, "stopped_count": 1}))),
                ),
                (None, HttpReply::new(200, Some(json!({"can_restore": false})))),
            ])),
            started: Mutex::new(started_tx),
        };
        let poller = StatusPoller::new(Arc::new(transport), "/status");

        let slow = {
            let poller = poller.clone();
            std::thread::spawn(move || poller.refresh())
        };
        started_rx.recv().unwrap();

        assert_eq!(poller.refresh(), RestoreAvailability::Unavailable);
        assert_eq!(poller.current(), RestoreAvailability::Unavailable);

        gate_tx.send(()).unwrap();
        assert_eq!(slow.join().unwrap(), RestoreAvailability::Ready(Some(1)));
        assert_eq!(poller.current(), RestoreAvailability::Ready(Some(1)));
    }

    #[test]
    fn listener_sees_every_refresh() {
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        drop(gate_tx);
        let (started_tx, _started_rx) = mpsc::channel();
        let transport = QueuedTransport {
            replies: Mutex::new(VecDeque::from([
                (Some(gate_rx), HttpReply::new(200, Some(json!({"can_restore": false})))),
                (None, HttpReply::new(503, None)),
            ])),
            started: Mutex::new(started_tx),
        };
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let poller = StatusPoller::new(Arc::new(transport), "/status")
            .on_change(move |availability| sink.lock().unwrap().push(availability));
        poller.refresh();
        poller.refresh();
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[RestoreAvailability::Unavailable, RestoreAvailability::Unknown]
        );
    }
}
