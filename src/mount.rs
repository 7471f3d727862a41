use crate::host::{is_visible, HostTree, NodeId};
use std::cell::Cell;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

/// One way of attaching the widget to the host, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountStrategy {
    /// Insert immediately before the first visible host control matching one
    /// of the selectors.
    AnchorAdjacent(Vec<String>),
    /// Append into `container` found inside the first visible `roots` match,
    /// or into the root itself when it has no visible container.
    DockContainer { roots: Vec<String>, container: String },
    /// Fixed-position overlay on the document root. Always available.
    Floating,
}

/// Where a strategy decided the widget should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mount {
    Before(NodeId),
    Into(NodeId),
    Floating,
}

impl Mount {
    pub fn is_docked(&self) -> bool {
        !matches!(self, Mount::Floating)
    }

    pub fn target(&self) -> Option<NodeId> {
        match self {
            Mount::Before(node) | Mount::Into(node) => Some(*node),
            Mount::Floating => None,
        }
    }

    /// Move `widget` into the location described by `self`.
    pub fn apply<H: HostTree + ?Sized>(&self, host: &mut H, widget: NodeId) -> anyhow::Result<()> {
        match self {
            Mount::Before(anchor) => host.insert_before(*anchor, widget),
            Mount::Into(container) => host.append_child(*container, widget),
            Mount::Floating => host.append_to_root(widget),
        }
    }
}

impl MountStrategy {
    /// Check the host once. Pure with respect to the host: nothing is moved.
    pub fn probe<H: HostTree + ?Sized>(&self, host: &H) -> Option<Mount> {
        match self {
            MountStrategy::AnchorAdjacent(selectors) => selectors
                .iter()
                .filter_map(|sel| host.query(sel))
                .find(|node| is_visible(host, *node))
                .map(Mount::Before),
            MountStrategy::DockContainer { roots, container } => {
                let root = roots
                    .iter()
                    .filter_map(|sel| host.query(sel))
                    .find(|node| is_visible(host, *node))?;
                let target = host
                    .query_within(root, container)
                    .filter(|node| is_visible(host, *node))
                    .unwrap_or(root);
                Some(Mount::Into(target))
            }
            MountStrategy::Floating => Some(Mount::Floating),
        }
    }
}

/// Cooperative pause between discovery attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);

    /// Once true the resolver gives up without probing again.
    fn cancelled(&self) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountBudget {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for MountBudget {
    fn default() -> Self {
        Self {
            attempts: 200,
            interval: Duration::from_millis(50),
        }
    }
}

/// Sleeps on a worker's stop channel, waking early once the worker is told
/// to stop.
#[derive(Debug)]
pub struct StopSleeper {
    stop_rx: Receiver<()>,
    stopped: Cell<bool>,
}

impl StopSleeper {
    pub fn new(stop_rx: Receiver<()>) -> Self {
        Self {
            stop_rx,
            stopped: Cell::new(false),
        }
    }
}

impl Sleeper for StopSleeper {
    fn sleep(&self, duration: Duration) {
        if self.stopped.get() {
            return;
        }
        match self.stop_rx.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => self.stopped.set(true),
        }
    }

    fn cancelled(&self) -> bool {
        self.stopped.get()
    }
}

/// Finds a live attachment point inside the host tree.
#[derive(Debug, Clone)]
pub struct MountResolver {
    strategies: Vec<MountStrategy>,
}

impl MountResolver {
    pub fn new(strategies: Vec<MountStrategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[MountStrategy] {
        &self.strategies
    }

    /// One pass over the non-floating strategies.
    pub fn attempt<H: HostTree + ?Sized>(&self, host: &H) -> Option<Mount> {
        self.strategies
            .iter()
            .filter(|s| !matches!(s, MountStrategy::Floating))
            .find_map(|s| s.probe(host))
    }

    /// Poll the host until a docked strategy succeeds or the budget runs out.
    /// Exhaustion is not an error: the widget stays floating.
    pub fn resolve<H, S>(&self, host: &H, budget: MountBudget, sleeper: &S) -> Mount
    where
        H: HostTree + ?Sized,
        S: Sleeper + ?Sized,
    {
        let attempts = budget.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(mount) = self.attempt(host) {
                tracing::info!(attempt, ?mount, "host attachment point found");
                return mount;
            }
            if attempt < attempts {
                tracing::trace!(attempt, "no attachment point yet");
                sleeper.sleep(budget.interval);
                if sleeper.cancelled() {
                    tracing::debug!(attempt, "attachment search cancelled");
                    return Mount::Floating;
                }
            }
        }
        tracing::info!(attempts, "no attachment point found; staying floating");
        Mount::Floating
    }

    /// Whether a previously resolved mount still points at a live element.
    pub fn validate<H: HostTree + ?Sized>(host: &H, mount: &Mount) -> bool {
        match mount.target() {
            Some(node) => is_visible(host, node),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::position::Size;
    use std::sync::mpsc;

    struct CountingSleeper(Cell<u32>);

    impl Sleeper for CountingSleeper {
        fn sleep(&self, _duration: Duration) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn strategies() -> Vec<MountStrategy> {
        vec![
            MountStrategy::AnchorAdjacent(vec!["#queue-button".into(), ".queue".into()]),
            MountStrategy::DockContainer {
                roots: vec![".comfy-menu".into()],
                container: ".comfy-menu-right".into(),
            },
            MountStrategy::Floating,
        ]
    }

    #[test]
    fn anchor_wins_over_dock() {
        let host = MemoryHost::default();
        let root = host.root();
        let menu = host.add(root, "div.comfy-menu", Size::new(400.0, 30.0)).unwrap();
        let queue = host.add(menu, "button.queue", Size::new(60.0, 24.0)).unwrap();
        let resolver = MountResolver::new(strategies());
        assert_eq!(resolver.attempt(&host), Some(Mount::Before(queue)));
    }

    #[test]
    fn hidden_anchor_falls_through_to_dock_root() {
        let host = MemoryHost::default();
        let root = host.root();
        let menu = host.add(root, "div.comfy-menu", Size::new(400.0, 30.0)).unwrap();
        let queue = host.add(menu, "button#queue-button", Size::new(60.0, 24.0)).unwrap();
        host.set_hidden(queue, true);
        let resolver = MountResolver::new(strategies());
        assert_eq!(resolver.attempt(&host), Some(Mount::Into(menu)));

        let right = host
            .add(menu, "div.comfy-menu-right", Size::new(100.0, 30.0))
            .unwrap();
        assert_eq!(resolver.attempt(&host), Some(Mount::Into(right)));
    }

    #[test]
    fn exhaustion_resolves_to_floating() {
        let host = MemoryHost::default();
        let resolver = MountResolver::new(strategies());
        let sleeper = CountingSleeper(Cell::new(0));
        let budget = MountBudget {
            attempts: 5,
            interval: Duration::from_millis(50),
        };
        assert_eq!(resolver.resolve(&host, budget, &sleeper), Mount::Floating);
        assert_eq!(sleeper.0.get(), 4);
    }

    #[test]
    fn validate_detects_vanished_dock() {
        let host = MemoryHost::default();
        let root = host.root();
        let menu = host.add(root, "div.comfy-menu", Size::new(400.0, 30.0)).unwrap();
        let mount = Mount::Into(menu);
        assert!(MountResolver::validate(&host, &mount));
        host.remove(menu);
        assert!(!MountResolver::validate(&host, &mount));
        assert!(MountResolver::validate(&host, &Mount::Floating));
    }

    #[test]
    fn stopped_search_gives_up_early() {
        let host = MemoryHost::default();
        let resolver = MountResolver::new(strategies());
        let (stop_tx, stop_rx) = mpsc::channel();
        stop_tx.send(()).unwrap();
        let sleeper = StopSleeper::new(stop_rx);
        let budget = MountBudget {
            attempts: 200,
            interval: Duration::from_secs(5),
        };
        let started = std::time::Instant::now();
        assert_eq!(resolver.resolve(&host, budget, &sleeper), Mount::Floating);
        assert!(sleeper.cancelled());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
