//! Composition root: one widget element wired to the mount resolver, drag
//! controller, action dispatcher and status poller.

use crate::client::ControlTransport;
use crate::dispatch::{ActionDispatcher, ActionKind, ActionState, ActionStateCell, Outcome};
use crate::drag::{DragController, PointerTarget};
use crate::host::{HostTree, Layout, NodeId};
use crate::mount::{Mount, MountBudget, MountResolver, Sleeper, StopSleeper};
use crate::position::{Bounds, KeyValueStore, Position, PositionStore, Size};
use crate::settings::WidgetSettings;
use crate::status::{RestoreAvailability, StatusPoller};
use crate::view::WidgetView;
use crate::worker::WorkerHandle;
use std::sync::{Arc, Mutex, MutexGuard};

/// Element id marking the single widget instance in the host tree.
pub const WIDGET_ELEMENT_ID: &str = "vram-widget";

/// Used for clamping until the host reports a real size for the widget.
const FALLBACK_SIZE: Size = Size {
    width: 240.0,
    height: 36.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Shed,
    Restore,
}

impl Button {
    fn kind(self) -> ActionKind {
        match self {
            Button::Shed => ActionKind::Shed,
            Button::Restore => ActionKind::Restore,
        }
    }
}

/// Host handle the widget can share with its background threads.
pub trait WidgetHost: HostTree + Clone + Send + 'static {}

impl<T: HostTree + Clone + Send + 'static> WidgetHost for T {}

/// Where the widget currently lives. Shared with the mount task and the
/// status listener, which both check `torn_down` before touching the host.
#[derive(Debug)]
struct Placement {
    mount: Mount,
    torn_down: bool,
}

type SharedPlacement = Arc<Mutex<Placement>>;

fn lock(placement: &SharedPlacement) -> MutexGuard<'_, Placement> {
    placement.lock().unwrap_or_else(|e| e.into_inner())
}

fn dock<H: HostTree>(host: &mut H, node: NodeId, found: Mount, placement: &mut Placement) {
    match found.apply(host, node) {
        Ok(()) => {
            host.set_layout(node, Layout::Flow);
            placement.mount = found;
            tracing::info!(mount = ?found, "widget docked");
        }
        Err(err) => tracing::warn!(?err, "failed to dock widget; staying floating"),
    }
}

/// Re-render the widget whenever the poller refreshes availability.
fn render_on_refresh<H: WidgetHost>(
    host: H,
    node: NodeId,
    placement: SharedPlacement,
    state: ActionStateCell,
) -> impl Fn(RestoreAvailability) + Send + Sync + 'static {
    let host = Mutex::new(host);
    move |availability| {
        let slot = lock(&placement);
        if slot.torn_down {
            return;
        }
        let view = WidgetView::project(&state.get(), availability);
        host.lock()
            .unwrap_or_else(|e| e.into_inner())
            .render(node, &view);
        drop(slot);
    }
}

pub enum Setup<H: WidgetHost, S: KeyValueStore> {
    Created(ControlWidget<H, S>),
    /// A widget element already exists in the host; nothing was changed.
    AlreadyPresent,
}

impl<H: WidgetHost, S: KeyValueStore> Setup<H, S> {
    pub fn into_widget(self) -> Option<ControlWidget<H, S>> {
        match self {
            Setup::Created(widget) => Some(widget),
            Setup::AlreadyPresent => None,
        }
    }
}

pub struct ControlWidget<H: WidgetHost, S: KeyValueStore> {
    host: H,
    node: NodeId,
    settings: WidgetSettings,
    resolver: MountResolver,
    placement: SharedPlacement,
    drag: DragController<S>,
    dispatcher: ActionDispatcher,
    status: StatusPoller,
    poll: Option<WorkerHandle>,
    mount_task: Option<WorkerHandle>,
}

impl<H: WidgetHost, S: KeyValueStore> ControlWidget<H, S> {
    /// Create the widget, float it immediately, start status polling and,
    /// unless disabled, look for a host location in the background.
    pub fn setup(
        mut host: H,
        store: S,
        transport: Arc<dyn ControlTransport>,
        settings: WidgetSettings,
    ) -> anyhow::Result<Setup<H, S>> {
        if host.element_by_id(WIDGET_ELEMENT_ID).is_some() {
            tracing::info!("widget already present; skipping setup");
            return Ok(Setup::AlreadyPresent);
        }

        let node = host.create_element("div", Some(WIDGET_ELEMENT_ID));
        let placement = Arc::new(Mutex::new(Placement {
            mount: Mount::Floating,
            torn_down: false,
        }));
        let status = StatusPoller::new(Arc::clone(&transport), settings.status_path.clone());
        let dispatcher =
            ActionDispatcher::new(transport, settings.clone()).with_status(status.clone());
        let status = status.on_change(render_on_refresh(
            host.clone(),
            node,
            Arc::clone(&placement),
            dispatcher.state_cell(),
        ));
        let drag = DragController::new(PositionStore::new(store, settings.position_key.clone()));

        let mut widget = Self {
            host,
            node,
            resolver: MountResolver::new(settings.strategies()),
            settings,
            placement,
            drag,
            dispatcher,
            status,
            poll: None,
            mount_task: None,
        };

        widget.host.append_to_root(node)?;
        let bounds = widget.bounds();
        let pos = widget.drag.restore(&bounds);
        widget.host.set_layout(node, Layout::Floating(pos));
        widget.render();
        tracing::info!(?pos, "widget created floating");

        if let Some(interval) = widget.settings.poll_interval() {
            widget.poll = Some(widget.status.start(interval));
        }
        if widget.settings.mount_on_setup {
            widget.mount_task = Some(widget.spawn_mount());
        }
        Ok(Setup::Created(widget))
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn mount_state(&self) -> Mount {
        lock(&self.placement).mount
    }

    pub fn settings(&self) -> &WidgetSettings {
        &self.settings
    }

    pub fn action_state(&self) -> ActionState {
        self.dispatcher.state()
    }

    /// Handle for observing the action lifecycle from another thread.
    pub fn action_state_cell(&self) -> ActionStateCell {
        self.dispatcher.state_cell()
    }

    pub fn availability(&self) -> RestoreAvailability {
        self.status.current()
    }

    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().map(WorkerHandle::is_running).unwrap_or(false)
    }

    /// Whether the background location search is still running.
    pub fn is_mounting(&self) -> bool {
        self.mount_task
            .as_ref()
            .map(WorkerHandle::is_running)
            .unwrap_or(false)
    }

    /// User-chosen floating position, `None` under automatic placement.
    pub fn saved_position(&self) -> Option<Position> {
        self.drag.position()
    }

    pub fn view(&self) -> WidgetView {
        WidgetView::project(&self.dispatcher.state(), self.status.current())
    }

    /// Push the current view to the host. Status refreshes re-render on
    /// their own; this is for changes made on the caller's side.
    pub fn render(&mut self) {
        let view = self.view();
        self.host.render(self.node, &view);
    }

    fn torn_down(&self) -> bool {
        lock(&self.placement).torn_down
    }

    fn bounds(&self) -> Bounds {
        let widget = self
            .host
            .rendered_size(self.node)
            .filter(|size| !size.is_empty())
            .unwrap_or(FALLBACK_SIZE);
        Bounds::new(self.host.viewport(), widget, self.settings.pad)
    }

    fn budget(&self) -> MountBudget {
        MountBudget {
            attempts: self.settings.mount_attempts,
            interval: self.settings.mount_interval(),
        }
    }

    fn spawn_mount(&self) -> WorkerHandle {
        let mut host = self.host.clone();
        let node = self.node;
        let resolver = self.resolver.clone();
        let budget = self.budget();
        let placement = Arc::clone(&self.placement);
        WorkerHandle::spawn(move |stop_rx| {
            let sleeper = StopSleeper::new(stop_rx);
            let found = resolver.resolve(&host, budget, &sleeper);
            if !found.is_docked() {
                return;
            }
            let mut slot = lock(&placement);
            if slot.torn_down || slot.mount.is_docked() {
                return;
            }
            dock(&mut host, node, found, &mut slot);
        })
    }

    /// Move the widget back onto the root as a floating overlay.
    fn float(&mut self) -> anyhow::Result<()> {
        let bounds = self.bounds();
        let pos = self.drag.resolved(&bounds);
        let mut slot = lock(&self.placement);
        self.host.append_to_root(self.node)?;
        self.host.set_layout(self.node, Layout::Floating(pos));
        slot.mount = Mount::Floating;
        Ok(())
    }

    /// Show `pos` unless the widget has been docked or torn down meanwhile.
    fn show_floating(&mut self, pos: Position) -> bool {
        let slot = lock(&self.placement);
        if slot.torn_down || slot.mount.is_docked() {
            return false;
        }
        self.host.set_layout(self.node, Layout::Floating(pos));
        true
    }

    /// Look for a host location and move the widget there, blocking the
    /// caller between attempts. Stops the background search first. A widget
    /// that is already docked at a live location stays put.
    pub fn mount<Z: Sleeper + ?Sized>(&mut self, sleeper: &Z) -> Mount {
        if let Some(mut task) = self.mount_task.take() {
            task.cancel();
        }
        if self.torn_down() {
            return self.mount_state();
        }
        let current = self.mount_state();
        if current.is_docked() {
            if MountResolver::validate(&self.host, &current) {
                return current;
            }
            if let Err(err) = self.float() {
                tracing::warn!(?err, "failed to re-float widget");
            }
        }
        let found = self.resolver.resolve(&self.host, self.budget(), sleeper);
        if found.is_docked() {
            self.drag.abandon();
            let mut slot = lock(&self.placement);
            if !slot.torn_down {
                dock(&mut self.host, self.node, found, &mut slot);
            }
        }
        self.render();
        self.mount_state()
    }

    /// Check that the widget still has a live home. Returns `true` when it
    /// had to fall back to floating.
    pub fn revalidate(&mut self) -> bool {
        let current = {
            let slot = lock(&self.placement);
            if slot.torn_down {
                return false;
            }
            slot.mount
        };
        let lost_dock = current.is_docked() && !MountResolver::validate(&self.host, &current);
        let lost_self = !self.host.is_attached(self.node);
        if !lost_dock && !lost_self {
            return false;
        }
        if lost_dock {
            tracing::info!(mount = ?current, "dock vanished; floating again");
        } else {
            tracing::info!("widget element removed by host; floating again");
        }
        if let Err(err) = self.float() {
            tracing::warn!(?err, "failed to re-float widget");
        }
        self.render();
        true
    }

    /// Run the action behind `button`. Returns `None` when the button is
    /// currently disabled.
    pub fn press(&mut self, button: Button) -> Option<Outcome> {
        if self.torn_down() {
            return None;
        }
        let view = self.view();
        let enabled = match button {
            Button::Shed => view.shed_enabled,
            Button::Restore => view.restore_enabled,
        };
        if !enabled {
            tracing::debug!(?button, "ignoring press on disabled button");
            return None;
        }

        let kind = button.kind();
        let busy = WidgetView::project(&ActionState::Running(kind), self.status.current());
        self.host.render(self.node, &busy);
        let outcome = self.dispatcher.dispatch(kind);
        self.render();
        Some(outcome)
    }

    /// Query the status endpoint once, outside the regular interval.
    pub fn refresh_status(&mut self) -> RestoreAvailability {
        let availability = self.status.refresh();
        self.render();
        availability
    }

    pub fn pointer_down(&mut self, target: PointerTarget, at: Position) -> bool {
        {
            let slot = lock(&self.placement);
            if slot.torn_down || slot.mount.is_docked() {
                return false;
            }
        }
        let bounds = self.bounds();
        self.drag.pointer_down(target, at, &bounds)
    }

    pub fn pointer_move(&mut self, at: Position) {
        if let Some(live) = self.drag.pointer_move(at) {
            let shown = self.bounds().clamp(live);
            if !self.show_floating(shown) {
                self.drag.abandon();
            }
        }
    }

    pub fn pointer_up(&mut self, at: Position) -> Option<Position> {
        if !self.drag.is_dragging() || self.mount_state().is_docked() {
            self.drag.abandon();
            return None;
        }
        let bounds = self.bounds();
        let pos = self.drag.pointer_up(at, &bounds)?;
        self.show_floating(pos);
        Some(pos)
    }

    pub fn pointer_cancel(&mut self) -> Option<Position> {
        if !self.drag.is_dragging() || self.mount_state().is_docked() {
            self.drag.abandon();
            return None;
        }
        let bounds = self.bounds();
        let pos = self.drag.pointer_cancel(&bounds)?;
        self.show_floating(pos);
        Some(pos)
    }

    /// Double click or double tap. On the handle this forgets the saved
    /// position and returns to automatic placement.
    pub fn double_activate(&mut self, target: PointerTarget) -> Option<Position> {
        if self.torn_down() || target != PointerTarget::Handle {
            return None;
        }
        let bounds = self.bounds();
        let pos = self.drag.reset(&bounds);
        self.show_floating(pos);
        tracing::debug!(?pos, "widget position reset");
        Some(pos)
    }

    /// The host viewport changed size.
    pub fn on_resize(&mut self) {
        if self.torn_down() {
            return;
        }
        let bounds = self.bounds();
        self.drag.reclamp(&bounds);
        let pos = self.drag.resolved(&bounds);
        self.show_floating(pos);
    }

    /// Stop polling and the location search, drop any drag in progress and
    /// remove the element. Background threads are signalled, not joined, so
    /// a status request in flight never delays the host; its result is
    /// discarded. In-flight actions are never cancelled; `press` runs to
    /// completion.
    pub fn teardown(&mut self) {
        {
            let mut slot = lock(&self.placement);
            if slot.torn_down {
                return;
            }
            slot.torn_down = true;
        }
        if let Some(mut task) = self.mount_task.take() {
            task.stop();
        }
        if let Some(mut poll) = self.poll.take() {
            poll.stop();
        }
        self.drag.abandon();
        self.host.detach(self.node);
        tracing::info!("widget torn down");
    }
}

impl<H: WidgetHost, S: KeyValueStore> Drop for ControlWidget<H, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
