use crate::position::{Bounds, KeyValueStore, Position, PositionStore};

/// Part of the widget a pointer event landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    /// The grip reserved for moving the widget.
    Handle,
    /// Buttons, status text and everything else.
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    Dragging {
        /// Pointer coordinates at pointer-down.
        start: Position,
        /// Widget position at pointer-down.
        base: Position,
        /// Pointer travel since `start`.
        offset: (f64, f64),
    },
}

/// Turns drags on the handle into a persisted, viewport-clamped position.
#[derive(Debug)]
pub struct DragController<S> {
    positions: PositionStore<S>,
    state: DragState,
    position: Option<Position>,
}

impl<S: KeyValueStore> DragController<S> {
    pub fn new(positions: PositionStore<S>) -> Self {
        Self {
            positions,
            state: DragState::Idle,
            position: None,
        }
    }

    /// Pick up the remembered position, clamped to the current bounds.
    pub fn restore(&mut self, bounds: &Bounds) -> Position {
        self.position = self.positions.load_clamped(bounds);
        self.resolved(bounds)
    }

    /// The user-chosen position, or `None` when automatic placement applies.
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn resolved(&self, bounds: &Bounds) -> Position {
        self.position
            .map(|pos| bounds.clamp(pos))
            .unwrap_or_else(|| bounds.default_position())
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Returns `true` when the press started a drag.
    pub fn pointer_down(&mut self, target: PointerTarget, at: Position, bounds: &Bounds) -> bool {
        if target != PointerTarget::Handle || self.is_dragging() {
            return false;
        }
        let base = self.resolved(bounds);
        self.state = DragState::Dragging {
            start: at,
            base,
            offset: (0.0, 0.0),
        };
        tracing::trace!(?base, "drag started");
        true
    }

    /// Live, uncommitted position while dragging.
    pub fn pointer_move(&mut self, at: Position) -> Option<Position> {
        match &mut self.state {
            DragState::Dragging {
                start,
                base,
                offset,
            } => {
                *offset = (at.x - start.x, at.y - start.y);
                Some(base.offset(offset.0, offset.1))
            }
            DragState::Idle => None,
        }
    }

    /// Finish the drag at `at`, persisting `clamp(base + offset)`.
    pub fn pointer_up(&mut self, at: Position, bounds: &Bounds) -> Option<Position> {
        self.pointer_move(at)?;
        self.commit(bounds)
    }

    /// The pointer was lost mid-drag; commit the last known offset.
    pub fn pointer_cancel(&mut self, bounds: &Bounds) -> Option<Position> {
        self.commit(bounds)
    }

    fn commit(&mut self, bounds: &Bounds) -> Option<Position> {
        let DragState::Dragging { base, offset, .. } =
            std::mem::replace(&mut self.state, DragState::Idle)
        else {
            return None;
        };
        let pos = bounds.clamp(base.offset(offset.0, offset.1));
        self.position = Some(pos);
        self.positions.save(pos);
        tracing::debug!(?pos, "widget moved");
        Some(pos)
    }

    /// Drop an in-progress drag without committing it.
    pub fn abandon(&mut self) {
        self.state = DragState::Idle;
    }

    /// Double activation on the handle: forget the position and fall back to
    /// automatic placement.
    pub fn reset(&mut self, bounds: &Bounds) -> Position {
        self.state = DragState::Idle;
        self.position = None;
        self.positions.clear();
        bounds.default_position()
    }

    /// Re-apply the clamp after the viewport changed. Returns the new
    /// position when it moved.
    pub fn reclamp(&mut self, bounds: &Bounds) -> Option<Position> {
        let current = self.position?;
        let clamped = bounds.clamp(current);
        if clamped == current {
            return None;
        }
        self.position = Some(clamped);
        Some(clamped)
    }
}
