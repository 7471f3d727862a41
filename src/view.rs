use crate::dispatch::{ActionState, Outcome};
use crate::status::RestoreAvailability;

pub const SHED_LABEL: &str = "VRAM: SHED";
pub const RESTORE_LABEL: &str = "VRAM: RESTORE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Muted,
    Good,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
    pub label: String,
    pub tone: Tone,
}

impl Indicator {
    pub fn for_availability(availability: RestoreAvailability) -> Self {
        match availability {
            RestoreAvailability::Unknown => Self {
                label: "restore: unknown".into(),
                tone: Tone::Muted,
            },
            RestoreAvailability::Ready(Some(count)) => Self {
                label: format!("restore: ready ({count})"),
                tone: Tone::Good,
            },
            RestoreAvailability::Ready(None) => Self {
                label: "restore: ready".into(),
                tone: Tone::Good,
            },
            RestoreAvailability::Unavailable => Self {
                label: "restore: unavailable".into(),
                tone: Tone::Warn,
            },
        }
    }
}

/// Everything a host needs to draw the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetView {
    pub shed_label: &'static str,
    pub restore_label: &'static str,
    pub shed_enabled: bool,
    pub restore_enabled: bool,
    pub status: String,
    pub indicator: Indicator,
}

impl WidgetView {
    pub fn project(action: &ActionState, availability: RestoreAvailability) -> Self {
        let busy = action.is_running();
        Self {
            shed_label: SHED_LABEL,
            restore_label: RESTORE_LABEL,
            shed_enabled: !busy,
            // Only a confirmed "nothing to restore" disables restore; an
            // unknown availability must never block the user.
            restore_enabled: !busy && availability != RestoreAvailability::Unavailable,
            status: status_text(action),
            indicator: Indicator::for_availability(availability),
        }
    }
}

pub fn status_text(action: &ActionState) -> String {
    match action {
        ActionState::Idle => "idle".into(),
        ActionState::Running(kind) => format!("running: {}…", kind.name()),
        ActionState::Settled(Outcome::Ok(message)) => message.clone(),
        ActionState::Settled(Outcome::Failed(reason)) => format!("error: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ActionKind;

    #[test]
    fn running_disables_both_triggers() {
        for availability in [
            RestoreAvailability::Unknown,
            RestoreAvailability::Ready(Some(2)),
            RestoreAvailability::Unavailable,
        ] {
            let view = WidgetView::project(&ActionState::Running(ActionKind::Restore), availability);
            assert!(!view.shed_enabled);
            assert!(!view.restore_enabled);
            assert_eq!(view.status, "running: restore…");
        }
    }

    #[test]
    fn unknown_availability_keeps_restore_enabled() {
        let view = WidgetView::project(&ActionState::Idle, RestoreAvailability::Unknown);
        assert!(view.restore_enabled);
        assert_eq!(view.indicator.label, "restore: unknown");
        assert_eq!(view.status, "idle");
    }

    #[test]
    fn settled_views() {
        let ok = ActionState::Settled(Outcome::Ok("ok (120 ms)".into()));
        let view = WidgetView::project(&ok, RestoreAvailability::Unavailable);
        assert!(view.shed_enabled);
        assert!(!view.restore_enabled);
        assert_eq!(view.indicator.tone, Tone::Warn);

        let failed = ActionState::Settled(Outcome::Failed("failed (404 Not Found)".into()));
        let view = WidgetView::project(&failed, RestoreAvailability::Ready(Some(3)));
        assert_eq!(view.status, "error: failed (404 Not Found)");
        assert_eq!(view.indicator.label, "restore: ready (3)");
        assert!(view.restore_enabled);
    }
}
