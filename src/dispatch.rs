use crate::client::{ControlTransport, HttpReply};
use crate::settings::{PayloadStyle, WidgetSettings};
use crate::status::StatusPoller;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Shed,
    Restore,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Shed => "shed",
            ActionKind::Restore => "restore",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok(String),
    Failed(String),
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActionState {
    #[default]
    Idle,
    Running(ActionKind),
    Settled(Outcome),
}

impl ActionState {
    pub fn is_running(&self) -> bool {
        matches!(self, ActionState::Running(_))
    }
}

/// Shared view of the dispatcher's state, readable while a call is in flight.
#[derive(Debug, Clone, Default)]
pub struct ActionStateCell(Arc<Mutex<ActionState>>);

impl ActionStateCell {
    pub fn get(&self) -> ActionState {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set(&self, state: ActionState) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub path: String,
    pub body: Value,
}

/// Build the fixed request for `kind`. Every request asks the server to wait
/// for the operation to conclude so the reply carries its result.
pub fn build_request(kind: ActionKind, settings: &WidgetSettings) -> ActionRequest {
    let path = match kind {
        ActionKind::Shed => settings.shed_path.clone(),
        ActionKind::Restore => settings.restore_path.clone(),
    };
    let body = match (settings.payload_style, kind) {
        (PayloadStyle::Args, ActionKind::Shed) => json!({
            "args": {
                "protect": settings.protect,
                "high_only": settings.high_only,
                "quiet": settings.quiet,
                "wait": true,
            }
        }),
        (PayloadStyle::Args, ActionKind::Restore) => json!({
            "args": {
                "quiet": settings.quiet,
                "wait": true,
            }
        }),
        (PayloadStyle::Bounded, ActionKind::Shed) => json!({
            "protect": settings.protect,
            "high_only": settings.high_only,
            "wait": true,
            "max_wait_seconds": settings.max_wait_seconds,
        }),
        (PayloadStyle::Bounded, ActionKind::Restore) => json!({
            "wait": true,
            "max_wait_seconds": settings.max_wait_seconds,
        }),
    };
    ActionRequest { path, body }
}

fn server_message(body: &Value) -> Option<String> {
    ["error", "message", "detail"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find_map(|v| v.as_str().map(str::to_string))
        .filter(|s| !s.trim().is_empty())
}

fn reports_ok(body: &Value) -> bool {
    body.get("ok").and_then(Value::as_bool).unwrap_or(false)
        || body
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s.eq_ignore_ascii_case("ok"))
            .unwrap_or(false)
}

/// Turn whatever the transport produced into a user-facing outcome.
pub fn interpret_reply(reply: anyhow::Result<HttpReply>) -> Outcome {
    let reply = match reply {
        Ok(reply) => reply,
        Err(err) => return Outcome::Failed(format!("{err:#}")),
    };

    if !reply.is_success() {
        let reason = reply
            .body
            .as_ref()
            .and_then(server_message)
            .unwrap_or_else(|| match &reply.reason {
                Some(reason) => format!("failed ({} {reason})", reply.status),
                None => format!("failed ({})", reply.status),
            });
        return Outcome::Failed(reason);
    }

    let Some(body) = reply.body else {
        return Outcome::Failed("bad_json_response".into());
    };

    if reports_ok(&body) {
        let message = match body.get("duration_ms").filter(|ms| ms.is_number()) {
            Some(ms) => format!("ok ({ms} ms)"),
            None => body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| "ok".into()),
        };
        return Outcome::Ok(message);
    }

    let reason = server_message(&body).unwrap_or_else(|| match body.get("rc") {
        Some(rc) if !rc.is_null() => format!("failed ({rc})"),
        _ => "failed (?)".into(),
    });
    Outcome::Failed(reason)
}

/// Issues shed/restore calls and tracks their busy/idle/error lifecycle.
///
/// Not reentrant: callers keep triggers disabled while an action is running.
pub struct ActionDispatcher {
    transport: Arc<dyn ControlTransport>,
    settings: WidgetSettings,
    state: ActionStateCell,
    status: Option<StatusPoller>,
}

impl ActionDispatcher {
    pub fn new(transport: Arc<dyn ControlTransport>, settings: WidgetSettings) -> Self {
        Self {
            transport,
            settings,
            state: ActionStateCell::default(),
            status: None,
        }
    }

    /// Refresh `status` after every action, since shed/restore change what
    /// can be restored.
    pub fn with_status(mut self, status: StatusPoller) -> Self {
        self.status = Some(status);
        self
    }

    pub fn state(&self) -> ActionState {
        self.state.get()
    }

    pub fn state_cell(&self) -> ActionStateCell {
        self.state.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.get().is_running()
    }

    /// Run one action to completion. Exactly one request is made; failures
    /// are reported, never retried.
    pub fn dispatch(&self, kind: ActionKind) -> Outcome {
        self.state.set(ActionState::Running(kind));
        let request = build_request(kind, &self.settings);
        tracing::info!(action = kind.name(), path = %request.path, "running action");

        let outcome = interpret_reply(self.transport.post_json(&request.path, &request.body));
        match &outcome {
            Outcome::Ok(message) => tracing::info!(action = kind.name(), %message, "action finished"),
            Outcome::Failed(reason) => tracing::warn!(action = kind.name(), %reason, "action failed"),
        }
        self.state.set(ActionState::Settled(outcome.clone()));

        if let Some(status) = &self.status {
            status.refresh();
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn args_payloads() {
        let settings = WidgetSettings::default();
        let shed = build_request(ActionKind::Shed, &settings);
        assert_eq!(shed.path, "/spirit/vram/shed");
        assert_eq!(
            shed.body,
            json!({"args": {"protect": "comfyui", "high_only": true, "quiet": true, "wait": true}})
        );
        let restore = build_request(ActionKind::Restore, &settings);
        assert_eq!(restore.body, json!({"args": {"quiet": true, "wait": true}}));
    }

    #[test]
    fn bounded_payloads() {
        let settings = WidgetSettings {
            payload_style: PayloadStyle::Bounded,
            max_wait_seconds: 90,
            ..WidgetSettings::default()
        };
        let restore = build_request(ActionKind::Restore, &settings);
        assert_eq!(restore.body, json!({"wait": true, "max_wait_seconds": 90}));
        let shed = build_request(ActionKind::Shed, &settings);
        assert_eq!(shed.body["protect"], "comfyui");
        assert_eq!(shed.body["max_wait_seconds"], 90);
    }

    #[test]
    fn success_reports_duration() {
        let outcome = interpret_reply(Ok(HttpReply::new(
            200,
            Some(json!({"ok": true, "duration_ms": 120})),
        )));
        assert_eq!(outcome, Outcome::Ok("ok (120 ms)".into()));

        let outcome = interpret_reply(Ok(HttpReply::new(200, Some(json!({"status": "ok"})))));
        assert_eq!(outcome, Outcome::Ok("ok".into()));
    }

    #[test]
    fn duration_is_shown_as_sent() {
        let outcome = interpret_reply(Ok(HttpReply::new(
            200,
            Some(json!({"ok": true, "duration_ms": 120.5})),
        )));
        assert_eq!(outcome, Outcome::Ok("ok (120.5 ms)".into()));

        let outcome = interpret_reply(Ok(HttpReply::new(
            200,
            Some(json!({"ok": true, "duration_ms": "soon", "message": "queued"})),
        )));
        assert_eq!(outcome, Outcome::Ok("queued".into()));
    }

    #[test]
    fn failures_prefer_server_message() {
        let outcome = interpret_reply(Ok(HttpReply::new(500, Some(json!({"ok": false, "error": "busy"})))));
        assert_eq!(outcome, Outcome::Failed("busy".into()));

        let outcome = interpret_reply(Ok(HttpReply::new(404, None)));
        assert_eq!(outcome, Outcome::Failed("failed (404 Not Found)".into()));

        let outcome = interpret_reply(Ok(HttpReply::new(599, None)));
        assert_eq!(outcome, Outcome::Failed("failed (599)".into()));

        let outcome = interpret_reply(Ok(HttpReply::new(200, Some(json!({"ok": false, "rc": 3})))));
        assert_eq!(outcome, Outcome::Failed("failed (3)".into()));

        let outcome = interpret_reply(Ok(HttpReply::new(200, None)));
        assert_eq!(outcome, Outcome::Failed("bad_json_response".into()));

        let outcome = interpret_reply(Err(anyhow::anyhow!("connection refused")));
        assert_eq!(outcome, Outcome::Failed("connection refused".into()));
    }
}
