use crate::mount::MountStrategy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Shape of the JSON body sent with shed/restore requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadStyle {
    /// `{ "args": { ..., "wait": true } }`
    Args,
    /// `{ "wait": true, "max_wait_seconds": N }`
    Bounded,
}

impl Default for PayloadStyle {
    fn default() -> Self {
        PayloadStyle::Args
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WidgetSettings {
    /// Base URL of the control service, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_shed_path")]
    pub shed_path: String,
    #[serde(default = "default_restore_path")]
    pub restore_path: String,
    #[serde(default = "default_status_path")]
    pub status_path: String,
    /// Process the shed operation must leave alone.
    #[serde(default = "default_protect")]
    pub protect: String,
    #[serde(default = "default_true")]
    pub high_only: bool,
    #[serde(default = "default_true")]
    pub quiet: bool,
    /// Upper bound the server may block before answering an action.
    #[serde(default = "default_max_wait_seconds")]
    pub max_wait_seconds: u64,
    #[serde(default)]
    pub payload_style: PayloadStyle,
    /// Interval between status refreshes. `0` disables background polling.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Search for a host location in the background as soon as the widget
    /// is set up.
    #[serde(default = "default_true")]
    pub mount_on_setup: bool,
    #[serde(default = "default_mount_attempts")]
    pub mount_attempts: u32,
    #[serde(default = "default_mount_interval_ms")]
    pub mount_interval_ms: u64,
    /// Host controls the widget is inserted in front of, most preferred first.
    #[serde(default = "default_anchor_selectors")]
    pub anchor_selectors: Vec<String>,
    /// Host menu roots searched for `dock_container`.
    #[serde(default = "default_dock_roots")]
    pub dock_roots: Vec<String>,
    #[serde(default = "default_dock_container")]
    pub dock_container: String,
    /// Minimum gap kept between a floating widget and the viewport edges.
    #[serde(default = "default_pad")]
    pub pad: f64,
    #[serde(default = "default_position_key")]
    pub position_key: String,
    /// When enabled the logger is initialised at debug level.
    #[serde(default)]
    pub debug_logging: bool,
    /// Optional file receiving a copy of the log output.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8188".into()
}

fn default_shed_path() -> String {
    "/spirit/vram/shed".into()
}

fn default_restore_path() -> String {
    "/spirit/vram/restore".into()
}

fn default_status_path() -> String {
    "/spirit/vram/status".into()
}

fn default_protect() -> String {
    "comfyui".into()
}

fn default_true() -> bool {
    true
}

fn default_max_wait_seconds() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_mount_attempts() -> u32 {
    200
}

fn default_mount_interval_ms() -> u64 {
    50
}

fn default_anchor_selectors() -> Vec<String> {
    vec![
        "#queue-button".into(),
        ".comfyui-queue-button".into(),
        ".comfy-queue-btn".into(),
    ]
}

fn default_dock_roots() -> Vec<String> {
    vec![".comfy-menu".into(), "#comfyui-menu".into(), "#menu".into()]
}

fn default_dock_container() -> String {
    ".comfy-menu-right".into()
}

fn default_pad() -> f64 {
    8.0
}

fn default_position_key() -> String {
    "vram-widget.position".into()
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            shed_path: default_shed_path(),
            restore_path: default_restore_path(),
            status_path: default_status_path(),
            protect: default_protect(),
            high_only: true,
            quiet: true,
            max_wait_seconds: default_max_wait_seconds(),
            payload_style: PayloadStyle::Args,
            poll_interval_ms: default_poll_interval_ms(),
            mount_on_setup: true,
            mount_attempts: default_mount_attempts(),
            mount_interval_ms: default_mount_interval_ms(),
            anchor_selectors: default_anchor_selectors(),
            dock_roots: default_dock_roots(),
            dock_container: default_dock_container(),
            pad: default_pad(),
            position_key: default_position_key(),
            debug_logging: false,
            log_file: None,
        }
    }
}

impl WidgetSettings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Mount strategies in the order the resolver should try them.
    pub fn strategies(&self) -> Vec<MountStrategy> {
        let mut out = Vec::new();
        if !self.anchor_selectors.is_empty() {
            out.push(MountStrategy::AnchorAdjacent(self.anchor_selectors.clone()));
        }
        if !self.dock_roots.is_empty() {
            out.push(MountStrategy::DockContainer {
                roots: self.dock_roots.clone(),
                container: self.dock_container.clone(),
            });
        }
        out.push(MountStrategy::Floating);
        out
    }

    /// Client-side timeout: the server-side wait plus some slack for the reply.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.max_wait_seconds.saturating_add(10))
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        if self.poll_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.poll_interval_ms))
        }
    }

    pub fn mount_interval(&self) -> Duration {
        Duration::from_millis(self.mount_interval_ms)
    }
}
