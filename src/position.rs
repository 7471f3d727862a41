use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Top-left offset of the widget in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

pub type Viewport = Size;

/// Everything needed to keep a widget of a given size inside the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub viewport: Viewport,
    pub widget: Size,
    pub pad: f64,
}

impl Bounds {
    pub fn new(viewport: Viewport, widget: Size, pad: f64) -> Self {
        Self {
            viewport,
            widget,
            pad,
        }
    }

    pub fn clamp(&self, pos: Position) -> Position {
        clamp_to_viewport(pos, self.viewport, self.widget, self.pad)
    }

    /// Automatic placement: top-right corner, `pad` away from both edges.
    pub fn default_position(&self) -> Position {
        self.clamp(Position::new(
            self.viewport.width - self.widget.width - self.pad,
            self.pad,
        ))
    }
}

/// Clamp `pos` so the widget stays within `[pad, viewport - widget - pad]` on
/// both axes. When the viewport is too small to honour both edges the widget
/// is pinned to the leading edge.
pub fn clamp_to_viewport(pos: Position, viewport: Viewport, widget: Size, pad: f64) -> Position {
    let axis = |value: f64, view: f64, extent: f64| {
        let max = (view - extent - pad).max(pad);
        if value.is_finite() {
            value.clamp(pad, max)
        } else {
            pad
        }
    };
    Position {
        x: axis(pos.x, viewport.width, widget.width),
        y: axis(pos.y, viewport.height, widget.height),
    }
}

/// Minimal string key-value storage, modelled on a browser's local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map().remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk, rewritten atomically on
/// every change.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("parse {}", self.path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err).with_context(|| format!("read {}", self.path.display())),
        }
    }

    fn write_all(&self, map: &HashMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(map)?;
        atomic_write(&self.path, json.as_bytes())
            .with_context(|| format!("write {}", self.path.display()))
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        // A corrupt file is replaced rather than blocking every later write.
        let mut map = self.read_all().unwrap_or_default();
        map.insert(key.to_string(), value.to_string());
        self.write_all(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.read_all().unwrap_or_default();
        if map.remove(key).is_some() {
            self.write_all(&map)?;
        }
        Ok(())
    }
}

/// Remembers the widget's last user-chosen position under a single key.
///
/// Storage failures never reach the caller: a position that cannot be loaded
/// reads as absent, and a position that cannot be saved is simply forgotten.
#[derive(Debug, Clone)]
pub struct PositionStore<S> {
    store: S,
    key: String,
}

impl<S: KeyValueStore> PositionStore<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn load(&self) -> Option<Position> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(?err, key = %self.key, "failed to read stored position");
                return None;
            }
        };
        match serde_json::from_str::<Position>(&raw) {
            Ok(pos) if pos.is_finite() => Some(pos),
            Ok(_) | Err(_) => {
                tracing::debug!(key = %self.key, "ignoring malformed stored position");
                None
            }
        }
    }

    pub fn save(&self, pos: Position) {
        let json = match serde_json::to_string(&pos) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(?err, "failed to encode position");
                return;
            }
        };
        if let Err(err) = self.store.set(&self.key, &json) {
            tracing::warn!(?err, key = %self.key, "failed to persist position");
        }
    }

    pub fn clear(&self) {
        if let Err(err) = self.store.remove(&self.key) {
            tracing::warn!(?err, key = %self.key, "failed to clear stored position");
        }
    }

    /// Load and clamp in one step; `None` when nothing valid is stored.
    pub fn load_clamped(&self, bounds: &Bounds) -> Option<Position> {
        self.load().map(|pos| bounds.clamp(pos))
    }
}
