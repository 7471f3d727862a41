use tempfile::tempdir;
use vram_widget::mount::MountStrategy;
use vram_widget::settings::{PayloadStyle, WidgetSettings};

#[test]
fn missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let settings = WidgetSettings::load(path.to_str().unwrap()).unwrap();
    assert_eq!(settings, WidgetSettings::default());
    assert_eq!(settings.poll_interval_ms, 5000);
    assert_eq!(settings.mount_attempts, 200);
    assert_eq!(settings.mount_interval_ms, 50);
}

#[test]
fn partial_file_fills_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{"base_url": "http://gpu-box:8188", "payload_style": "bounded", "poll_interval_ms": 0}"#,
    )
    .unwrap();
    let settings = WidgetSettings::load(path.to_str().unwrap()).unwrap();
    assert_eq!(settings.base_url, "http://gpu-box:8188");
    assert_eq!(settings.payload_style, PayloadStyle::Bounded);
    assert_eq!(settings.poll_interval(), None);
    assert_eq!(settings.protect, "comfyui");
    assert_eq!(settings.shed_path, "/spirit/vram/shed");
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(WidgetSettings::load(path.to_str().unwrap()).is_err());
}

#[test]
fn save_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let settings = WidgetSettings {
        protect: "sd-webui".into(),
        high_only: false,
        ..WidgetSettings::default()
    };
    settings.save(path.to_str().unwrap()).unwrap();
    let loaded = WidgetSettings::load(path.to_str().unwrap()).unwrap();
    assert_eq!(loaded, settings);
}

#[test]
fn strategies_end_with_floating() {
    let settings = WidgetSettings::default();
    let strategies = settings.strategies();
    assert!(matches!(strategies[0], MountStrategy::AnchorAdjacent(_)));
    assert!(matches!(strategies[1], MountStrategy::DockContainer { .. }));
    assert_eq!(strategies.last(), Some(&MountStrategy::Floating));

    let bare = WidgetSettings {
        anchor_selectors: Vec::new(),
        dock_roots: Vec::new(),
        ..WidgetSettings::default()
    };
    assert_eq!(bare.strategies(), vec![MountStrategy::Floating]);
}
