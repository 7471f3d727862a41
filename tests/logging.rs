use std::{fs, thread::sleep, time::Duration};

use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn rust_log_is_ignored_unless_debug_enabled() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("logs").join("widget.log");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::env::set_var("RUST_LOG", "trace");

    vram_widget::logging::init(false, Some(path.clone()));
    tracing::info!(action = "shed", "action finished");
    tracing::debug!("mount attempt 3");

    sleep(Duration::from_millis(100));

    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("action finished"));
    assert!(contents.contains("shed"));
    assert!(!contents.contains("mount attempt 3"));
    assert!(!contents.contains("\u{1b}["), "file output must not carry ANSI colours");
}
