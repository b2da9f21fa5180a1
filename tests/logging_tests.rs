use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use ams::config::{AnalyzerKind, load_toml_file};
use ams::logging;

// ─── Helper ───────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================
// Startup diagnostics
// ============================================================

// The global subscriber can only be installed once per process, so this
// file holds a single test.
#[test]
fn test_config_warnings_reach_the_installed_subscriber() {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let log = logging::init_with_writer(move || writer.clone());

    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("ams.toml");
    std::fs::write(&bad, "[server\nport = ").unwrap();
    assert!(load_toml_file(&bad).is_none());
    assert_eq!(AnalyzerKind::parse("oracle"), None);

    let output = buffer.contents();
    assert!(output.contains("Config error"), "{output}");
    assert!(output.contains("Unknown analyzer"), "{output}");

    log.apply_level("error");
    tracing::warn!("suppressed after level change");
    assert!(!buffer.contents().contains("suppressed after level change"));
}
