#![allow(dead_code)]

use apirelay::services::logger::{LogLevel, Logger, MemorySink};
use apirelay::RelayManager;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn tmp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp data dir");
    dir
}

pub fn write_json(dir: &Path, file: &str, value: &Value) {
    let raw = serde_json::to_string_pretty(value).expect("serialize fixture");
    std::fs::write(dir.join(file), raw).expect("write fixture");
}

/// Logger that records every line, debug included.
pub fn memory_logger() -> (Logger, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let mut logger = Logger::with_sink("test", sink.clone());
    logger.set_level(LogLevel::Debug);
    (logger, sink)
}

pub fn relay() -> (RelayManager, Arc<MemorySink>) {
    let (logger, sink) = memory_logger();
    (RelayManager::new(logger), sink)
}

/// Data dir holding a single `apis.json` with the given definitions.
pub fn data_dir_with_apis(prefix: &str, apis: Value) -> PathBuf {
    let dir = tmp_dir(prefix);
    write_json(&dir, "apis.json", &serde_json::json!({ "apis": apis }));
    dir
}
