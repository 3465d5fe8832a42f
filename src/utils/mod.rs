pub mod args;
pub mod data_path;
pub mod fs_atomic;
pub mod redact;
pub mod template;
pub mod text;
