pub mod network {
    pub const DEFAULT_TIMEOUT_SECONDS: f64 = 30.0;
    pub const MAX_REDIRECTS: usize = 10;
    pub const USER_AGENT: &str = "apirelay/0.3.0";
}

pub mod retry {
    pub const BACKOFF_SECONDS: f64 = 1.0;
    pub const STATUS_CODES: &[u16] = &[429, 500, 502, 503];
    pub const MIN_STATUS: u64 = 100;
    pub const MAX_STATUS: u64 = 599;
}

pub mod limits {
    pub const ERROR_MESSAGE_CHARS: usize = 500;
    pub const TEXT_MESSAGE_CHARS: usize = 5_000;
    pub const RATE_LIMIT_SWEEP_THRESHOLD: usize = 1_024;
}

pub mod media {
    pub const CONTENT_TYPE_PREFIXES: &[&str] = &["image/", "video/", "audio/"];
}

pub mod files {
    pub const APIS: &str = "apis.json";
    pub const AUTH: &str = "auth.json";
    pub const GROUPS: &str = "groups.json";
    pub const CONFIG: &str = "config.json";
    pub const SCHEDULES: &str = "schedules.json";
}

pub mod scheduler {
    pub const USER_ID: &str = "scheduler";
}

pub mod commands {
    pub const HELP: &str = "help";
}

pub mod protocols {
    pub const ALLOWED_HTTP: &[&str] = &["http:", "https:"];
}
