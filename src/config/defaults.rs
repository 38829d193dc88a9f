//! Default-value helpers for serde deserialization, mirroring the
//! "one function per field" pattern used throughout this crate's
//! settings structs.

pub(crate) fn default_version() -> String {
    "1".to_string()
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_config_poll_interval() -> f64 {
    5.0
}

pub(crate) fn default_health_check_interval() -> f64 {
    30.0
}

pub(crate) fn default_max_restarts() -> u32 {
    3
}

pub(crate) fn default_restart_delay() -> f64 {
    5.0
}

pub(crate) fn default_http_timeout() -> f64 {
    30.0
}

pub(crate) fn default_retry_count() -> u32 {
    3
}

pub(crate) fn default_retry_delay() -> f64 {
    1.0
}

pub(crate) fn default_queue_timeout() -> f64 {
    5.0
}
