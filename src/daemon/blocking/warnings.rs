use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

pub const WARNING_COOLDOWN_SECS: i64 = 300;

/// Remembers when each process was last warned about.
#[derive(Debug, Default)]
pub struct WarnLimiter {
    last_warned: HashMap<String, DateTime<Utc>>,
}

impl WarnLimiter {
    /// Returns `true` and records the warning if `process_name` wasn't warned about during
    /// the last [WARNING_COOLDOWN_SECS] seconds.
    pub fn try_warn(&mut self, process_name: &str, now: DateTime<Utc>) -> bool {
        let key = process_name.to_lowercase();
        match self.last_warned.get(&key) {
            Some(last) if now - *last < Duration::seconds(WARNING_COOLDOWN_SECS) => false,
            _ => {
                self.last_warned.insert(key, now);
                true
            }
        }
    }
}
