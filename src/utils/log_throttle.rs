use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Window {
    started_at: Instant,
    suppressed: u64,
}

/// Rate limits repeated log lines per key. Navigation can evaluate the guard many
/// times a second for the same redirect; only one line per window is worth keeping.
#[derive(Debug)]
pub struct LogThrottle {
    interval: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        LogThrottle {
            interval,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `Some(suppressed_count)` when a log for `key` should be emitted,
    /// otherwise `None` and the event is counted as suppressed for the active window.
    pub fn should_emit(&self, key: &str) -> Option<u64> {
        let mut windows = self.windows.lock().expect("log throttle mutex poisoned");
        let now = Instant::now();

        match windows.get_mut(key) {
            Some(window) if now.duration_since(window.started_at) >= self.interval => {
                let suppressed = window.suppressed;
                window.started_at = now;
                window.suppressed = 0;
                Some(suppressed)
            }
            Some(window) => {
                window.suppressed += 1;
                None
            }
            None => {
                windows.insert(
                    key.to_string(),
                    Window {
                        started_at: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LogThrottle;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn emits_then_suppresses_then_emits_with_count() {
        let throttle = LogThrottle::new(Duration::from_millis(20));

        assert_eq!(throttle.should_emit("guard.redirect.login"), Some(0));
        assert_eq!(throttle.should_emit("guard.redirect.login"), None);
        assert_eq!(throttle.should_emit("guard.redirect.login"), None);
        // Keys are independent.
        assert_eq!(throttle.should_emit("guard.redirect.unauthorized"), Some(0));

        sleep(Duration::from_millis(30));
        assert_eq!(throttle.should_emit("guard.redirect.login"), Some(2));
    }
}
