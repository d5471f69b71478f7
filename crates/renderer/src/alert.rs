use std::cell::RefCell;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Info => f.write_str("info"),
            AlertLevel::Success => f.write_str("success"),
            AlertLevel::Warning => f.write_str("warning"),
            AlertLevel::Error => f.write_str("error"),
        }
    }
}

pub trait AlertNotifier {
    fn post(&self, level: AlertLevel, message: String);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub posted_at: Instant,
}

/// Keeps the most recent alert visible for `timeout` and mirrors every alert
/// into the log.
#[derive(Debug)]
pub struct AlertOverlay {
    timeout: Duration,
    latest: RefCell<Option<Alert>>,
}

impl AlertOverlay {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            latest: RefCell::new(None),
        }
    }

    /// The alert to display at `now`, if it has not expired.
    pub fn visible(&self, now: Instant) -> Option<Alert> {
        let mut latest = self.latest.borrow_mut();
        let expired = latest
            .as_ref()
            .is_some_and(|alert| now.saturating_duration_since(alert.posted_at) >= self.timeout);
        if expired {
            *latest = None;
        }
        latest.clone()
    }

    fn post_at(&self, level: AlertLevel, message: String, now: Instant) {
        match level {
            AlertLevel::Info | AlertLevel::Success => tracing::info!(%level, "{message}"),
            AlertLevel::Warning => tracing::warn!(%level, "{message}"),
            AlertLevel::Error => tracing::error!(%level, "{message}"),
        }
        *self.latest.borrow_mut() = Some(Alert {
            level,
            message,
            posted_at: now,
        });
    }
}

impl AlertNotifier for AlertOverlay {
    fn post(&self, level: AlertLevel, message: String) {
        self.post_at(level, message, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_alert_replaces_previous() {
        let overlay = AlertOverlay::new(Duration::from_secs(3));
        let start = Instant::now();
        overlay.post_at(AlertLevel::Info, "first".into(), start);
        overlay.post_at(AlertLevel::Warning, "second".into(), start);

        let alert = overlay.visible(start).expect("alert visible");
        assert_eq!(alert.message, "second");
        assert_eq!(alert.level, AlertLevel::Warning);
    }

    #[test]
    fn alert_expires_after_timeout() {
        let overlay = AlertOverlay::new(Duration::from_millis(500));
        let start = Instant::now();
        overlay.post_at(AlertLevel::Info, "hello".into(), start);

        assert!(overlay.visible(start + Duration::from_millis(499)).is_some());
        assert!(overlay.visible(start + Duration::from_millis(500)).is_none());
        assert!(overlay.visible(start).is_none());
    }
}
