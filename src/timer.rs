//! The ARTIM (association request/reject/release) timer.
use std::time::{Duration, Instant};

/// A restartable timer with a fixed timeout.
///
/// The timer starts out stopped;
/// it only reports expiry while running.
#[derive(Debug)]
pub struct Timer {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Timer {
    /// Create a stopped timer with the given timeout.
    pub fn new(timeout: Duration) -> Self {
        Timer {
            timeout,
            deadline: None,
        }
    }

    /// Start the timer, or restart it if already running.
    pub fn start(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    /// Stop the timer.
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// Whether the timer is currently running.
    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Whether the timer is running and its timeout has elapsed.
    pub fn expired(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_timer_never_expires() {
        let timer = Timer::new(Duration::from_millis(0));
        assert!(!timer.is_running());
        assert!(!timer.expired());
    }

    #[test]
    fn running_timer_expires_after_timeout() {
        let mut timer = Timer::new(Duration::from_millis(0));
        timer.start();
        assert!(timer.is_running());
        assert!(timer.expired());

        timer.stop();
        assert!(!timer.expired());
    }

    #[test]
    fn restart_pushes_the_deadline() {
        let mut timer = Timer::new(Duration::from_secs(3600));
        timer.start();
        assert!(!timer.expired());
        timer.start();
        assert!(timer.is_running());
        assert!(!timer.expired());
    }
}
