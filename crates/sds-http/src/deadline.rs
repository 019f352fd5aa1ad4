use std::time::{Duration, Instant};

use sds_types::{SdsError, SdsResult};

/// Absolute point in time, in milliseconds of a [`DeadlineManager`] clock.
///
/// Deadlines are only meaningful for the manager that produced the clock
/// readings they are compared with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(u64);

impl Deadline {
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

/// Monotonic clock service converting request deadlines into socket
/// timeouts and the forwarded timeout header.
///
/// One manager is built by the application and shared through `Arc` with
/// every [`crate::Http`] client.
#[derive(Debug)]
pub struct DeadlineManager {
    origin: Instant,
}

impl DeadlineManager {
    /// Shortest timeout ever applied to a socket.
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Monotonic milliseconds since this manager was created.
    pub fn now(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// The deadline `budget` from now.
    pub fn deadline_in(&self, budget: Duration) -> Deadline {
        let budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        Deadline(self.now().saturating_add(budget_ms))
    }

    /// Fail with `DeadlineExceeded` if `now` has reached `deadline`.
    pub fn check_deadline(&self, deadline: Deadline, now: u64) -> SdsResult<()> {
        if now >= deadline.0 {
            return Err(SdsError::deadline_exceeded(format!(
                "Request deadline reached ({}ms late)",
                now - deadline.0
            )));
        }
        Ok(())
    }

    /// Remaining budget as a socket timeout, never below [`Self::MIN_TIMEOUT`].
    pub fn deadline_to_timeout(&self, deadline: Deadline, now: u64) -> Duration {
        Duration::from_millis(deadline.0.saturating_sub(now)).max(Self::MIN_TIMEOUT)
    }

    /// Value of the timeout header: microseconds, reduced by 1% so the remote
    /// side gives up before we do.
    pub fn timeout_header_value(timeout: Duration) -> String {
        (timeout.as_millis() * 990).to_string()
    }
}

impl Default for DeadlineManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sds_types::ErrorKind;

    #[test]
    fn now_is_monotonic() {
        let dlm = DeadlineManager::new();
        let mut prev = dlm.now();
        for _ in 0..1000 {
            let next = dlm.now();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn expired_deadline_fails() {
        let dlm = DeadlineManager::new();
        let err = dlm.check_deadline(Deadline::from_millis(10), 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
        assert!(dlm.check_deadline(Deadline::from_millis(10), 25).is_err());
    }

    #[test]
    fn future_deadline_passes() {
        let dlm = DeadlineManager::new();
        assert!(dlm.check_deadline(Deadline::from_millis(11), 10).is_ok());
    }

    #[test]
    fn timeout_is_remaining_budget() {
        let dlm = DeadlineManager::new();
        let timeout = dlm.deadline_to_timeout(Deadline::from_millis(1500), 500);
        assert_eq!(timeout, Duration::from_millis(1000));
    }

    #[test]
    fn timeout_is_floor_bounded() {
        let dlm = DeadlineManager::new();
        let timeout = dlm.deadline_to_timeout(Deadline::from_millis(5), 9);
        assert_eq!(timeout, DeadlineManager::MIN_TIMEOUT);
    }

    #[test]
    fn header_value_is_reduced_microseconds() {
        assert_eq!(
            DeadlineManager::timeout_header_value(Duration::from_millis(1000)),
            "990000"
        );
        assert_eq!(DeadlineManager::timeout_header_value(Duration::from_millis(1)), "990");
    }

    #[test]
    fn deadline_in_is_ahead_of_now() {
        let dlm = DeadlineManager::new();
        let deadline = dlm.deadline_in(Duration::from_secs(60));
        let now = dlm.now();
        assert!(deadline.as_millis() > now);
        assert!(dlm.check_deadline(deadline, now).is_ok());
    }
}
