//! Deadline tracking for expect loops.

use std::time::Duration;

use tokio::time::Instant;

/// An absolute instant shared by every wait of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    deadline: Instant,
}

impl Deadline {
    /// Create a deadline `duration` from now.
    #[must_use]
    pub fn from_now(duration: Duration) -> Self {
        let now = Instant::now();
        Self {
            deadline: now.checked_add(duration).unwrap_or_else(|| far_future(now)),
        }
    }

    /// Create a deadline at a given instant.
    #[must_use]
    pub const fn at(deadline: Instant) -> Self {
        Self { deadline }
    }

    /// The instant itself.
    #[must_use]
    pub const fn instant(&self) -> Instant {
        self.deadline
    }

    /// Check if the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Get the remaining time until the deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// The earlier of two deadlines.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        if other.deadline < self.deadline { other } else { self }
    }
}

fn far_future(now: Instant) -> Instant {
    // About thirty years, well inside every platform's Instant range.
    now + Duration::from_secs(86_400 * 365 * 30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_remaining() {
        let deadline = Deadline::from_now(Duration::from_secs(10));
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() > Duration::from_secs(9));
    }

    #[tokio::test]
    async fn zero_deadline_is_expired() {
        let deadline = Deadline::from_now(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn huge_duration_does_not_overflow() {
        let deadline = Deadline::from_now(Duration::MAX);
        assert!(!deadline.is_expired());
    }

    #[tokio::test]
    async fn min_picks_earlier() {
        let a = Deadline::from_now(Duration::from_secs(1));
        let b = Deadline::from_now(Duration::from_secs(5));
        assert_eq!(a.min(b), a);
        assert_eq!(b.min(a), a);
    }
}
