use std::time::Duration;

use tokio::time::Instant;

/// A value that only becomes observable once it has stopped changing for `delay`.
///
/// Time is passed in explicitly; the owner schedules a wake-up for the deadline returned
/// by [`Debounced::set`] and calls [`Debounced::settle`] when it fires.
#[derive(Debug, Clone)]
pub struct Debounced<T> {
    settled: T,
    pending: Option<(T, Instant)>,
    delay: Duration,
}

impl<T: Clone + PartialEq> Debounced<T> {
    pub fn new(initial: T, delay: Duration) -> Self {
        Self {
            settled: initial,
            pending: None,
            delay,
        }
    }

    /// Records a new value and restarts the quiet period.
    pub fn set(&mut self, value: T, now: Instant) -> Instant {
        let deadline = now + self.delay;
        self.pending = Some((value, deadline));
        deadline
    }

    pub fn settled(&self) -> &T {
        &self.settled
    }

    /// Promotes the pending value if its quiet period has elapsed.
    ///
    /// Returns the newly settled value only when it differs from the previous one.
    pub fn settle(&mut self, now: Instant) -> Option<&T> {
        let ready = matches!(&self.pending, Some((_, deadline)) if *deadline <= now);
        if !ready {
            return None;
        }
        let (value, _) = self.pending.take()?;
        if value == self.settled {
            return None;
        }
        self.settled = value;
        Some(&self.settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn only_last_value_settles_after_quiet_period() {
        let mut value = Debounced::new(60_u32, Duration::from_millis(300));
        let start = Instant::now();

        value.set(65, start);
        value.set(70, start + Duration::from_millis(100));
        assert_eq!(value.settle(start + Duration::from_millis(350)), None);
        assert_eq!(
            value.settle(start + Duration::from_millis(400)).copied(),
            Some(70)
        );
        assert_eq!(*value.settled(), 70);
        assert_eq!(value.settle(start + Duration::from_secs(5)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_value_does_not_resettle() {
        let mut value = Debounced::new(60_u32, Duration::from_millis(300));
        let start = Instant::now();
        value.set(60, start);
        assert_eq!(value.settle(start + Duration::from_secs(1)), None);
    }
}
