// Adaptive request spacing for one poller. The delay starts at `base`, grows
// by `multiplier` on every throttling error and is capped at `max`.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Throttle {
    base: Duration,
    max: Duration,
    multiplier: u32,
    current: Duration,
    last_request: Option<Instant>,
}

impl Throttle {
    pub fn new(base: Duration, max: Duration, multiplier: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            multiplier: multiplier.max(1),
            current: base,
            last_request: None,
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }

    /// How long to wait at `now` before the next request may go out; the
    /// request is booked for the end of that wait.
    pub fn reserve(&mut self, now: Instant) -> Duration {
        let wait = match self.last_request {
            Some(last) => self.current.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        };
        self.last_request = Some(now + wait);
        wait
    }

    /// Widen the spacing after a throttling error and return the extra pause
    /// to take before the next fetch.
    pub fn back_off(&mut self) -> Duration {
        self.current = self
            .current
            .checked_mul(self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.last_request = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle() -> Throttle {
        Throttle::new(Duration::from_millis(500), Duration::from_millis(2000), 2)
    }

    #[test]
    fn first_request_goes_out_immediately() {
        let mut throttle = throttle();
        assert_eq!(throttle.reserve(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn spacing_accounts_for_elapsed_time() {
        let mut throttle = throttle();
        let start = Instant::now();
        throttle.reserve(start);

        let later = start + Duration::from_millis(200);
        assert_eq!(throttle.reserve(later), Duration::from_millis(300));

        // Booked at start + 500ms; a request at +1.5s is past the spacing
        let much_later = start + Duration::from_millis(1500);
        assert_eq!(throttle.reserve(much_later), Duration::ZERO);
    }

    #[test]
    fn back_off_doubles_up_to_the_ceiling() {
        let mut throttle = throttle();
        assert_eq!(throttle.back_off(), Duration::from_millis(1000));
        assert_eq!(throttle.back_off(), Duration::from_millis(2000));
        assert_eq!(throttle.back_off(), Duration::from_millis(2000));

        throttle.reset();
        assert_eq!(throttle.current_delay(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_requests_are_spaced_by_the_delay() {
        let mut throttle = throttle();
        let start = Instant::now();

        for _ in 0..3 {
            let wait = throttle.reserve(Instant::now());
            tokio::time::sleep(wait).await;
        }

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1100), "{:?}", elapsed);
    }
}
