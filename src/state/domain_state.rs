use std::time::{Duration, Instant};

/// Per-domain politeness state
///
/// Tracks when the next request to a registrable domain may start. Slots are
/// reserved up front so concurrent workers targeting the same domain are spaced
/// by the effective delay instead of all firing at once.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Number of requests started against this domain
    pub request_count: u32,

    /// Earliest instant the next request may start
    pub next_allowed: Option<Instant>,

    /// Crawl-delay announced by robots.txt
    pub crawl_delay: Option<Duration>,
}

impl DomainState {
    /// Creates a new DomainState with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay between requests: the configured minimum or the robots crawl-delay, whichever is larger
    pub fn effective_delay(&self, min_delay: Duration) -> Duration {
        match self.crawl_delay {
            Some(delay) if delay > min_delay => delay,
            _ => min_delay,
        }
    }

    /// Reserves the next request slot
    ///
    /// # Arguments
    ///
    /// * `now` - The current time instant
    /// * `min_delay` - Configured minimum spacing between requests
    ///
    /// # Returns
    ///
    /// How long the caller must wait before sending its request
    pub fn reserve_slot(&mut self, now: Instant, min_delay: Duration) -> Duration {
        let start = match self.next_allowed {
            Some(next) if next > now => next,
            _ => now,
        };
        self.next_allowed = Some(start + self.effective_delay(min_delay));
        self.request_count += 1;
        start.saturating_duration_since(now)
    }

    /// Pushes the next slot out, e.g. after a Retry-After response
    pub fn defer_until(&mut self, until: Instant) {
        match self.next_allowed {
            Some(next) if next >= until => {}
            _ => self.next_allowed = Some(until),
        }
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now.
    #[cfg(test)]
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        self.next_allowed
            .filter(|next| *next > now)
            .map(|next| next - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_slot_is_immediate() {
        let mut state = DomainState::new();
        let now = Instant::now();
        assert_eq!(state.reserve_slot(now, Duration::from_millis(100)), Duration::ZERO);
        assert_eq!(state.request_count, 1);
    }

    #[test]
    fn test_slots_are_spaced() {
        let mut state = DomainState::new();
        let now = Instant::now();
        let delay = Duration::from_millis(100);

        assert_eq!(state.reserve_slot(now, delay), Duration::ZERO);
        assert_eq!(state.reserve_slot(now, delay), delay);
        assert_eq!(state.reserve_slot(now, delay), delay * 2);
    }

    #[test]
    fn test_crawl_delay_is_a_floor() {
        let mut state = DomainState {
            crawl_delay: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        assert_eq!(
            state.effective_delay(Duration::from_millis(100)),
            Duration::from_secs(2)
        );
        assert_eq!(
            state.effective_delay(Duration::from_secs(5)),
            Duration::from_secs(5)
        );

        let now = Instant::now();
        state.reserve_slot(now, Duration::ZERO);
        assert_eq!(state.time_until_next_request(now), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_defer_until_only_extends() {
        let mut state = DomainState::new();
        let now = Instant::now();
        state.defer_until(now + Duration::from_secs(10));
        state.defer_until(now + Duration::from_secs(1));
        assert_eq!(
            state.time_until_next_request(now),
            Some(Duration::from_secs(10))
        );
    }
}
