//! Per-host politeness
//!
//! Caps simultaneous requests to one registrable domain independently of the
//! global worker count, spaces requests by the configured minimum delay or the
//! robots.txt crawl-delay (whichever is larger), and adds a random jitter so
//! workers do not fire in lockstep.

use crate::state::DomainState;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
struct HostSlot {
    semaphore: Arc<Semaphore>,
    state: DomainState,
    in_flight: usize,
    peak_in_flight: usize,
}

/// Per-registrable-domain concurrency and spacing
#[derive(Debug)]
pub struct HostLimiter {
    per_host: usize,
    min_delay: Duration,
    jitter_ms: u64,
    hosts: Mutex<HashMap<String, HostSlot>>,
}

/// Permission to send one request to a domain
///
/// Dropping the permit frees the slot.
#[derive(Debug)]
pub struct HostPermit<'a> {
    limiter: &'a HostLimiter,
    domain: String,
    _permit: OwnedSemaphorePermit,
}

impl Drop for HostPermit<'_> {
    fn drop(&mut self) {
        self.limiter.with_slot(&self.domain, |slot| {
            slot.in_flight = slot.in_flight.saturating_sub(1);
        });
    }
}

impl HostLimiter {
    /// Creates a limiter
    ///
    /// # Arguments
    ///
    /// * `per_host` - Maximum in-flight requests per registrable domain
    /// * `min_delay` - Minimum spacing between request starts to one domain
    /// * `jitter_ms` - Upper bound of the random delay added before each request
    pub fn new(per_host: usize, min_delay: Duration, jitter_ms: u64) -> Self {
        Self {
            per_host: per_host.max(1),
            min_delay,
            jitter_ms,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    fn with_slot<T>(&self, domain: &str, f: impl FnOnce(&mut HostSlot) -> T) -> T {
        let mut hosts = match self.hosts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let slot = hosts.entry(domain.to_string()).or_insert_with(|| HostSlot {
            semaphore: Arc::new(Semaphore::new(self.per_host)),
            state: DomainState::new(),
            in_flight: 0,
            peak_in_flight: 0,
        });
        f(slot)
    }

    /// Waits until a request to `domain` may start
    ///
    /// # Arguments
    ///
    /// * `domain` - Registrable domain of the request
    /// * `crawl_delay` - Crawl-delay announced by robots.txt, used as a floor
    ///
    /// # Returns
    ///
    /// A permit that must be held for the duration of the request
    pub async fn acquire(
        &self,
        domain: &str,
        crawl_delay: Option<Duration>,
    ) -> Result<HostPermit<'_>, AcquireError> {
        let semaphore = self.with_slot(domain, |slot| {
            if crawl_delay.is_some() {
                slot.state.crawl_delay = crawl_delay;
            }
            slot.semaphore.clone()
        });
        let permit = semaphore.acquire_owned().await?;

        let wait = self.with_slot(domain, |slot| {
            slot.state.reserve_slot(Instant::now(), self.min_delay)
        }) + jitter(self.jitter_ms);
        if !wait.is_zero() {
            tracing::trace!("Waiting {:?} before next request to {}", wait, domain);
            tokio::time::sleep(wait).await;
        }

        self.with_slot(domain, |slot| {
            slot.in_flight += 1;
            slot.peak_in_flight = slot.peak_in_flight.max(slot.in_flight);
        });

        Ok(HostPermit {
            limiter: self,
            domain: domain.to_string(),
            _permit: permit,
        })
    }

    /// Holds back every request to `domain` until `until`
    pub fn defer(&self, domain: &str, until: Instant) {
        self.with_slot(domain, |slot| slot.state.defer_until(until));
    }

    /// Highest number of simultaneous requests observed for a domain
    pub fn peak_in_flight(&self, domain: &str) -> usize {
        self.with_slot(domain, |slot| slot.peak_in_flight)
    }

    /// Requests started against a domain
    #[cfg(test)]
    pub fn request_count(&self, domain: &str) -> u32 {
        self.with_slot(domain, |slot| slot.state.request_count)
    }
}

/// Random delay in `0..=max_ms` milliseconds
pub fn jitter(max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_per_host_cap_holds() {
        let limiter = Arc::new(HostLimiter::new(2, Duration::ZERO, 0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    let _permit = limiter.acquire("example.com", None).await.unwrap();
                    tokio::time::sleep(Duration::from_millis(20)).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(limiter.peak_in_flight("example.com"), 2);
        assert_eq!(limiter.request_count("example.com"), 8);
    }

    #[tokio::test]
    async fn test_domains_are_independent() {
        let limiter = HostLimiter::new(1, Duration::ZERO, 0);
        let _a = limiter.acquire("example.com", None).await.unwrap();
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            limiter.acquire("example.org", None),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_crawl_delay_spaces_requests() {
        let limiter = HostLimiter::new(4, Duration::ZERO, 0);
        let start = Instant::now();
        for _ in 0..3 {
            let _permit = limiter
                .acquire("example.com", Some(Duration::from_millis(40)))
                .await
                .unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_defer_pushes_next_request() {
        let limiter = HostLimiter::new(1, Duration::ZERO, 0);
        let start = Instant::now();
        limiter.defer("example.com", start + Duration::from_millis(50));
        let _permit = limiter.acquire("example.com", None).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(jitter(0), Duration::ZERO);
        for _ in 0..50 {
            assert!(jitter(10) <= Duration::from_millis(10));
        }
    }
}
