//! Retry and circuit-breaking wrapper around collaborating services.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result, ServiceErrorKind};

use super::breaker::{CircuitBreaker, DEFAULT_COOLDOWN};
use super::recognition::Recognizer;
use super::verification::{VerificationResult, Verifier};

/// Limits applied to every external call.
#[derive(Debug, Clone)]
pub struct ServicePolicy {
    /// Per-request deadline, enforced by the transport
    pub timeout: Duration,
    /// Retries after the first attempt, transient failures only
    pub retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub cooldown: Duration,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            retries: 2,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(2),
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl ServicePolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }

    /// Delay before retry `attempt` (zero based): base, 2×base, … up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }
}

/// A service wrapped with retries and a shared circuit breaker.
pub struct GuardedService<S> {
    inner: S,
    policy: ServicePolicy,
    breaker: Arc<CircuitBreaker>,
}

impl<S> GuardedService<S> {
    pub fn new(inner: S, policy: ServicePolicy, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            inner,
            policy,
            breaker,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> &ServicePolicy {
        &self.policy
    }

    /// Run `op` under the breaker, retrying transient failures.
    pub fn call<T>(&self, mut op: impl FnMut(&S) -> Result<T>) -> Result<T> {
        if self.breaker.is_open() {
            return Err(Error::service(
                ServiceErrorKind::Unavailable,
                "service recently unavailable, skipping",
            ));
        }

        let mut attempt = 0;
        loop {
            match op(&self.inner) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.policy.retries => {
                    let delay = self.policy.backoff(attempt);
                    attempt += 1;
                    log::warn!(
                        "Service call failed ({}), retry {}/{} after {}ms",
                        e,
                        attempt,
                        self.policy.retries,
                        delay.as_millis()
                    );
                    thread::sleep(delay);
                }
                Err(e) => {
                    if matches!(
                        e,
                        Error::ExternalService {
                            kind: ServiceErrorKind::Unavailable,
                            ..
                        }
                    ) {
                        self.breaker.trip();
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl<V: Verifier> Verifier for GuardedService<V> {
    fn verify(&self, pdf: &[u8]) -> Result<VerificationResult> {
        self.call(|inner| inner.verify(pdf))
    }
}

impl<R: Recognizer> Recognizer for GuardedService<R> {
    fn recognize(&self, pdf: &[u8], language: &str) -> Result<Vec<u8>> {
        self.call(|inner| inner.recognize(pdf, language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        kind: ServiceErrorKind,
    }

    impl Verifier for Flaky {
        fn verify(&self, _pdf: &[u8]) -> Result<VerificationResult> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(Error::service(self.kind, "flaky"))
            } else {
                Ok(VerificationResult {
                    attempted: true,
                    compliant: Some(true),
                    ..Default::default()
                })
            }
        }
    }

    fn quick_policy() -> ServicePolicy {
        ServicePolicy::default().with_backoff(Duration::ZERO, Duration::ZERO)
    }

    fn flaky(failures: u32, kind: ServiceErrorKind) -> Flaky {
        Flaky {
            calls: AtomicU32::new(0),
            failures,
            kind,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = ServicePolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(5), Duration::from_secs(2));
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let service = GuardedService::new(
            flaky(2, ServiceErrorKind::Timeout),
            quick_policy(),
            Arc::new(CircuitBreaker::default()),
        );
        let result = service.verify(b"%PDF").unwrap();
        assert_eq!(result.compliant, Some(true));
        assert_eq!(service.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retries_are_bounded() {
        let service = GuardedService::new(
            flaky(10, ServiceErrorKind::Status(502)),
            quick_policy(),
            Arc::new(CircuitBreaker::default()),
        );
        assert!(service.verify(b"%PDF").is_err());
        assert_eq!(service.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_permanent_failures_are_not_retried() {
        let service = GuardedService::new(
            flaky(10, ServiceErrorKind::TooLarge),
            quick_policy(),
            Arc::new(CircuitBreaker::default()),
        );
        assert!(service.verify(b"%PDF").is_err());
        assert_eq!(service.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unavailable_trips_shared_breaker() {
        let clock = Arc::new(ManualClock::new());
        let breaker = Arc::new(CircuitBreaker::with_clock(clock.clone(), Duration::from_secs(60)));
        let service = GuardedService::new(
            flaky(1, ServiceErrorKind::Unavailable),
            quick_policy(),
            breaker.clone(),
        );

        assert!(service.verify(b"%PDF").is_err());
        assert!(breaker.is_open());
        // short-circuited: the inner service is not called again
        let err = service.verify(b"%PDF").unwrap_err();
        assert_eq!(VerificationResult::from_error(&err).attempted, false);
        assert_eq!(service.inner().calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(61));
        assert!(service.verify(b"%PDF").is_ok());
    }
}
