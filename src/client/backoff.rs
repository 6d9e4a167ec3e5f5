//! Exponential backoff with jitter for reconnects and request retries.
//!
//! Each call to [`ExponentialBackoff::next_backoff`] hands out the current
//! interval randomized by `± randomization_factor`, then grows the interval
//! by `multiplier` until it saturates at `max_interval_ms`. Once the campaign
//! has run longer than `max_elapsed_time_ms` the policy answers
//! [`BackoffDecision::Stop`].
//!
//! With the defaults the base intervals are:
//!
//! | call | base interval (ms) | returned range (ms) |
//! |------|--------------------|---------------------|
//! | 1    | 500                | 250 ..= 750         |
//! | 2    | 750                | 375 ..= 1125        |
//! | 3    | 1125               | 563 ..= 1687        |
//! | ...  | ...                | ...                 |
//! | n    | 60000              | 30000 ..= 90000     |

use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use tracing::trace;

pub const DEFAULT_INITIAL_INTERVAL_MILLIS: u32 = 500;
pub const DEFAULT_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;
pub const DEFAULT_MAX_INTERVAL_MILLIS: u32 = 60_000;
pub const DEFAULT_MAX_ELAPSED_TIME_MILLIS: u64 = 900_000;

/// Invalid backoff configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackoffError {
    #[error("initial interval must be greater than zero")]
    ZeroInitialInterval,

    #[error("randomization factor must be in [0, 1), got {0}")]
    RandomizationFactor(f64),

    #[error("multiplier must be at least 1, got {0}")]
    Multiplier(f64),

    #[error("max interval ({max_ms} ms) is smaller than the initial interval ({initial_ms} ms)")]
    MaxBelowInitial { initial_ms: u32, max_ms: u32 },
}

/// What the retry loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    /// Wait this long, then try again.
    Retry(Duration),
    /// The campaign is over; give up.
    Stop,
}

/// A source of retry delays.
pub trait Backoff {
    /// Returns the next delay, or [`BackoffDecision::Stop`].
    fn next_backoff(&mut self) -> BackoffDecision;

    /// Starts a new campaign.
    fn reset(&mut self);
}

/// Monotonic nanosecond clock used to measure a campaign's elapsed time.
pub trait NanoClock: Send + Sync {
    fn nano_time(&self) -> u64;
}

/// [`NanoClock`] backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl NanoClock for MonotonicClock {
    fn nano_time(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Tunable parameters of an [`ExponentialBackoff`].
///
/// Missing fields fall back to the defaults when deserialized:
///
/// ```
/// use wirehttp::client::backoff::BackoffConfig;
///
/// let config: BackoffConfig = serde_json::from_str(r#"{ "max_interval_ms": 5000 }"#).unwrap();
/// assert_eq!(config.max_interval_ms, 5000);
/// assert_eq!(config.initial_interval_ms, 500);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_interval_ms: u32,
    pub multiplier: f64,
    pub randomization_factor: f64,
    pub max_interval_ms: u32,
    pub max_elapsed_time_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: DEFAULT_INITIAL_INTERVAL_MILLIS,
            multiplier: DEFAULT_MULTIPLIER,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            max_interval_ms: DEFAULT_MAX_INTERVAL_MILLIS,
            max_elapsed_time_ms: DEFAULT_MAX_ELAPSED_TIME_MILLIS,
        }
    }
}

impl BackoffConfig {
    /// Checks the invariants [`ExponentialBackoff`] relies on.
    pub fn validate(&self) -> Result<(), BackoffError> {
        if self.initial_interval_ms == 0 {
            return Err(BackoffError::ZeroInitialInterval);
        }
        if !(0.0..1.0).contains(&self.randomization_factor) {
            return Err(BackoffError::RandomizationFactor(self.randomization_factor));
        }
        if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
            return Err(BackoffError::Multiplier(self.multiplier));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(BackoffError::MaxBelowInitial {
                initial_ms: self.initial_interval_ms,
                max_ms: self.max_interval_ms,
            });
        }
        Ok(())
    }
}

/// Picks a value uniformly from
/// `[current - factor * current, current + factor * current]`.
///
/// `random` must be in `[0, 1)`. Every integer of the closed range gets an
/// equal share of the unit interval, so for `factor = 0.5` and `current = 2`
/// the values `1`, `2` and `3` each get a third. Fractional bounds are
/// rounded inwards, so the result always lies within the range.
///
/// ```
/// use wirehttp::client::backoff::randomized_interval;
///
/// assert_eq!(randomized_interval(0.5, 0.0, 2), 1);
/// assert_eq!(randomized_interval(0.5, 0.5, 2), 2);
/// assert_eq!(randomized_interval(0.5, 0.99, 2), 3);
/// ```
pub fn randomized_interval(randomization_factor: f64, random: f64, current_interval_ms: u32) -> u64 {
    let current = f64::from(current_interval_ms);
    let delta = randomization_factor * current;
    let min = current - delta;
    let max = current + delta;
    let picked = (min + random * (max - min + 1.0)).floor();
    // With fractional bounds the +1 can reach past max.
    picked.clamp(min.ceil(), max.floor()) as u64
}

/// Stateful exponential backoff policy for one retry campaign.
///
/// Not meant to be shared between concurrent retry loops; give each loop its
/// own instance and call [`reset`](Backoff::reset) between campaigns.
///
/// # Examples
///
/// ```
/// use wirehttp::client::backoff::{Backoff, BackoffDecision, ExponentialBackoff};
///
/// let mut backoff = ExponentialBackoff::builder()
///     .initial_interval_ms(100)
///     .randomization_factor(0.0)
///     .multiplier(2.0)
///     .max_interval_ms(300)
///     .build()
///     .unwrap();
///
/// let delays: Vec<_> = (0..4).map(|_| backoff.next_backoff()).collect();
/// assert_eq!(delays[0], BackoffDecision::Retry(std::time::Duration::from_millis(100)));
/// assert_eq!(delays[1], BackoffDecision::Retry(std::time::Duration::from_millis(200)));
/// assert_eq!(delays[3], BackoffDecision::Retry(std::time::Duration::from_millis(300)));
/// ```
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current_interval_ms: u32,
    start_time_nanos: u64,
    clock: Box<dyn NanoClock>,
    rng: fastrand::Rng,
}

impl fmt::Debug for ExponentialBackoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExponentialBackoff")
            .field("config", &self.config)
            .field("current_interval_ms", &self.current_interval_ms)
            .field("start_time_nanos", &self.start_time_nanos)
            .finish_non_exhaustive()
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl ExponentialBackoff {
    /// A policy with the default parameters, a monotonic clock and an
    /// entropy-seeded random source.
    pub fn new() -> Self {
        Self::with_parts(
            BackoffConfig::default(),
            Box::new(MonotonicClock::default()),
            fastrand::Rng::new(),
        )
    }

    /// Builds a policy from a (possibly deserialized) configuration.
    pub fn from_config(config: BackoffConfig) -> Result<Self, BackoffError> {
        config.validate()?;
        Ok(Self::with_parts(
            config,
            Box::new(MonotonicClock::default()),
            fastrand::Rng::new(),
        ))
    }

    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    fn with_parts(config: BackoffConfig, clock: Box<dyn NanoClock>, rng: fastrand::Rng) -> Self {
        let start_time_nanos = clock.nano_time();
        Self {
            current_interval_ms: config.initial_interval_ms,
            config,
            start_time_nanos,
            clock,
            rng,
        }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    pub fn initial_interval_ms(&self) -> u32 {
        self.config.initial_interval_ms
    }

    pub fn multiplier(&self) -> f64 {
        self.config.multiplier
    }

    pub fn randomization_factor(&self) -> f64 {
        self.config.randomization_factor
    }

    pub fn max_interval_ms(&self) -> u32 {
        self.config.max_interval_ms
    }

    pub fn max_elapsed_time_ms(&self) -> u64 {
        self.config.max_elapsed_time_ms
    }

    /// The base interval the next call will randomize around.
    pub fn current_interval_ms(&self) -> u32 {
        self.current_interval_ms
    }

    /// Milliseconds since the campaign started (construction or last reset).
    pub fn elapsed_ms(&self) -> u64 {
        self.clock.nano_time().saturating_sub(self.start_time_nanos) / 1_000_000
    }

    fn increment_current_interval(&mut self) {
        // f64 holds every u32 exactly, so the product cannot wrap.
        let next = f64::from(self.current_interval_ms) * self.config.multiplier;
        let max = self.config.max_interval_ms;
        self.current_interval_ms = if next >= f64::from(max) {
            max
        } else {
            next as u32
        };
    }
}

impl Backoff for ExponentialBackoff {
    fn next_backoff(&mut self) -> BackoffDecision {
        let elapsed_ms = self.elapsed_ms();
        if elapsed_ms > self.config.max_elapsed_time_ms {
            trace!(elapsed_ms, "backoff campaign exceeded its elapsed time");
            return BackoffDecision::Stop;
        }

        let delay_ms = randomized_interval(
            self.config.randomization_factor,
            self.rng.f64(),
            self.current_interval_ms,
        );
        self.increment_current_interval();
        trace!(delay_ms, next_interval_ms = self.current_interval_ms, "backoff interval issued");
        BackoffDecision::Retry(Duration::from_millis(delay_ms))
    }

    fn reset(&mut self) {
        self.current_interval_ms = self.config.initial_interval_ms;
        self.start_time_nanos = self.clock.nano_time();
    }
}

/// Builder for [`ExponentialBackoff`].
#[derive(Default)]
pub struct ExponentialBackoffBuilder {
    config: BackoffConfig,
    seed: Option<u64>,
    clock: Option<Box<dyn NanoClock>>,
}

impl ExponentialBackoffBuilder {
    #[must_use]
    pub fn config(mut self, config: BackoffConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn initial_interval_ms(mut self, millis: u32) -> Self {
        self.config.initial_interval_ms = millis;
        self
    }

    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.config.multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn randomization_factor(mut self, factor: f64) -> Self {
        self.config.randomization_factor = factor;
        self
    }

    #[must_use]
    pub fn max_interval_ms(mut self, millis: u32) -> Self {
        self.config.max_interval_ms = millis;
        self
    }

    #[must_use]
    pub fn max_elapsed_time_ms(mut self, millis: u64) -> Self {
        self.config.max_elapsed_time_ms = millis;
        self
    }

    /// Makes the jitter sequence reproducible.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: impl NanoClock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    pub fn build(self) -> Result<ExponentialBackoff, BackoffError> {
        self.config.validate()?;
        let clock = self
            .clock
            .unwrap_or_else(|| Box::new(MonotonicClock::default()));
        let rng = self.seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        Ok(ExponentialBackoff::with_parts(self.config, clock, rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock whose time only moves when the test says so.
    #[derive(Clone, Default)]
    struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        fn advance_ms(&self, ms: u64) {
            self.0.fetch_add(ms * 1_000_000, Ordering::SeqCst);
        }
    }

    impl NanoClock for ManualClock {
        fn nano_time(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Clock that moves forward one second every time it is read.
    struct TickingClock(AtomicU64);

    impl NanoClock for TickingClock {
        fn nano_time(&self) -> u64 {
            self.0.fetch_add(1, Ordering::SeqCst) * 1_000_000_000
        }
    }

    fn delay_ms(decision: BackoffDecision) -> u64 {
        match decision {
            BackoffDecision::Retry(d) => u64::try_from(d.as_millis()).unwrap(),
            BackoffDecision::Stop => panic!("unexpected stop"),
        }
    }

    #[test]
    fn defaults() {
        let b = ExponentialBackoff::new();
        assert_eq!(b.initial_interval_ms(), 500);
        assert_eq!(b.current_interval_ms(), 500);
        assert_eq!(b.multiplier(), 1.5);
        assert_eq!(b.randomization_factor(), 0.5);
        assert_eq!(b.max_interval_ms(), 60_000);
        assert_eq!(b.max_elapsed_time_ms(), 900_000);

        let built = ExponentialBackoff::builder().build().unwrap();
        assert_eq!(built.config(), b.config());
    }

    #[test]
    fn builder_overrides() {
        let b = ExponentialBackoff::builder()
            .initial_interval_ms(1)
            .randomization_factor(0.1)
            .multiplier(5.0)
            .max_interval_ms(10)
            .max_elapsed_time_ms(900_000)
            .build()
            .unwrap();
        assert_eq!(b.initial_interval_ms(), 1);
        assert_eq!(b.current_interval_ms(), 1);
        assert_eq!(b.randomization_factor(), 0.1);
        assert_eq!(b.multiplier(), 5.0);
        assert_eq!(b.max_interval_ms(), 10);
    }

    #[test]
    fn intervals_grow_and_saturate_with_bounded_jitter() {
        let mut b = ExponentialBackoff::builder()
            .initial_interval_ms(500)
            .randomization_factor(0.1)
            .multiplier(2.0)
            .max_interval_ms(5000)
            .seed(7)
            .build()
            .unwrap();

        for expected in [500u64, 1000, 2000, 4000, 5000, 5000, 5000, 5000, 5000, 5000] {
            assert_eq!(u64::from(b.current_interval_ms()), expected);
            let min = expected - expected / 10;
            let max = expected + expected / 10;
            let actual = delay_ms(b.next_backoff());
            assert!((min..=max).contains(&actual), "{actual} not in {min}..={max}");
        }
    }

    #[test]
    fn randomized_interval_splits_range_evenly() {
        assert_eq!(randomized_interval(0.5, 0.0, 2), 1);
        assert_eq!(randomized_interval(0.5, 0.33, 2), 1);
        assert_eq!(randomized_interval(0.5, 0.34, 2), 2);
        assert_eq!(randomized_interval(0.5, 0.66, 2), 2);
        assert_eq!(randomized_interval(0.5, 0.67, 2), 3);
        assert_eq!(randomized_interval(0.5, 0.99, 2), 3);
    }

    #[test]
    fn fractional_bounds_stay_inside_range() {
        // [2.5, 7.5]
        assert_eq!(randomized_interval(0.5, 0.0, 5), 3);
        assert_eq!(randomized_interval(0.5, 0.999, 5), 7);
        // Third default interval: [562.5, 1687.5]
        assert_eq!(randomized_interval(0.5, 0.0, 1125), 563);
        assert_eq!(randomized_interval(0.5, 0.9995, 1125), 1687);

        for i in 0..1000 {
            let r = f64::from(i) / 1000.0;
            let value = randomized_interval(0.5, r, 5);
            assert!((3..=7).contains(&value), "{r} -> {value}");
        }
    }

    #[test]
    fn zero_randomization_is_exact() {
        assert_eq!(randomized_interval(0.0, 0.0, 750), 750);
        assert_eq!(randomized_interval(0.0, 0.999, 750), 750);
    }

    #[test]
    fn same_seed_same_delays() {
        let run = || {
            let mut b = ExponentialBackoff::builder().seed(42).build().unwrap();
            (0..5).map(|_| b.next_backoff()).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn elapsed_time_uses_clock() {
        let b = ExponentialBackoff::builder()
            .clock(TickingClock(AtomicU64::new(0)))
            .build()
            .unwrap();
        assert_eq!(b.elapsed_ms(), 1000);
    }

    #[test]
    fn stops_after_max_elapsed_time_without_advancing() {
        let clock = ManualClock::default();
        let mut b = ExponentialBackoff::builder()
            .clock(clock.clone())
            .build()
            .unwrap();

        assert_ne!(b.next_backoff(), BackoffDecision::Stop);
        let interval = b.current_interval_ms();

        clock.advance_ms(900_000);
        assert_ne!(b.next_backoff(), BackoffDecision::Stop);

        clock.advance_ms(1);
        let interval_before_stop = b.current_interval_ms();
        assert_eq!(b.next_backoff(), BackoffDecision::Stop);
        assert_eq!(b.next_backoff(), BackoffDecision::Stop);
        assert_eq!(b.current_interval_ms(), interval_before_stop);
        assert!(interval_before_stop > interval);
    }

    #[test]
    fn reset_starts_a_new_campaign() {
        let clock = ManualClock::default();
        let mut b = ExponentialBackoff::builder()
            .clock(clock.clone())
            .build()
            .unwrap();
        b.next_backoff();
        b.next_backoff();
        clock.advance_ms(1_000_000);
        assert_eq!(b.next_backoff(), BackoffDecision::Stop);

        b.reset();
        assert_eq!(b.current_interval_ms(), 500);
        assert_eq!(b.elapsed_ms(), 0);
        assert_ne!(b.next_backoff(), BackoffDecision::Stop);
    }

    #[test]
    fn multiplication_overflow_clamps_to_max() {
        let mut b = ExponentialBackoff::builder()
            .initial_interval_ms(u32::MAX / 2)
            .multiplier(2.1)
            .max_interval_ms(u32::MAX)
            .build()
            .unwrap();
        b.next_backoff();
        assert_eq!(b.current_interval_ms(), u32::MAX);
        b.next_backoff();
        assert_eq!(b.current_interval_ms(), u32::MAX);
    }

    #[test]
    fn interval_never_decreases() {
        let mut b = ExponentialBackoff::builder()
            .initial_interval_ms(10)
            .multiplier(1.1)
            .max_interval_ms(50)
            .build()
            .unwrap();
        let mut previous = b.current_interval_ms();
        for _ in 0..100 {
            b.next_backoff();
            assert!(b.current_interval_ms() >= previous);
            assert!(b.current_interval_ms() <= 50);
            previous = b.current_interval_ms();
        }
        assert_eq!(previous, 50);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let err = |builder: ExponentialBackoffBuilder| builder.build().unwrap_err();
        assert_eq!(
            err(ExponentialBackoff::builder().initial_interval_ms(0)),
            BackoffError::ZeroInitialInterval
        );
        assert_eq!(
            err(ExponentialBackoff::builder().randomization_factor(1.0)),
            BackoffError::RandomizationFactor(1.0)
        );
        assert_eq!(
            err(ExponentialBackoff::builder().multiplier(0.5)),
            BackoffError::Multiplier(0.5)
        );
        assert_eq!(
            err(ExponentialBackoff::builder().initial_interval_ms(10).max_interval_ms(5)),
            BackoffError::MaxBelowInitial {
                initial_ms: 10,
                max_ms: 5
            }
        );
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: BackoffConfig =
            serde_json::from_str(r#"{"initial_interval_ms": 100, "multiplier": 2.0}"#).unwrap();
        assert_eq!(config.initial_interval_ms, 100);
        assert_eq!(config.multiplier, 2.0);
        assert_eq!(config.max_elapsed_time_ms, DEFAULT_MAX_ELAPSED_TIME_MILLIS);
        assert!(ExponentialBackoff::from_config(config).is_ok());
    }
}
