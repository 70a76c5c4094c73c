//! Inter-record pacing
//!
//! The pipeline pauses between records. How long depends on what the previous
//! record ran into: ordinary outcomes get the baseline delay, a challenge wall
//! an extended one, rate limiting the longest. Every delay is jittered upward
//! so requests do not arrive at a fixed cadence.
//!
//! Sleeping goes through the [`Sleeper`] trait so tests can record requested
//! delays instead of waiting them out.

use crate::config::PacingConfig;
use crate::types::PaceTier;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// A pause chosen by the [`PacingPolicy`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pause {
    /// Tier that selected the delay
    pub tier: PaceTier,
    /// How long to wait
    pub delay: Duration,
}

/// Maps the previous record's outcome class to the delay before the next one
#[derive(Clone, Debug)]
pub struct PacingPolicy {
    config: PacingConfig,
}

impl From<PacingConfig> for PacingPolicy {
    fn from(config: PacingConfig) -> Self {
        Self { config }
    }
}

impl PacingPolicy {
    /// Undelayed length of a tier
    pub fn base_delay(&self, tier: PaceTier) -> Duration {
        match tier {
            PaceTier::Baseline => self.config.baseline,
            PaceTier::AfterChallenge => self.config.after_challenge,
            PaceTier::AfterRateLimit => self.config.after_rate_limit,
            PaceTier::Cooldown => self.config.cooldown,
        }
    }

    /// Pause to take after a record whose outcome mapped to `tier`
    ///
    /// `processed` is the number of records handled so far in the session.
    /// Every `cooldown_every` records the cool-down replaces the tier when it
    /// is the longer of the two.
    pub fn delay_after(&self, tier: PaceTier, processed: u64) -> Pause {
        let tier = match self.config.cooldown_every {
            Some(every)
                if every > 0
                    && processed > 0
                    && processed.is_multiple_of(u64::from(every))
                    && self.config.cooldown > self.base_delay(tier) =>
            {
                PaceTier::Cooldown
            }
            _ => tier,
        };

        Pause {
            tier,
            delay: self.jittered(self.base_delay(tier)),
        }
    }

    /// Wait before retrying a rate-limited fetch
    pub fn rate_limit_backoff(&self) -> Duration {
        self.jittered(self.config.after_rate_limit)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        add_jitter(delay, self.config.jitter_ratio)
    }
}

/// Stretch `delay` by a uniform random factor in `[1, 1 + ratio]`
fn add_jitter(delay: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 || delay.is_zero() {
        return delay;
    }
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=ratio);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

/// Something that can wait
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspend for `duration`
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter_ratio: f64, cooldown_every: Option<u32>) -> PacingPolicy {
        PacingPolicy::from(PacingConfig {
            baseline: Duration::from_secs(5),
            after_challenge: Duration::from_secs(30),
            after_rate_limit: Duration::from_secs(60),
            jitter_ratio,
            cooldown_every,
            cooldown: Duration::from_secs(20),
        })
    }

    #[test]
    fn tiers_map_to_configured_delays() {
        let p = policy(0.0, None);
        assert_eq!(p.delay_after(PaceTier::Baseline, 1).delay, Duration::from_secs(5));
        assert_eq!(
            p.delay_after(PaceTier::AfterChallenge, 1).delay,
            Duration::from_secs(30)
        );
        assert_eq!(
            p.delay_after(PaceTier::AfterRateLimit, 1).delay,
            Duration::from_secs(60)
        );
        assert_eq!(p.rate_limit_backoff(), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let p = policy(0.2, None);
        for i in 0..200 {
            let pause = p.delay_after(PaceTier::Baseline, 1);
            assert!(pause.delay >= Duration::from_secs(5), "iteration {i}: {pause:?}");
            assert!(pause.delay <= Duration::from_millis(6001), "iteration {i}: {pause:?}");
        }
    }

    #[test]
    fn jittered_tiers_never_overlap_with_default_ratios() {
        let p = PacingPolicy::from(PacingConfig::default());
        for _ in 0..200 {
            let baseline = p.delay_after(PaceTier::Baseline, 1).delay;
            let challenge = p.delay_after(PaceTier::AfterChallenge, 1).delay;
            let limited = p.delay_after(PaceTier::AfterRateLimit, 1).delay;
            assert!(challenge > baseline);
            assert!(limited > baseline);
        }
    }

    #[test]
    fn cooldown_replaces_shorter_tier_on_interval() {
        let p = policy(0.0, Some(3));
        let pause = p.delay_after(PaceTier::Baseline, 3);
        assert_eq!(pause.tier, PaceTier::Cooldown);
        assert_eq!(pause.delay, Duration::from_secs(20));

        // Off-interval records keep their tier
        assert_eq!(p.delay_after(PaceTier::Baseline, 4).tier, PaceTier::Baseline);
        // A longer tier wins over the cool-down
        assert_eq!(
            p.delay_after(PaceTier::AfterRateLimit, 6).tier,
            PaceTier::AfterRateLimit
        );
    }

    #[test]
    fn cooldown_disabled_or_zero_processed() {
        assert_eq!(
            policy(0.0, None).delay_after(PaceTier::Baseline, 20).tier,
            PaceTier::Baseline
        );
        assert_eq!(
            policy(0.0, Some(3)).delay_after(PaceTier::Baseline, 0).tier,
            PaceTier::Baseline
        );
    }

    #[test]
    fn add_jitter_on_zero_delay_returns_zero() {
        assert_eq!(add_jitter(Duration::ZERO, 0.5), Duration::ZERO);
    }

    #[tokio::test]
    async fn tokio_sleeper_waits_requested_duration() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_millis(20)).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
