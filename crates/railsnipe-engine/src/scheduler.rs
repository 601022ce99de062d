// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry scheduler: wait intervals and retry/abort decisions.
//!
//! Everything here is pure. The reservation task feeds each classified
//! failure to [`RetryPolicy::decide`] and acts on the returned [`Decision`].

use std::time::Duration;

use railsnipe_config::model::RetryConfig;
use railsnipe_core::{ErrorClass, ErrorKind, RailsnipeError, TaskError, UpstreamError};
use rand::Rng;
use rand_distr::{Distribution, Gamma};

/// How long a wait should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// The plain sampled interval.
    Short,
    /// The sampled interval stretched by the bot back-off multiplier.
    Long,
}

/// Where the loop picks up after a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Search,
    /// Retry the reservation of the train already selected.
    Attempt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Wait {
        pacing: Pacing,
        resume: Resume,
        /// Drop the session handle before waiting.
        invalidate_session: bool,
    },
    /// Drop the handle and retry the attempt with a fresh login, no wait.
    Reauthenticate,
    Fail(TaskError),
}

/// Streak counters carried across cycles of one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub transient_streak: u32,
    pub bot_streak: u32,
    /// A re-authentication was already spent since the last non-auth outcome.
    pub reauth_spent: bool,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    gamma: Gamma<f64>,
    floor_secs: f64,
    bot_multiplier: f64,
    transient_budget: u32,
    bot_streak_threshold: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Result<Self, RailsnipeError> {
        let gamma = Gamma::new(config.gamma_shape, config.gamma_scale).map_err(|e| {
            RailsnipeError::Config(format!(
                "invalid gamma distribution (shape {}, scale {}): {e}",
                config.gamma_shape, config.gamma_scale
            ))
        })?;
        Ok(Self {
            gamma,
            floor_secs: config.floor_secs.max(0.0),
            bot_multiplier: config.bot_backoff_multiplier.max(1.0),
            transient_budget: config.transient_retry_budget,
            bot_streak_threshold: config.bot_streak_threshold,
        })
    }

    pub fn floor(&self) -> Duration {
        Duration::from_secs_f64(self.floor_secs)
    }

    /// Samples one wait interval.
    pub fn interval<R: Rng + ?Sized>(&self, rng: &mut R, pacing: Pacing) -> Duration {
        let multiplier = match pacing {
            Pacing::Short => 1.0,
            Pacing::Long => self.bot_multiplier,
        };
        interval_from_sample(self.gamma.sample(rng), self.floor_secs, multiplier)
    }

    /// Decides what to do after a step failed with `error`.
    pub fn decide(&self, error: &UpstreamError, state: &mut RetryState) -> Decision {
        match error.class {
            ErrorClass::NoSeat => {
                *state = RetryState::default();
                short_wait(Resume::Search)
            }
            ErrorClass::TransientNetwork | ErrorClass::Rejected => {
                state.bot_streak = 0;
                state.reauth_spent = false;
                self.transient(state)
            }
            ErrorClass::SessionExpired | ErrorClass::InvalidCredentials => {
                if state.reauth_spent {
                    return Decision::Fail(TaskError::new(
                        ErrorKind::Auth,
                        format!("session rejected again after re-authentication: {}", error.message),
                    ));
                }
                state.reauth_spent = true;
                Decision::Reauthenticate
            }
            ErrorClass::BotDetected => {
                state.transient_streak = 0;
                state.reauth_spent = false;
                state.bot_streak += 1;
                if state.bot_streak > self.bot_streak_threshold {
                    return Decision::Fail(TaskError::new(
                        ErrorKind::RateLimit,
                        format!(
                            "bot detection persisted for {} consecutive cycles: {}",
                            state.bot_streak, error.message
                        ),
                    ));
                }
                Decision::Wait {
                    pacing: Pacing::Long,
                    resume: Resume::Search,
                    invalidate_session: true,
                }
            }
            ErrorClass::ValidationError => Decision::Fail(TaskError::from(error)),
        }
    }

    /// Decides what to do after logging in failed.
    ///
    /// A login the provider refuses is final; anything else is handled like
    /// the same failure on a regular call.
    pub fn decide_login_failure(&self, error: &UpstreamError, state: &mut RetryState) -> Decision {
        if error.class.is_auth() {
            return Decision::Fail(TaskError::new(
                ErrorKind::Auth,
                format!("login failed: {}", error.message),
            ));
        }
        self.decide(error, state)
    }

    fn transient(&self, state: &mut RetryState) -> Decision {
        state.transient_streak += 1;
        if state.transient_streak <= self.transient_budget {
            short_wait(Resume::Attempt)
        } else {
            state.transient_streak = 0;
            short_wait(Resume::Search)
        }
    }
}

fn short_wait(resume: Resume) -> Decision {
    Decision::Wait {
        pacing: Pacing::Short,
        resume,
        invalidate_session: false,
    }
}

/// Turns a raw gamma sample into a wait: `(sample + floor) * multiplier`.
///
/// Negative, NaN and infinite samples count as zero, so the result is never
/// below the floor.
pub fn interval_from_sample(sample: f64, floor_secs: f64, multiplier: f64) -> Duration {
    let sample = if sample.is_finite() { sample.max(0.0) } else { 0.0 };
    let floor_secs = floor_secs.max(0.0);
    let secs = (sample + floor_secs) * multiplier.max(1.0);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs_f64(floor_secs))
}
