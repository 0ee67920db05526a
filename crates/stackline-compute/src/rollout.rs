//! Revision rollout model.
//!
//! The deployment controller that replaces running tasks lives outside
//! this workspace. This module captures the contract the service is
//! configured with: how health-check observations move a new revision
//! from `Pending` through `Ramping` to `Steady`, and when the controller
//! must revert to the last stable revision instead.
//!
//! A revision has proven itself after `healthy_threshold` consecutive
//! healthy checks. It has failed after `unhealthy_threshold` consecutive
//! failed checks, or when the bake window of
//! `healthy_threshold + unhealthy_threshold` checks ends without it
//! becoming steady.

use std::fmt;
use std::time::Duration;

use stackline_common::error::{Result, StacklineError};
use stackline_common::types::Sha256Hash;

use crate::health::HealthCheck;

/// A task definition revision together with the count it runs at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Fingerprint of the task definition.
    pub fingerprint: Sha256Hash,
    /// Number of tasks the service keeps running.
    pub desired_count: u32,
}

/// Lifecycle state of a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RolloutState {
    /// The new revision has been registered but not started.
    Pending,
    /// Tasks of the new revision are running and being checked.
    Ramping,
    /// The new revision proved healthy and is now the stable revision.
    Steady,
    /// The new revision failed; the previous stable revision was restored.
    RolledBack,
    /// The new revision failed and nothing could be restored.
    Failed,
}

impl RolloutState {
    /// Returns whether no further observation changes the state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Steady | Self::RolledBack | Self::Failed)
    }
}

impl fmt::Display for RolloutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ramping => write!(f, "ramping"),
            Self::Steady => write!(f, "steady"),
            Self::RolledBack => write!(f, "rolled back"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Replacement of the stable revision by a new one.
#[derive(Debug, Clone)]
pub struct Rollout {
    check: HealthCheck,
    rollback: bool,
    previous: Option<Revision>,
    target: Revision,
    active: Option<Revision>,
    state: RolloutState,
    checks: u32,
    consecutive_healthy: u32,
    consecutive_unhealthy: u32,
}

impl Rollout {
    /// Creates a pending rollout of `target` over `previous`.
    #[must_use]
    pub fn new(
        check: HealthCheck,
        rollback: bool,
        previous: Option<Revision>,
        target: Revision,
    ) -> Self {
        Self {
            check,
            rollback,
            active: previous.clone(),
            previous,
            target,
            state: RolloutState::Pending,
            checks: 0,
            consecutive_healthy: 0,
            consecutive_unhealthy: 0,
        }
    }

    /// Starts the new revision's tasks, transitioning to `Ramping`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollout has already started.
    pub fn start(&mut self) -> Result<()> {
        if self.state != RolloutState::Pending {
            return Err(StacklineError::ordering(format!(
                "rollout of {} is already {}",
                self.target.fingerprint.short(12),
                self.state
            )));
        }
        self.active = Some(self.target.clone());
        self.state = RolloutState::Ramping;
        tracing::info!(
            revision = %self.target.fingerprint.short(12),
            desired = self.target.desired_count,
            "rollout started"
        );
        Ok(())
    }

    /// Feeds one health-check result; `None` is a timed-out check.
    ///
    /// Observations after a terminal state are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollout has not started.
    pub fn observe(&mut self, status: Option<u16>) -> Result<RolloutState> {
        match self.state {
            RolloutState::Pending => {
                return Err(StacklineError::ordering(
                    "health observed before the rollout started",
                ));
            }
            state if state.is_terminal() => return Ok(state),
            _ => {}
        }

        self.checks += 1;
        if status.is_some_and(|code| self.check.matcher.matches(code)) {
            self.consecutive_healthy += 1;
            self.consecutive_unhealthy = 0;
        } else {
            self.consecutive_unhealthy += 1;
            self.consecutive_healthy = 0;
        }
        tracing::debug!(
            check = self.checks,
            status = ?status,
            healthy = self.consecutive_healthy,
            unhealthy = self.consecutive_unhealthy,
            "health observed"
        );

        if self.consecutive_healthy >= self.check.healthy_threshold {
            self.state = RolloutState::Steady;
            tracing::info!(revision = %self.target.fingerprint.short(12), "rollout steady");
        } else if self.consecutive_unhealthy >= self.check.unhealthy_threshold
            || self.checks >= self.window_checks()
        {
            self.fail();
        }
        Ok(self.state)
    }

    fn fail(&mut self) {
        match (&self.previous, self.rollback) {
            (Some(previous), true) => {
                self.active = Some(previous.clone());
                self.state = RolloutState::RolledBack;
                tracing::warn!(
                    failed = %self.target.fingerprint.short(12),
                    restored = %previous.fingerprint.short(12),
                    desired = previous.desired_count,
                    "rollout rolled back"
                );
            }
            _ => {
                self.state = RolloutState::Failed;
                tracing::error!(
                    revision = %self.target.fingerprint.short(12),
                    "rollout failed with no stable revision to restore"
                );
            }
        }
    }

    const fn window_checks(&self) -> u32 {
        self.check.healthy_threshold + self.check.unhealthy_threshold
    }

    /// Longest time the new revision gets to become steady: long enough to
    /// prove healthy or to be declared unhealthy.
    #[must_use]
    pub fn bake_window(&self) -> Duration {
        self.check.time_to_healthy() + self.check.time_to_unhealthy()
    }

    /// Time spent ramping so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.check.interval * self.checks
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> RolloutState {
        self.state
    }

    /// Returns the revision currently serving, if any.
    #[must_use]
    pub const fn active(&self) -> Option<&Revision> {
        self.active.as_ref()
    }

    /// Returns the count of tasks the service currently keeps running.
    #[must_use]
    pub fn desired_count(&self) -> u32 {
        self.active.as_ref().map_or(0, |r| r.desired_count)
    }
}

#[cfg(test)]
mod tests {
    use stackline_common::config::HealthCheckConfig;

    use super::*;

    fn check() -> HealthCheck {
        HealthCheck::from_config(&HealthCheckConfig::default()).expect("valid")
    }

    fn revision(seed: u8, desired_count: u32) -> Revision {
        Revision {
            fingerprint: Sha256Hash::from_bytes(&[seed; 32]),
            desired_count,
        }
    }

    #[test]
    fn healthy_revision_becomes_steady_after_threshold() {
        let mut rollout = Rollout::new(check(), true, Some(revision(1, 1)), revision(2, 3));
        assert_eq!(rollout.state(), RolloutState::Pending);
        rollout.start().expect("start");
        assert_eq!(rollout.desired_count(), 3);
        assert_eq!(rollout.observe(Some(307)).expect("obs"), RolloutState::Ramping);
        assert_eq!(rollout.observe(Some(307)).expect("obs"), RolloutState::Steady);
        assert_eq!(rollout.active(), Some(&revision(2, 3)));
        assert_eq!(rollout.elapsed(), Duration::from_secs(60));
    }

    #[test]
    fn failing_revision_rolls_back_to_previous_count() {
        let mut rollout = Rollout::new(check(), true, Some(revision(1, 1)), revision(2, 4));
        rollout.start().expect("start");
        assert_eq!(rollout.observe(Some(200)).expect("obs"), RolloutState::Ramping);
        assert_eq!(rollout.observe(None).expect("obs"), RolloutState::RolledBack);
        assert_eq!(rollout.active(), Some(&revision(1, 1)));
        assert_eq!(rollout.desired_count(), 1);
        // Terminal states ignore later observations.
        assert_eq!(rollout.observe(Some(307)).expect("obs"), RolloutState::RolledBack);
    }

    #[test]
    fn flapping_revision_fails_when_bake_window_closes() {
        let mut rollout = Rollout::new(check(), true, Some(revision(1, 1)), revision(2, 1));
        rollout.start().expect("start");
        assert_eq!(rollout.bake_window(), Duration::from_secs(120));
        assert_eq!(rollout.bake_window(), check().interval * 4);
        for status in [Some(307), Some(500), Some(307)] {
            assert_eq!(rollout.observe(status).expect("obs"), RolloutState::Ramping);
        }
        assert_eq!(rollout.observe(Some(500)).expect("obs"), RolloutState::RolledBack);
    }

    #[test]
    fn first_deployment_failure_is_surfaced() {
        let mut rollout = Rollout::new(check(), true, None, revision(2, 1));
        rollout.start().expect("start");
        let _ = rollout.observe(None).expect("obs");
        assert_eq!(rollout.observe(None).expect("obs"), RolloutState::Failed);
    }

    #[test]
    fn disabled_rollback_is_surfaced_as_failure() {
        let mut rollout = Rollout::new(check(), false, Some(revision(1, 1)), revision(2, 1));
        rollout.start().expect("start");
        let _ = rollout.observe(Some(503)).expect("obs");
        assert_eq!(rollout.observe(Some(503)).expect("obs"), RolloutState::Failed);
    }

    #[test]
    fn observing_before_start_is_an_ordering_error() {
        let mut rollout = Rollout::new(check(), true, None, revision(2, 1));
        assert!(matches!(
            rollout.observe(Some(307)),
            Err(StacklineError::Ordering { .. })
        ));
        rollout.start().expect("start");
        assert!(rollout.start().is_err());
    }
}
