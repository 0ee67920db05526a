//! Target group health checks and the application contract they poll.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use serde_json::{Value, json};
use stackline_common::config::{AppContract, HealthCheckConfig};
use stackline_common::error::{Result, StacklineError};

/// Accepted threshold counts.
pub const THRESHOLD_RANGE: RangeInclusive<u32> = 2..=10;

/// Accepted check intervals in seconds.
pub const INTERVAL_RANGE: RangeInclusive<u32> = 5..=300;

/// Accepted check timeouts in seconds.
pub const TIMEOUT_RANGE: RangeInclusive<u32> = 2..=120;

/// The set of HTTP status codes counted as healthy.
///
/// Parsed from the matcher syntax used by target groups: a single code
/// (`"307"`), a range (`"200-299"`) or a comma separated list of either
/// (`"200,302"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCodeMatcher {
    ranges: Vec<RangeInclusive<u16>>,
}

impl HttpCodeMatcher {
    /// Returns whether `status` counts as healthy.
    #[must_use]
    pub fn matches(&self, status: u16) -> bool {
        self.ranges.iter().any(|r| r.contains(&status))
    }
}

fn parse_code(raw: &str, input: &str) -> Result<u16> {
    let code: u16 = raw
        .trim()
        .parse()
        .map_err(|_| StacklineError::config(format!("invalid status code in matcher \"{input}\"")))?;
    if !(200..=499).contains(&code) {
        return Err(StacklineError::config(format!(
            "status code {code} in matcher \"{input}\" outside 200..=499"
        )));
    }
    Ok(code)
}

impl FromStr for HttpCodeMatcher {
    type Err = StacklineError;

    fn from_str(s: &str) -> Result<Self> {
        let mut ranges = Vec::new();
        for part in s.split(',') {
            let range = match part.split_once('-') {
                Some((low, high)) => {
                    let (low, high) = (parse_code(low, s)?, parse_code(high, s)?);
                    if low > high {
                        return Err(StacklineError::config(format!(
                            "empty status range {low}-{high} in matcher \"{s}\""
                        )));
                    }
                    low..=high
                }
                None => {
                    let code = parse_code(part, s)?;
                    code..=code
                }
            };
            ranges.push(range);
        }
        Ok(Self { ranges })
    }
}

impl fmt::Display for HttpCodeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if range.start() == range.end() {
                write!(f, "{}", range.start())?;
            } else {
                write!(f, "{}-{}", range.start(), range.end())?;
            }
        }
        Ok(())
    }
}

/// A validated target group health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// Path polled on each target.
    pub path: String,
    /// Time between checks.
    pub interval: Duration,
    /// Time before a check counts as failed.
    pub timeout: Duration,
    /// Consecutive successes before a target is healthy.
    pub healthy_threshold: u32,
    /// Consecutive failures before a target is unhealthy.
    pub unhealthy_threshold: u32,
    /// Healthy status codes.
    pub matcher: HttpCodeMatcher,
}

impl HealthCheck {
    /// Validates a health-check configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the path is not absolute, a value
    /// is outside the accepted range, the interval does not exceed the
    /// timeout, or the matcher does not parse.
    pub fn from_config(config: &HealthCheckConfig) -> Result<Self> {
        if !config.path.starts_with('/') {
            return Err(StacklineError::config(format!(
                "health check path \"{}\" must start with '/'",
                config.path
            )));
        }
        for (name, value, range) in [
            ("interval", config.interval_secs, INTERVAL_RANGE),
            ("timeout", config.timeout_secs, TIMEOUT_RANGE),
            ("healthy threshold", config.healthy_threshold, THRESHOLD_RANGE),
            ("unhealthy threshold", config.unhealthy_threshold, THRESHOLD_RANGE),
        ] {
            if !range.contains(&value) {
                return Err(StacklineError::config(format!(
                    "health check {name} {value} outside {}..={}",
                    range.start(),
                    range.end()
                )));
            }
        }
        if config.interval_secs <= config.timeout_secs {
            return Err(StacklineError::config(format!(
                "health check interval {}s must exceed timeout {}s",
                config.interval_secs, config.timeout_secs
            )));
        }
        Ok(Self {
            path: config.path.clone(),
            interval: Duration::from_secs(u64::from(config.interval_secs)),
            timeout: Duration::from_secs(u64::from(config.timeout_secs)),
            healthy_threshold: config.healthy_threshold,
            unhealthy_threshold: config.unhealthy_threshold,
            matcher: config.healthy_http_codes.parse()?,
        })
    }

    /// Checks that the health check polls what the application serves.
    ///
    /// # Errors
    ///
    /// Returns an invariant error if the path differs from the application's
    /// liveness endpoint or the application's healthy status is not matched.
    pub fn verify_contract(&self, contract: &AppContract) -> Result<()> {
        if self.path != contract.health_path {
            return Err(StacklineError::invariant(
                "TargetGroup",
                format!(
                    "health check polls \"{}\" but the application serves liveness on \"{}\"",
                    self.path, contract.health_path
                ),
            ));
        }
        if !self.matcher.matches(contract.healthy_status) {
            return Err(StacklineError::invariant(
                "TargetGroup",
                format!(
                    "health check accepts \"{}\" but the application answers {} when healthy",
                    self.matcher, contract.healthy_status
                ),
            ));
        }
        Ok(())
    }

    /// Time a new target needs to prove healthy.
    #[must_use]
    pub fn time_to_healthy(&self) -> Duration {
        self.interval * self.healthy_threshold
    }

    /// Time a failing target needs to be declared unhealthy.
    #[must_use]
    pub fn time_to_unhealthy(&self) -> Duration {
        self.interval * self.unhealthy_threshold
    }

    /// Target group properties describing this check.
    #[must_use]
    pub fn target_group_properties(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("HealthCheckEnabled", json!(true)),
            ("HealthCheckPath", json!(self.path)),
            ("HealthCheckIntervalSeconds", json!(self.interval.as_secs())),
            ("HealthCheckTimeoutSeconds", json!(self.timeout.as_secs())),
            ("HealthyThresholdCount", json!(self.healthy_threshold)),
            ("UnhealthyThresholdCount", json!(self.unhealthy_threshold)),
            ("Matcher", json!({ "HttpCode": self.matcher.to_string() })),
        ]
    }
}
