//! Tree configuration.
//!
//! A [`Config`] is validated when it is built, so a tree never sees an
//! unusable capacity.

use std::env;

use crate::error::ConfigError;

/// Environment variable read by [`Config::from_env`] for the node capacity.
pub const CAPACITY_ENV: &str = "BSLACK_NODE_CAPACITY";

/// Environment variable read by [`Config::from_env`] for the slack policy.
pub const EXTRA_SLACK_ENV: &str = "BSLACK_EXTRA_SLACK";

/// Construction-time parameters of a [`BSlackTree`](crate::BSlackTree).
///
/// ```rust
/// use bslack::Config;
///
/// let config = Config::new(8).unwrap().with_extra_slack(false).unwrap();
/// assert_eq!(config.capacity(), 8);
/// assert!(!config.allow_extra_slack());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    capacity: usize,
    allow_extra_slack: bool,
}

impl Config {
    /// Default node capacity `b`.
    pub const DEFAULT_CAPACITY: usize = 16;

    /// Smallest capacity accepted when extra slack is disabled.
    pub const MIN_CAPACITY: usize = 3;

    /// Smallest capacity accepted when extra slack is enabled.
    ///
    /// Each rebuilt internal node then holds at most `b - 1` children, and
    /// it must still be able to hold two after an even repartition.
    pub const MIN_CAPACITY_EXTRA_SLACK: usize = 4;

    /// Create a configuration with capacity `b` and extra slack enabled.
    ///
    /// # Errors
    ///
    /// [`ConfigError::CapacityTooSmall`] if `capacity` is below
    /// [`Self::MIN_CAPACITY_EXTRA_SLACK`].
    pub const fn new(capacity: usize) -> Result<Self, ConfigError> {
        Self::build(capacity, true)
    }

    /// Create a configuration with capacity `b` and an explicit slack policy.
    ///
    /// This is the only way to reach [`Self::MIN_CAPACITY`], since
    /// [`Self::new`] validates against the extra-slack minimum.
    ///
    /// ```rust
    /// use bslack::Config;
    ///
    /// let strict = Config::with_policy(3, false).unwrap();
    /// assert_eq!(strict.capacity(), 3);
    /// assert!(Config::with_policy(3, true).is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// [`ConfigError::CapacityTooSmall`] if `capacity` is below the minimum
    /// for `allow_extra_slack`.
    pub const fn with_policy(
        capacity: usize,
        allow_extra_slack: bool,
    ) -> Result<Self, ConfigError> {
        Self::build(capacity, allow_extra_slack)
    }

    /// Return this configuration with the extra-slack policy changed.
    ///
    /// Allowing one extra unit of slack per child makes rebalancing cheaper
    /// on average at the cost of a lower average fan-out.
    ///
    /// # Errors
    ///
    /// [`ConfigError::CapacityTooSmall`] if the capacity is too small for
    /// the requested policy.
    pub const fn with_extra_slack(self, allow: bool) -> Result<Self, ConfigError> {
        Self::build(self.capacity, allow)
    }

    /// Load a configuration from `BSLACK_NODE_CAPACITY` and
    /// `BSLACK_EXTRA_SLACK`, using defaults for unset variables.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidEnv`] for unparsable values, or
    /// [`ConfigError::CapacityTooSmall`] for a capacity below the minimum.
    pub fn from_env() -> Result<Self, ConfigError> {
        let capacity = match env::var(CAPACITY_ENV) {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: CAPACITY_ENV,
                    value: raw,
                })?,
            Err(_) => Self::DEFAULT_CAPACITY,
        };

        let allow_extra_slack = match env::var(EXTRA_SLACK_ENV) {
            Ok(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidEnv {
                var: EXTRA_SLACK_ENV,
                value: raw,
            })?,
            Err(_) => true,
        };

        Self::build(capacity, allow_extra_slack)
    }

    /// Node capacity `b`: maximum keys per leaf, maximum children per internal node.
    #[must_use]
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether one extra unit of slack per child is tolerated.
    #[must_use]
    #[inline]
    pub const fn allow_extra_slack(&self) -> bool {
        self.allow_extra_slack
    }

    /// Smallest total slack across `children` siblings that counts as a
    /// slack violation.
    #[must_use]
    #[inline]
    pub const fn slack_limit(&self, children: usize) -> usize {
        if self.allow_extra_slack {
            self.capacity + children
        } else {
            self.capacity
        }
    }

    /// Number of nodes needed to hold `total` entries after a repartition.
    #[must_use]
    #[inline]
    pub(crate) const fn nodes_needed(&self, total: usize) -> usize {
        let per_node = if self.allow_extra_slack {
            self.capacity - 1
        } else {
            self.capacity
        };
        let n = total.div_ceil(per_node);
        if n == 0 { 1 } else { n }
    }

    const fn build(capacity: usize, allow_extra_slack: bool) -> Result<Self, ConfigError> {
        let minimum = if allow_extra_slack {
            Self::MIN_CAPACITY_EXTRA_SLACK
        } else {
            Self::MIN_CAPACITY
        };
        if capacity < minimum {
            return Err(ConfigError::CapacityTooSmall { capacity, minimum });
        }
        Ok(Self {
            capacity,
            allow_extra_slack,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            allow_extra_slack: true,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.capacity(), 16);
        assert!(config.allow_extra_slack());
    }

    #[test]
    fn test_minimum_capacity() {
        assert_eq!(
            Config::new(3),
            Err(ConfigError::CapacityTooSmall {
                capacity: 3,
                minimum: 4
            })
        );
        assert!(Config::new(4).is_ok());

        let err = Config::new(4)
            .and_then(|c| c.with_extra_slack(false))
            .map(|c| c.capacity());
        assert_eq!(err, Ok(4));

        let three = Config::with_policy(3, false).unwrap();
        assert_eq!(three.capacity(), 3);
        assert!(!three.allow_extra_slack());
        assert_eq!(
            Config::with_policy(2, false),
            Err(ConfigError::CapacityTooSmall {
                capacity: 2,
                minimum: 3
            })
        );
        assert!(three.with_extra_slack(true).is_err());
    }

    #[test]
    fn test_slack_limit() {
        let extra = Config::new(16).unwrap();
        assert_eq!(extra.slack_limit(3), 19);

        let strict = extra.with_extra_slack(false).unwrap();
        assert_eq!(strict.slack_limit(3), 16);
    }

    #[test]
    fn test_nodes_needed() {
        let extra = Config::new(4).unwrap();
        assert_eq!(extra.nodes_needed(0), 1);
        assert_eq!(extra.nodes_needed(3), 1);
        assert_eq!(extra.nodes_needed(4), 2);
        assert_eq!(extra.nodes_needed(7), 3);

        let strict = extra.with_extra_slack(false).unwrap();
        assert_eq!(strict.nodes_needed(4), 1);
        assert_eq!(strict.nodes_needed(5), 2);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
