//! Node pool configuration
//!
//! Built once at process start and shared by reference with the watcher,
//! driver and reconciler. Nothing in the core reads the environment.

use std::net::SocketAddr;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ConfigError;
use crate::filter::LabelPredicate;

pub const DEFAULT_NODE_KEY: &str = "sip";
pub const DEFAULT_NODE_VAL: &str = "proxy";
pub const DEFAULT_COUNT: usize = 2;
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(120);

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

lazy_static! {
    /// Name segment of a label key, and the shape of a non-empty label value
    static ref LABEL_NAME_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").unwrap();

    /// Optional DNS subdomain prefix of a label key
    static ref LABEL_PREFIX_PATTERN: Regex =
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap();
}

/// Immutable controller configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePoolConfig {
    /// Label that marks a node as a pool member
    pub label: LabelPredicate,

    /// Restricts the node universe the reconciler may consider
    pub filter: Option<LabelPredicate>,

    /// Target number of member nodes within the filtered universe
    pub desired_count: usize,

    /// Period of the timer branch of the driver loop
    pub check_interval: Duration,

    /// Listen address of the health server; `None` disables it
    pub health_addr: Option<SocketAddr>,
}

impl Default for NodePoolConfig {
    fn default() -> Self {
        Self {
            label: LabelPredicate::new(DEFAULT_NODE_KEY, DEFAULT_NODE_VAL),
            filter: None,
            desired_count: DEFAULT_COUNT,
            check_interval: DEFAULT_CHECK_INTERVAL,
            health_addr: None,
        }
    }
}

impl NodePoolConfig {
    #[must_use]
    pub fn new(label: LabelPredicate, desired_count: usize) -> Self {
        Self {
            label,
            desired_count,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Option<LabelPredicate>) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    #[must_use]
    pub fn with_health_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.health_addr = addr;
        self
    }

    /// Label selector handed to the node list call, if a filter is set.
    pub fn list_selector(&self) -> Option<String> {
        self.filter.as_ref().map(LabelPredicate::selector)
    }

    /// Validate label syntax and timing settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_label_key("managed", &self.label.key)?;
        validate_label_value("managed", &self.label.value)?;

        if let Some(filter) = &self.filter {
            validate_label_key("filter", &filter.key)?;
            validate_label_value("filter", &filter.value)?;
            if filter.key == self.label.key {
                return Err(ConfigError::FilterUsesManagedKey {
                    key: filter.key.clone(),
                });
            }
        }

        if self.check_interval.is_zero() {
            return Err(ConfigError::ZeroCheckInterval);
        }

        Ok(())
    }
}

fn validate_label_key(field: &'static str, key: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidLabelKey {
        field,
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN {
            return Err(invalid("prefix must be 1-253 characters"));
        }
        if !LABEL_PREFIX_PATTERN.is_match(prefix) {
            return Err(invalid("prefix must be a DNS subdomain"));
        }
    }

    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(invalid("name must be 1-63 characters"));
    }
    if !LABEL_NAME_PATTERN.is_match(name) {
        return Err(invalid(
            "name must be alphanumeric, '-', '_' or '.', starting and ending alphanumeric",
        ));
    }

    Ok(())
}

fn validate_label_value(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Ok(());
    }

    let invalid = |reason: &str| ConfigError::InvalidLabelValue {
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value.len() > MAX_NAME_LEN {
        return Err(invalid("must be at most 63 characters"));
    }
    if !LABEL_NAME_PATTERN.is_match(value) {
        return Err(invalid(
            "must be alphanumeric, '-', '_' or '.', starting and ending alphanumeric",
        ));
    }

    Ok(())
}
