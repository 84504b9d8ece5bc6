//! Alert rules and transition-predicate evaluation.
//!
//! Rules are plain immutable data loaded once at startup: each alert type
//! has a create predicate and, optionally, a close predicate. Evaluating a
//! predicate against an event is pure and stateless; the table never
//! arbitrates between rules, so one event may open several alert types on
//! the same device at once.

use std::collections::HashMap;

use regex::Regex;

use crate::error::{Error, Result};
use crate::types::Event;

/// A regex predicate over a telemetry `(key, value)` pair.
///
/// All present components must hold; an absent component is vacuously
/// satisfied.
#[derive(Debug, Clone, Default)]
pub struct TransitionPredicate {
    /// The key must match this pattern.
    pub key_matches: Option<Regex>,
    /// The key must not match this pattern.
    pub key_does_not_match: Option<Regex>,
    /// The value must match this pattern.
    pub value_matches: Option<Regex>,
    /// The value must not match this pattern.
    pub value_does_not_match: Option<Regex>,
}

impl TransitionPredicate {
    /// Creates an empty predicate that matches every event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the key to match `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRule` if the pattern is not a valid regex.
    pub fn key_matches(mut self, pattern: &str) -> Result<Self> {
        self.key_matches = Some(compile(pattern)?);
        Ok(self)
    }

    /// Requires the key to not match `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRule` if the pattern is not a valid regex.
    pub fn key_does_not_match(mut self, pattern: &str) -> Result<Self> {
        self.key_does_not_match = Some(compile(pattern)?);
        Ok(self)
    }

    /// Requires the value to match `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRule` if the pattern is not a valid regex.
    pub fn value_matches(mut self, pattern: &str) -> Result<Self> {
        self.value_matches = Some(compile(pattern)?);
        Ok(self)
    }

    /// Requires the value to not match `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRule` if the pattern is not a valid regex.
    pub fn value_does_not_match(mut self, pattern: &str) -> Result<Self> {
        self.value_does_not_match = Some(compile(pattern)?);
        Ok(self)
    }

    /// Evaluates the predicate against a `(key, value)` pair.
    #[must_use]
    pub fn matches(&self, key: &str, value: &str) -> bool {
        if let Some(re) = &self.key_matches {
            if !re.is_match(key) {
                return false;
            }
        }
        if let Some(re) = &self.key_does_not_match {
            if re.is_match(key) {
                return false;
            }
        }
        if let Some(re) = &self.value_matches {
            if !re.is_match(value) {
                return false;
            }
        }
        if let Some(re) = &self.value_does_not_match {
            if re.is_match(value) {
                return false;
            }
        }
        true
    }

    /// Evaluates the predicate against an event's key and value.
    #[must_use]
    pub fn matches_event(&self, event: &Event) -> bool {
        self.matches(&event.key, &event.value)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::InvalidRule {
        reason: format!("invalid pattern {pattern:?}: {e}"),
    })
}

/// The create/close rule for one alert type.
#[derive(Debug, Clone)]
pub struct AlertRule {
    /// Predicate that opens an alert of this type.
    pub create: TransitionPredicate,
    /// Predicate that closes an alert of this type.
    ///
    /// Absent for alert types that can only be closed administratively or
    /// by state reconciliation.
    pub close: Option<TransitionPredicate>,
}

/// Immutable mapping of alert type name to rule, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<String, AlertRule>,
}

impl RuleTable {
    /// Creates a table from an explicit rule map.
    #[must_use]
    pub fn new(rules: HashMap<String, AlertRule>) -> Self {
        Self { rules }
    }

    /// Returns the rule for an alert type, if one is configured.
    #[must_use]
    pub fn get(&self, alert_type: &str) -> Option<&AlertRule> {
        self.rules.get(alert_type)
    }

    /// Iterates over `(alert type, rule)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AlertRule)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of configured rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if no rules are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The production rule set for the AV fleet.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRule` if any built-in pattern fails to
    /// compile.
    pub fn standard() -> Result<Self> {
        let mut rules = HashMap::new();

        rules.insert(
            "cpu-temperature".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("thermal0-temp")?
                    .value_matches(r"^([8-9][0-9]|[1-9][0-9]{2,})(\.[0-9]*)*$")?,
                close: Some(
                    TransitionPredicate::new()
                        .key_matches("thermal0-temp")?
                        .value_matches(r"^0*([0-9]|[1-6][0-9])(\.[0-9]*)*$")?,
                ),
            },
        );

        rules.insert(
            "device-comm".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("^responsive$")?
                    .value_does_not_match("^Ok$")?,
                close: Some(
                    TransitionPredicate::new()
                        .key_matches("^responsive$")?
                        .value_matches("^Ok$")?,
                ),
            },
        );

        rules.insert(
            "device-offline".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("^online$")?
                    .value_does_not_match("^Online$")?,
                close: Some(
                    TransitionPredicate::new()
                        .key_matches("^online$")?
                        .value_matches("^Online$")?,
                ),
            },
        );

        rules.insert(
            "lamp-warning".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("status-message")?
                    .value_matches("(?i)WARNING|Communication|AROUND LAMP TEMPERATURE")?,
                close: Some(
                    TransitionPredicate::new()
                        .key_matches("status-message")?
                        .value_matches("NO ERRORS|Normal")?,
                ),
            },
        );

        rules.insert(
            "memory-usage".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("^v-mem-used-percent$")?
                    .value_matches("^([9][0-9]|[1-9][0-9]{2,})$")?,
                close: Some(
                    TransitionPredicate::new()
                        .key_matches("^v-mem-used-percent$")?
                        .value_matches(r"^0*([0-9]|[1-8][0-9])\.")?,
                ),
            },
        );

        rules.insert(
            "shutter-error".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("status-message")?
                    .value_matches("SHUTTER ERROR")?,
                close: Some(
                    TransitionPredicate::new()
                        .key_matches("status-message")?
                        .value_matches("NO ERRORS")?,
                ),
            },
        );

        rules.insert(
            "touchpanel-offline".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("^tp_online$")?
                    .value_does_not_match("^Online$")?,
                close: Some(
                    TransitionPredicate::new()
                        .key_matches("^tp_online$")?
                        .value_matches("^Online$")?,
                ),
            },
        );

        rules.insert(
            "receiver".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("mic-alerting")?
                    .value_does_not_match("Okay")?,
                close: Some(
                    TransitionPredicate::new()
                        .key_matches("mic-alerting")?
                        .value_matches("Okay")?,
                ),
            },
        );

        // help-request has no close transition: a help request can only be
        // resolved by an operator.
        rules.insert(
            "help-request".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("help-request")?
                    .value_matches("confirm")?,
                close: None,
            },
        );

        rules.insert(
            "mic-battery 180 min".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("battery-charge-minutes")?
                    .value_matches("^0*(1[2-7][1-9]|1[3-8]0)$")?,
                close: Some(
                    TransitionPredicate::new()
                        .key_matches("battery-charge-minutes")?
                        .value_matches(
                            "^0*([1-9][0-9]{3,}|[2-9][0-9]{2,}|1[8-9][1-9]|190|1[0-1][0-9]|120|[0-9]{1,2})$",
                        )?,
                ),
            },
        );

        rules.insert(
            "mic-battery 120 min".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("battery-charge-minutes")?
                    .value_matches("^0*(9[1-9]|1[0-1][0-9]|120)$")?,
                close: Some(
                    TransitionPredicate::new()
                        .key_matches("battery-charge-minutes")?
                        .value_matches(
                            "^0*([1-9][0-9]{3,}|[2-9][0-9]{2,}|1[2-9][1-9]|1[3-9]0|[0-9]|[1-8][0-9]|90)$",
                        )?,
                ),
            },
        );

        rules.insert(
            "mic-battery 90 min".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("battery-charge-minutes")?
                    .value_matches("^0*([6-8][1-9]|[7-9]0)$")?,
                close: Some(
                    TransitionPredicate::new()
                        .key_matches("battery-charge-minutes")?
                        .value_matches("^0*([1-9][0-9]{2,}|9[1-9]|[0-9]|[1-5][0-9]|60)$")?,
                ),
            },
        );

        rules.insert(
            "mic-battery 60 min".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("battery-charge-minutes")?
                    .value_matches("^0*([3-5][1-9]|[4-6]0)$")?,
                close: Some(
                    TransitionPredicate::new()
                        .key_matches("battery-charge-minutes")?
                        .value_matches("^0*([1-9][0-9]{2,}|[6-9][1-9]|[7-9]0|[0-9]|[1-2][0-9]|30)$")?,
                ),
            },
        );

        rules.insert(
            "mic-battery 30 min".to_string(),
            AlertRule {
                create: TransitionPredicate::new()
                    .key_matches("battery-charge-minutes")?
                    .value_matches("^0*([0-2][0-9]|[0-9]|30)$")?,
                close: Some(
                    TransitionPredicate::new()
                        .key_matches("battery-charge-minutes")?
                        .value_matches("^0*([1-9][0-9]{2,}|[4-9]0|[3-9][1-9])$")?,
                ),
            },
        );

        Ok(Self { rules })
    }
}
