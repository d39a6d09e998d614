use std::collections::HashMap;
use std::fmt;

use crate::scrape::{sample_value, MetricFamily};

/// A named, deterministic predicate over one scraped snapshot. The `Display`
/// impl is the check's stable name, used in test failure output. Checks are
/// pure; any number of them may run against the same snapshot.
pub trait MetricFamiliesChecker: fmt::Display {
    /// Pass/fail plus a diagnostic message. Empty message on pass.
    fn check(&self, families: &HashMap<String, MetricFamily>) -> (bool, String);
}

/// Passes when the family exists and, if an expected value was given, carries
/// at least one sample with exactly that value.
pub struct HasMetric {
    family: String,
    value: Option<f64>,
}

impl HasMetric {
    pub fn present(family: impl Into<String>) -> Self {
        HasMetric { family: family.into(), value: None }
    }

    pub fn with_value(family: impl Into<String>, value: f64) -> Self {
        HasMetric { family: family.into(), value: Some(value) }
    }
}

impl fmt::Display for HasMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "has_{}_metric", self.family)
    }
}

impl MetricFamiliesChecker for HasMetric {
    fn check(&self, families: &HashMap<String, MetricFamily>) -> (bool, String) {
        let family = families.get(&self.family);
        match self.value {
            None => match family {
                Some(_) => (true, String::new()),
                None => (false, format!("metric '{}' missing", self.family)),
            },
            Some(want) => {
                let hit = family.is_some_and(|f| {
                    f.samples.iter().any(|s| sample_value(&s.value) == Some(want))
                });
                if hit {
                    (true, String::new())
                } else {
                    (false, format!("metric '{}' missing or != {}", self.family, want))
                }
            }
        }
    }
}

/// Passes when some sample in the family has a value strictly above `min`.
pub struct SampleAbove {
    family: String,
    min: f64,
}

impl SampleAbove {
    pub fn new(family: impl Into<String>, min: f64) -> Self {
        SampleAbove { family: family.into(), min }
    }
}

impl fmt::Display for SampleAbove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_above_{}", self.family, self.min)
    }
}

impl MetricFamiliesChecker for SampleAbove {
    fn check(&self, families: &HashMap<String, MetricFamily>) -> (bool, String) {
        let Some(family) = families.get(&self.family) else {
            return (
                false,
                format!(
                    "expected metric '{}' to be present with value > {}, got absent",
                    self.family, self.min
                ),
            );
        };

        let max = family
            .samples
            .iter()
            .filter_map(|s| sample_value(&s.value))
            .fold(f64::NEG_INFINITY, f64::max);

        if max > self.min {
            (true, String::new())
        } else {
            (
                false,
                format!(
                    "expected metric '{}' to have a value > {}, got max {}",
                    self.family, self.min, max
                ),
            )
        }
    }
}
