use chrono::{Local, Timelike};

use crate::errors::ConfigError;

/// Source of the current local hour.
pub trait Clock: Send + Sync {
    fn current_hour(&self) -> u32;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn current_hour(&self) -> u32 {
        Local::now().hour()
    }
}

/// Daily sending window, inclusive on both ends.
///
/// `start > end` wraps midnight (`22..=6`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkingHours {
    pub start: u32,
    pub end: u32,
}

impl WorkingHours {
    /// Empty range means no restriction.
    pub fn parse(range: &[u32]) -> Result<Option<Self>, ConfigError> {
        match range {
            [] => Ok(None),
            [start, end] => {
                for h in [start, end] {
                    if *h > 23 {
                        return Err(ConfigError::WorkingHours(format!(
                            "hour {h} is outside 0..=23"
                        )));
                    }
                }
                Ok(Some(Self {
                    start: *start,
                    end: *end,
                }))
            }
            other => Err(ConfigError::WorkingHours(format!(
                "expected [start, end], got {} values",
                other.len()
            ))),
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            (self.start..=self.end).contains(&hour)
        } else {
            hour >= self.start || hour <= self.end
        }
    }
}
