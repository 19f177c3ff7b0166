use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Chain time with one second resolution.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimePointSec(u32);

impl TimePointSec {
    pub const fn new(secs: u32) -> Self {
        Self(secs)
    }

    pub fn now() -> Self {
        let secs = Utc::now().timestamp().clamp(0, i64::from(u32::MAX));
        Self(secs as u32)
    }

    pub fn secs(&self) -> u32 {
        self.0
    }

    pub fn saturating_sub(self, secs: u32) -> Self {
        Self(self.0.saturating_sub(secs))
    }
}

impl Add<u32> for TimePointSec {
    type Output = TimePointSec;

    fn add(self, secs: u32) -> Self::Output {
        Self(self.0.saturating_add(secs))
    }
}

impl Sub for TimePointSec {
    type Output = i64;

    fn sub(self, other: TimePointSec) -> Self::Output {
        i64::from(self.0) - i64::from(other.0)
    }
}

impl Display for TimePointSec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match Utc.timestamp_opt(i64::from(self.0), 0).single() {
            Some(time) => write!(f, "{}", time.format("%Y-%m-%dT%H:%M:%S")),
            None => write!(f, "{}", self.0),
        }
    }
}
