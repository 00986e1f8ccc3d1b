use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since the unix epoch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Unixtime(pub i64);

impl Unixtime {
    pub fn now() -> Unixtime {
        // A clock before 1970 is treated as 1970
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Unixtime(secs)
    }
}

impl Sub<Duration> for Unixtime {
    type Output = Unixtime;

    fn sub(self, rhs: Duration) -> Unixtime {
        Unixtime(self.0 - rhs.as_secs() as i64)
    }
}

impl Add<Duration> for Unixtime {
    type Output = Unixtime;

    fn add(self, rhs: Duration) -> Unixtime {
        Unixtime(self.0 + rhs.as_secs() as i64)
    }
}

impl Sub<Unixtime> for Unixtime {
    type Output = Duration;

    fn sub(self, rhs: Unixtime) -> Duration {
        Duration::from_secs((self.0 - rhs.0).max(0) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Freshness {
    NeverSought,
    Stale,
    Fresh,
}
