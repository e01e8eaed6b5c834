use std::io;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::info;

pub mod status;
pub mod udp;

/// Wall clock timestamps before this are from a clock that has never been set.
pub const MIN_VALID_TIME: u64 = 1651955510;

const MICROS_PER_SEC: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct WallTime {
    pub secs: u64,
    pub usecs: u32,
}

impl WallTime {
    /// Builds a normalised time, excess microseconds carry into seconds.
    pub fn new(secs: u64, usecs: u64) -> Self {
        return WallTime {
            secs: secs + usecs / MICROS_PER_SEC,
            usecs: (usecs % MICROS_PER_SEC) as u32,
        };
    }

    pub fn from_micros(micros: u64) -> Self {
        return WallTime::new(0, micros);
    }

    pub fn as_micros(&self) -> u64 {
        return self.secs * MICROS_PER_SEC + self.usecs as u64;
    }

    pub fn is_valid(&self) -> bool {
        return self.secs > MIN_VALID_TIME;
    }

    pub fn add(&self, duration: Duration) -> Self {
        return WallTime::new(self.secs + duration.as_secs(), self.usecs as u64 + duration.subsec_micros() as u64);
    }

    /// Time left until the next whole second.
    pub fn until_next_second(&self) -> Duration {
        return Duration::from_micros(MICROS_PER_SEC - self.usecs as u64);
    }
}

/// Datagram transport towards the collector.
pub trait DatagramLink {
    fn is_up(&self) -> bool;

    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Returns `None` when nothing is waiting.
    fn try_receive(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Local time sources: a monotonic uptime and a settable wall clock.
pub trait Clock {
    fn uptime(&self) -> Duration;

    fn now(&self) -> WallTime;

    fn set(&mut self, time: WallTime);
}

/// Host clock adjusted in software, setting it never touches the system time.
pub struct SystemClock {
    start: Instant,
    offset_us: i128,
}

impl SystemClock {
    pub fn new() -> Self {
        return SystemClock {
            start: Instant::now(),
            offset_us: 0,
        };
    }

    fn system_micros() -> i128 {
        return match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_micros() as i128,
            Err(_) => 0,
        };
    }
}

impl Clock for SystemClock {
    fn uptime(&self) -> Duration {
        return self.start.elapsed();
    }

    fn now(&self) -> WallTime {
        let micros = SystemClock::system_micros() + self.offset_us;
        return WallTime::from_micros(micros.max(0) as u64);
    }

    fn set(&mut self, time: WallTime) {
        let previous = self.now();
        self.offset_us = time.as_micros() as i128 - SystemClock::system_micros();

        if !previous.is_valid() {
            info!("Clock set to {}.{:06}", time.secs, time.usecs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_time_normalises() {
        let t = WallTime::new(10, 2_500_000);
        assert_eq!(t, WallTime { secs: 12, usecs: 500_000 });
        assert_eq!(t.as_micros(), 12_500_000);
        assert_eq!(t.add(Duration::from_micros(600_000)), WallTime { secs: 13, usecs: 100_000 });
    }

    #[test]
    fn test_wall_time_validity() {
        assert!(!WallTime::new(0, 0).is_valid());
        assert!(!WallTime::new(MIN_VALID_TIME, 999_999).is_valid());
        assert!(WallTime::new(MIN_VALID_TIME + 1, 0).is_valid());
    }

    #[test]
    fn test_until_next_second() {
        assert_eq!(WallTime::new(5, 250_000).until_next_second(), Duration::from_millis(750));
        assert_eq!(WallTime::new(5, 0).until_next_second(), Duration::from_secs(1));
    }

    #[test]
    fn test_system_clock_set() {
        let mut clock = SystemClock::new();
        clock.set(WallTime::new(2_000_000_000, 0));

        let now = clock.now();
        assert!(now.secs >= 2_000_000_000 && now.secs < 2_000_000_010);

        clock.set(WallTime::new(1000, 0));
        assert!(!clock.now().is_valid());
    }
}
