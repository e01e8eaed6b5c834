use std::time::Duration;

use rand::RngCore;

pub const BLOCK_LEN: usize = 16;
pub const HMAC_LEN: usize = 32;
pub const PAYLOAD_LEN: usize = 23;
pub const RECORD_LEN: usize = 32;
pub const MAX_SAMPLES: usize = 40;

/// Padding block, token block and at least one block of data, then the HMAC.
pub const MIN_FRAME_LEN: usize = BLOCK_LEN * 3 + HMAC_LEN;

const _: () = assert!(RECORD_LEN % BLOCK_LEN == 0);
const _: () = assert!(4 + PAYLOAD_LEN + 3 + 2 == RECORD_LEN);

/// One buffered reading as it goes on the wire. All integers are big-endian.
///
/// ```text
/// 0      4                     27       30    32
/// | time | payload (23)        | uptime | rtt |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRecord {
    pub timestamp: u32,
    pub payload: [u8; PAYLOAD_LEN],
    /// Seconds, only the low 24 bits are sent
    pub uptime_secs: u32,
    /// Round trip time in units of 16µs
    pub rtt: u16,
}

impl Default for SampleRecord {
    fn default() -> Self {
        return SampleRecord {
            timestamp: 0,
            payload: [0; PAYLOAD_LEN],
            uptime_secs: 0,
            rtt: 0,
        };
    }
}

impl SampleRecord {
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut record = [0u8; RECORD_LEN];

        record[0..4].copy_from_slice(&self.timestamp.to_be_bytes());
        record[4..27].copy_from_slice(&self.payload);
        record[27..30].copy_from_slice(&self.uptime_secs.to_be_bytes()[1..4]);
        record[30..32].copy_from_slice(&self.rtt.to_be_bytes());

        return record;
    }

    pub fn decode(record: &[u8; RECORD_LEN]) -> Self {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&record[4..27]);

        return SampleRecord {
            timestamp: u32::from_be_bytes([record[0], record[1], record[2], record[3]]),
            payload,
            uptime_secs: u32::from_be_bytes([0, record[27], record[28], record[29]]),
            rtt: u16::from_be_bytes([record[30], record[31]]),
        };
    }
}

/// Pairs a reply with the transmission it answers.
///
/// The top bit of the first byte says who produced it: clear when generated here,
/// set in the copy the collector echoes back. After a successful send the local copy
/// is switched to the echoed form so a reply compares byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionToken {
    bytes: [u8; BLOCK_LEN],
    valid: bool,
}

impl SessionToken {
    pub const SERVER_TAG: u8 = 0x80;

    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; BLOCK_LEN];
        rng.fill_bytes(&mut bytes);
        bytes[0] &= !SessionToken::SERVER_TAG;

        return SessionToken { bytes, valid: false };
    }

    pub fn bytes(&self) -> &[u8; BLOCK_LEN] {
        return &self.bytes;
    }

    pub fn is_server_tagged(&self) -> bool {
        return self.bytes[0] & SessionToken::SERVER_TAG != 0;
    }

    pub fn is_valid(&self) -> bool {
        return self.valid;
    }

    pub fn mark_sent(&mut self) {
        self.bytes[0] |= SessionToken::SERVER_TAG;
        self.valid = true;
    }

    pub fn matches(&self, echo: &[u8]) -> bool {
        return self.valid && echo == &self.bytes[..];
    }

    pub fn consume(&mut self) {
        self.valid = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockSyncState {
    /// Uptime of the last complete transmission
    pub last_transmit: Duration,
    pub pending: bool,
}

impl ClockSyncState {
    pub const SYNCED_WINDOW: Duration = Duration::from_millis(100);
    pub const UNSYNCED_WINDOW: Duration = Duration::from_secs(1);

    pub fn window(clock_valid: bool) -> Duration {
        return match clock_valid {
            true => ClockSyncState::SYNCED_WINDOW,
            false => ClockSyncState::UNSYNCED_WINDOW,
        };
    }

    pub fn since_transmit(&self, uptime: Duration) -> Duration {
        return uptime.saturating_sub(self.last_transmit);
    }

    /// Stop accepting time from a reply that arrives after the window.
    pub fn expire(&mut self, uptime: Duration, clock_valid: bool) {
        if self.since_transmit(uptime) >= ClockSyncState::window(clock_valid) {
            self.pending = false;
        }
    }
}
