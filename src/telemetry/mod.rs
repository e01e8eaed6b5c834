use std::time::Duration;

use log::debug;
use rand::RngCore;
use thiserror::Error;

use crate::network::{Clock, DatagramLink, WallTime, MIN_VALID_TIME};

pub mod payload;
pub mod queue;
pub mod structs;
pub mod utils;

use queue::OutboundQueue;
use structs::{ClockSyncState, SampleRecord, SessionToken, BLOCK_LEN, HMAC_LEN, MIN_FRAME_LEN, PAYLOAD_LEN};
use utils::{ENC_KEY_LEN, MAC_KEY_LEN};

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Link is down")]
    LinkDown,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame too short ({0} bytes)")]
    TooShort(usize),
    #[error("Frame is not a whole number of blocks ({0} bytes)")]
    Misaligned(usize),
    #[error("Authentication failed")]
    Authentication,
    #[error("Cipher failure")]
    Cipher,
}

/// Pre-shared keys, AES-128 for the frame and HMAC-SHA256 over the ciphertext.
#[derive(Clone)]
pub struct TelemetryKeys {
    pub enc_key: [u8; ENC_KEY_LEN],
    pub mac_key: [u8; MAC_KEY_LEN],
}

/// What an accepted reply did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reply {
    pub token_match: bool,
    pub rtt: Option<Duration>,
    pub clock_set: Option<WallTime>,
    pub acknowledged: usize,
}

/// Batches samples towards the collector and processes its replies.
///
/// Frame sent:
///
/// ```text
/// [16 random][16 token][n × 32 sample] AES-128-CBC, random IV not sent
/// [32 HMAC-SHA256 of the above ciphertext]
/// ```
///
/// Reply:
///
/// ```text
/// [16 discarded][16 token][4 seconds][4 microseconds][4 × ack timestamp ...]
/// AES-128-CBC decrypted with a zero IV, then the HMAC
/// ```
///
/// The IV only affects the first plaintext block under CBC, which is why both
/// directions start with a throwaway block.
pub struct TelemetryCodec<R: RngCore> {
    keys: TelemetryKeys,
    rng: R,
    queue: OutboundQueue,
    token: SessionToken,
    sync: ClockSyncState,
    rtt_us: u64,
}

impl<R: RngCore> TelemetryCodec<R> {
    pub fn new(keys: TelemetryKeys, rng: R) -> Self {
        return TelemetryCodec {
            keys,
            rng,
            queue: OutboundQueue::new(),
            token: SessionToken::default(),
            sync: ClockSyncState::default(),
            rtt_us: 0,
        };
    }

    pub fn queue(&self) -> &OutboundQueue {
        return &self.queue;
    }

    pub fn token(&self) -> &SessionToken {
        return &self.token;
    }

    pub fn sync_state(&self) -> &ClockSyncState {
        return &self.sync;
    }

    /// Buffer a sample for transmission.
    ///
    /// The last measured round trip time is attached to whichever sample comes next,
    /// even one that is dropped for having a timestamp from an unset clock.
    pub fn add(&mut self, timestamp: u64, payload: [u8; PAYLOAD_LEN], uptime: Duration) -> bool {
        let mut rtt = self.rtt_us / 16;
        if rtt > u16::MAX as u64 {
            rtt = 0;
        }
        self.rtt_us = 0;

        if timestamp <= MIN_VALID_TIME {
            debug!("Dropping sample with invalid timestamp {}", timestamp);
            return false;
        }

        let timestamp = match u32::try_from(timestamp) {
            Ok(timestamp) => timestamp,
            Err(_) => {
                debug!("Dropping sample with timestamp {} beyond 32 bits", timestamp);
                return false;
            }
        };

        let record = SampleRecord {
            timestamp,
            payload,
            uptime_secs: (uptime.as_secs() & 0xFF_FFFF) as u32,
            rtt: rtt as u16,
        };

        if let Some(evicted) = self.queue.push(record) {
            debug!("Queue full, discarding sample {}", evicted.timestamp);
        }
        return true;
    }

    /// Send every buffered sample. Returns the number of samples sent.
    pub fn transmit(&mut self, link: &mut dyn DatagramLink, clock: &dyn Clock) -> Result<usize, TelemetryError> {
        let mut iv = [0u8; BLOCK_LEN];
        self.rng.fill_bytes(&mut iv);

        let mut frame = vec![0u8; BLOCK_LEN];
        self.rng.fill_bytes(&mut frame);

        /* a new token invalidates any reply to the previous transmission */
        self.token = SessionToken::generate(&mut self.rng);
        frame.extend_from_slice(self.token.bytes());

        for record in self.queue.iter() {
            frame.extend_from_slice(&record.encode());
        }

        let count = self.queue.len();
        utils::encrypt(&self.keys.enc_key, &iv, &mut frame)?;
        let hmac = utils::sign(&self.keys.mac_key, &frame)?;
        frame.extend_from_slice(&hmac);

        if !link.is_up() {
            return Err(TelemetryError::LinkDown);
        }

        link.send(&frame)?;

        self.sync.last_transmit = clock.uptime();
        self.sync.pending = true;
        self.token.mark_sent();

        debug!("Transmit {} samples {} bytes", count, frame.len());
        return Ok(count);
    }

    /// Process at most one waiting datagram.
    ///
    /// Invalid datagrams are reported as errors but change nothing. Returns `None`
    /// when there was nothing to receive.
    pub fn receive(&mut self, link: &mut dyn DatagramLink, clock: &mut dyn Clock) -> Result<Option<Reply>, TelemetryError> {
        let datagram = link.try_receive();
        let rx_uptime = clock.uptime();

        self.sync.expire(rx_uptime, clock.now().is_valid());

        let mut frame = match datagram? {
            Some(frame) => frame,
            None => return Ok(None),
        };

        if frame.len() < MIN_FRAME_LEN {
            return Err(TelemetryError::TooShort(frame.len()));
        }

        let data_len = frame.len() - HMAC_LEN;
        if data_len % BLOCK_LEN != 0 {
            return Err(TelemetryError::Misaligned(frame.len()));
        }

        let (data, hmac) = frame.split_at_mut(data_len);
        utils::verify(&self.keys.mac_key, data, hmac)?;
        utils::decrypt(&self.keys.enc_key, &[0u8; BLOCK_LEN], data)?;

        debug!("Receive {} bytes", frame.len());
        let data = &frame[..data_len];
        let mut reply = Reply::default();

        let mut pos = BLOCK_LEN;
        reply.token_match = self.token.matches(&data[pos..pos + BLOCK_LEN]);
        pos += BLOCK_LEN;

        if reply.token_match {
            let rtt = self.sync.since_transmit(rx_uptime);
            self.rtt_us = rtt.as_micros() as u64;
            self.token.consume();
            reply.rtt = Some(rtt);
            debug!("Round trip {}µs", self.rtt_us);
        }

        if reply.token_match && self.sync.pending {
            let secs = read_u32(data, pos);
            let usecs = read_u32(data, pos + 4);

            /* estimate the remote time at the middle of the round trip */
            let processing = clock.uptime().saturating_sub(rx_uptime);
            let time = WallTime::new(
                secs as u64,
                usecs as u64 + processing.as_micros() as u64 + self.rtt_us / 2,
            );

            clock.set(time);
            self.sync.pending = false;
            reply.clock_set = Some(time);
            debug!("Clock set to {}.{:06}", time.secs, time.usecs);
        }
        pos += 8;

        while pos + 4 <= data_len {
            let timestamp = read_u32(data, pos);
            pos += 4;

            if timestamp != 0 && self.queue.remove_first(timestamp) {
                reply.acknowledged += 1;
            }
        }

        return Ok(Some(reply));
    }
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    return u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
}
