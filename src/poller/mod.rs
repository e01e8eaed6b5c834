use std::time::Duration;

use log::{debug, info, warn};
use rand::RngCore;

use crate::metering::registers::RegisterBus;
use crate::metering::PowerMeter;
use crate::network::status::StatusBroadcaster;
use crate::network::{Clock, DatagramLink};
use crate::telemetry::{payload, TelemetryCodec};

/* how long to wait for the clock to be set before polling again */
const UNSYNCED_CYCLE: Duration = Duration::from_millis(500);
const FAILURE_WAIT: Duration = Duration::from_millis(100);
const RECEIVE_INTERVAL: Duration = Duration::from_millis(10);

/// Drives one meter and one collector link on a single execution context.
pub struct PollManager<B: RegisterBus, L: DatagramLink, C: Clock, R: RngCore> {
    meter: PowerMeter,
    bus: B,
    codec: TelemetryCodec<R>,
    link: L,
    clock: C,
    status: Option<StatusBroadcaster>,
    reset_energy_on_start: bool,
}

impl<B: RegisterBus, L: DatagramLink, C: Clock, R: RngCore> PollManager<B, L, C, R> {
    pub fn new(meter: PowerMeter, bus: B, codec: TelemetryCodec<R>, link: L, clock: C) -> Self {
        return PollManager {
            meter,
            bus,
            codec,
            link,
            clock,
            status: None,
            reset_energy_on_start: false,
        };
    }

    pub fn with_status(mut self, status: StatusBroadcaster) -> Self {
        self.status = Some(status);
        return self;
    }

    pub fn with_energy_reset(mut self, reset: bool) -> Self {
        self.reset_energy_on_start = reset;
        return self;
    }

    pub fn meter(&self) -> &PowerMeter {
        return &self.meter;
    }

    async fn prepare(&mut self) {
        if !self.reset_energy_on_start {
            return;
        }

        match self.meter.reset_energy(&mut self.bus).await {
            Ok(()) => info!("Energy counter of {} reset", self.meter.model().to_string()),
            Err(e) => warn!("Unable to reset energy counter: {}", e),
        }
    }

    /// Poll the meter, queue the reading and transmit everything queued.
    /// Returns how long to wait before the next cycle.
    async fn cycle(&mut self) -> Duration {
        let start = self.clock.uptime();

        if let Err(e) = self.meter.read(&mut self.bus).await {
            debug!("Meter read failed: {}", e);
            return FAILURE_WAIT;
        }

        let line = self.meter.to_string();
        info!("{}", line);

        if let Some(status) = &self.status {
            if let Err(e) = status.send(&line) {
                debug!("Unable to send status: {}", e);
            }
        }

        let payload = payload::encode(self.meter.reading());
        self.codec.add(self.clock.now().secs, payload, self.clock.uptime());

        if let Err(e) = self.codec.transmit(&mut self.link, &self.clock) {
            debug!("Transmit failed: {}", e);
        }

        let now = self.clock.now();
        if now.is_valid() {
            return now.until_next_second();
        }
        return (start + UNSYNCED_CYCLE).saturating_sub(self.clock.uptime());
    }

    fn receive(&mut self) {
        match self.codec.receive(&mut self.link, &mut self.clock) {
            Ok(Some(reply)) => {
                if reply.acknowledged > 0 {
                    debug!("{} samples acknowledged, {} queued", reply.acknowledged, self.codec.queue().len());
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Dropping datagram: {}", e),
        }
    }

    pub async fn start_thread(&mut self) {
        self.prepare().await;

        info!("Polling {}", self.meter.model().to_string());

        let stop = tokio::signal::ctrl_c();
        tokio::pin!(stop);

        loop {
            let wait = tokio::select! {
                _ = &mut stop => {
                    info!("Stopping");
                    return;
                }
                wait = self.cycle() => wait,
            };
            let deadline = tokio::time::Instant::now() + wait;

            loop {
                self.receive();

                let now = tokio::time::Instant::now();
                if now >= deadline {
                    break;
                }

                tokio::select! {
                    _ = &mut stop => {
                        info!("Stopping");
                        return;
                    }
                    _ = tokio::time::sleep(RECEIVE_INTERVAL.min(deadline - now)) => {}
                }
            }
        }
    }
}
