use async_trait::async_trait;
use log::debug;

use crate::models::{MeterModel, Reading};

use super::meter_definitions::{MeterDefinition, PZEM_004T_100A};
use super::registers::RegisterBus;
use super::{MeterDecoder, MeterError};

/// Peacefair PZEM-004T-100A.
///
/// The meter has no serial number register, a fixed one can be configured instead.
pub struct Pzem004t {
    definition: &'static MeterDefinition,
    serial_number: String,
    /* consecutive successful fetches, saturating */
    successes: u8,
}

impl Pzem004t {
    pub fn new(serial_number: String) -> Self {
        return Pzem004t {
            definition: &PZEM_004T_100A,
            serial_number,
            successes: 0,
        };
    }
}

#[async_trait]
impl MeterDecoder for Pzem004t {
    fn model(&self) -> MeterModel {
        return self.definition.model;
    }

    async fn read_serial_number(&mut self, _bus: &mut dyn RegisterBus) -> Result<String, MeterError> {
        return Ok(self.serial_number.clone());
    }

    async fn read_measurements(&mut self, bus: &mut dyn RegisterBus) -> Result<Reading, MeterError> {
        let definition = self.definition;

        let reading = match bus
            .read_registers(definition.kind, definition.address, definition.count)
            .await
            .and_then(|registers| definition.decode(&registers))
        {
            Ok(reading) => reading,
            Err(e) => {
                self.successes = 0;
                return Err(e.into());
            }
        };

        if self.successes < definition.startup_suppression {
            self.successes += 1;
            return Err(MeterError::Starting(self.successes, definition.startup_suppression));
        }

        if let Some(plausibility) = definition.plausibility {
            if !plausibility.accepts(&reading) {
                debug!("Discarding implausible reading {:?}", reading);
                return Err(MeterError::Implausible);
            }
        }

        return Ok(reading);
    }

    async fn reset_energy(&mut self, bus: &mut dyn RegisterBus) -> Result<(), MeterError> {
        bus.reset_energy().await?;
        Ok(())
    }
}
