use std::fmt;

use async_trait::async_trait;
use log::debug;
use thiserror::Error;

use crate::config::MeterConfig;
use crate::models::{MeterModel, Reading};

pub mod meter_definitions;
pub mod pzem_004t;
pub mod registers;
pub mod ri_d19_80_c;

use pzem_004t::Pzem004t;
use registers::{BusError, RegisterBus};
use ri_d19_80_c::RiD1980C;

#[derive(Error, Debug)]
pub enum MeterError {
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
    #[error("Discarding reading {0} of {1} after power on")]
    Starting(u8, u8),
    #[error("Implausible reading")]
    Implausible,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Password rejected")]
    PasswordRejected,
    #[error("Operation not supported by {0}")]
    Unsupported(String),
}

/// One vendor's register map.
///
/// Implementations hold the per-meter quirks (suppression counters, passwords) but
/// never the reading itself, that belongs to the `PowerMeter` driving them.
#[async_trait]
pub trait MeterDecoder: Send {
    fn model(&self) -> MeterModel;

    async fn read_serial_number(&mut self, bus: &mut dyn RegisterBus) -> Result<String, MeterError>;

    async fn read_measurements(&mut self, bus: &mut dyn RegisterBus) -> Result<Reading, MeterError>;

    /// Zero the energy counters.
    async fn reset_energy(&mut self, _bus: &mut dyn RegisterBus) -> Result<(), MeterError> {
        return Err(MeterError::Unsupported(self.model().to_string()));
    }
}

pub fn create_decoder(config: &MeterConfig) -> Box<dyn MeterDecoder> {
    return match config.model {
        MeterModel::RiD1980C => Box::new(RiD1980C::new(config.password)),
        MeterModel::Pzem004t100A => Box::new(Pzem004t::new(config.serial_number.clone().unwrap_or_default())),
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterState {
    Uninitialized,
    SerialNumberKnown,
}

pub struct PowerMeter {
    decoder: Box<dyn MeterDecoder>,
    serial_number: Option<String>,
    reading: Reading,
}

impl PowerMeter {
    pub fn new(decoder: Box<dyn MeterDecoder>) -> Self {
        return PowerMeter {
            decoder,
            serial_number: None,
            reading: Reading::default(),
        };
    }

    pub fn from_config(config: &MeterConfig) -> Self {
        return PowerMeter::new(create_decoder(config));
    }

    /// Poll the meter once.
    ///
    /// The serial number is fetched until it has been read successfully once. The
    /// reading is emptied before every fetch so it stays empty when this fails.
    pub async fn read(&mut self, bus: &mut dyn RegisterBus) -> Result<(), MeterError> {
        if self.serial_number.is_none() {
            let serial_number = self.decoder.read_serial_number(bus).await?;
            debug!("{} serial number {:?}", self.decoder.model().to_string(), serial_number);
            self.serial_number = Some(serial_number);
        }

        self.reading.clear();
        self.reading = self.decoder.read_measurements(bus).await?;

        Ok(())
    }

    pub async fn reset_energy(&mut self, bus: &mut dyn RegisterBus) -> Result<(), MeterError> {
        return self.decoder.reset_energy(bus).await;
    }

    pub fn state(&self) -> MeterState {
        return match self.serial_number {
            Some(_) => MeterState::SerialNumberKnown,
            None => MeterState::Uninitialized,
        };
    }

    pub fn model(&self) -> MeterModel {
        return self.decoder.model();
    }

    pub fn serial_number(&self) -> Option<&str> {
        return self.serial_number.as_deref();
    }

    pub fn reading(&self) -> &Reading {
        return &self.reading;
    }
}

/// The status line, e.g.
/// `meter: {model: "RI-D19-80-C",serialNumber: "001234567890",reading: {voltage: 2301.0e-1}}`
impl fmt::Display for PowerMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "meter: {{model: \"{}\"", self.decoder.model().to_string())?;

        match self.serial_number.as_deref() {
            Some(serial_number) if !serial_number.is_empty() => {
                write!(f, ",serialNumber: \"{}\"", serial_number)?;
            }
            _ => {}
        }

        f.write_str(",reading: {")?;
        for (index, (field, value)) in self.reading.present().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}: {:#}", field.name(), value)?;
        }

        f.write_str("}}")
    }
}
