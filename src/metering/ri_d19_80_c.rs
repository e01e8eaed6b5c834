use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime, Timelike};
use log::{debug, warn};

use crate::models::{MeterModel, Reading};

use super::meter_definitions::{
    RI_D19_80_C, RI_D19_80_C_ACTIVE_ENERGY, RI_D19_80_C_ADDRESS, RI_D19_80_C_BAUD_RATE, RI_D19_80_C_DATE_TIME,
    RI_D19_80_C_MAXIMUM_ENERGY, RI_D19_80_C_PASSWORD, RI_D19_80_C_PASSWORD_ACCEPTED, RI_D19_80_C_REACTIVE_ENERGY,
    RI_D19_80_C_SERIAL_NUMBER, RI_D19_80_C_TARIFFS,
};
use super::registers::{bcd_to_string, dec_to_bcd, require_registers, split_words, RegisterBus, RegisterKind};
use super::{MeterDecoder, MeterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyCounter {
    Active,
    Reactive,
}

/// Calendar fields as the meter stores them. Day of week counts from Sunday = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub day_of_week: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl MeterDateTime {
    fn validate(&self) -> Result<(), MeterError> {
        if self.year > 9999
            || !(1..=12).contains(&self.month)
            || !(1..=31).contains(&self.day)
            || self.day_of_week > 6
            || self.hour > 23
            || self.minute > 59
            || self.second > 59
        {
            return Err(MeterError::InvalidArgument(format!("date/time {:?}", self)));
        }
        Ok(())
    }

    /// Four BCD registers: year, month/day, weekday/hour, minute/second
    fn to_registers(&self) -> [u16; 4] {
        let pair = |high: u8, low: u8| (dec_to_bcd(high as u16) << 8) | dec_to_bcd(low as u16);

        return [
            dec_to_bcd(self.year),
            pair(self.month, self.day),
            pair(self.day_of_week, self.hour),
            pair(self.minute, self.second),
        ];
    }
}

impl From<&NaiveDateTime> for MeterDateTime {
    fn from(value: &NaiveDateTime) -> Self {
        /* chrono years can be negative or above 9999, clamp them into validation failure */
        let year = u16::try_from(value.year()).unwrap_or(u16::MAX);

        return MeterDateTime {
            year,
            month: value.month() as u8,
            day: value.day() as u8,
            day_of_week: value.weekday().num_days_from_sunday() as u8,
            hour: value.hour() as u8,
            minute: value.minute() as u8,
            second: value.second() as u8,
        };
    }
}

/// Rayleigh Instruments RI-D19-80-C single phase meter.
///
/// Every configuration write is preceded by the vendor password transaction, the
/// meter only accepts writes for a few seconds after the password was accepted.
pub struct RiD1980C {
    password: u32,
}

impl RiD1980C {
    pub fn new(password: u32) -> Self {
        return RiD1980C { password };
    }

    pub fn password(&self) -> u32 {
        return self.password;
    }

    pub fn set_password(&mut self, password: u32) {
        self.password = password;
    }

    async fn transmit_password(&self, bus: &mut dyn RegisterBus) -> Result<(), MeterError> {
        let echo = bus.write_password(self.password).await?;
        if echo != RI_D19_80_C_PASSWORD_ACCEPTED {
            warn!("RI-D19-80-C rejected password, response {:04X} {:04X}", echo[0], echo[1]);
            return Err(MeterError::PasswordRejected);
        }
        Ok(())
    }

    async fn write_unlocked(&self, bus: &mut dyn RegisterBus, address: u16, values: &[u16]) -> Result<(), MeterError> {
        self.transmit_password(bus).await?;
        bus.write_registers(address, values).await?;
        debug!("RI-D19-80-C wrote {} registers at {:#06x}", values.len(), address);
        Ok(())
    }

    /// Preset the tariff counters of an energy register.
    ///
    /// The total is calculated by the meter so it is always written as zero. Values
    /// are in daW·h and wrap at the display width.
    pub async fn write_energy(&mut self, bus: &mut dyn RegisterBus, counter: EnergyCounter, tariffs: &[u32]) -> Result<(), MeterError> {
        if tariffs.len() > RI_D19_80_C_TARIFFS {
            return Err(MeterError::InvalidArgument(format!("{} tariffs", tariffs.len())));
        }

        let address = match counter {
            EnergyCounter::Active => RI_D19_80_C_ACTIVE_ENERGY,
            EnergyCounter::Reactive => RI_D19_80_C_REACTIVE_ENERGY,
        };

        let mut values = vec![0u16, 0u16];
        for tariff in tariffs {
            values.extend_from_slice(&split_words(tariff % RI_D19_80_C_MAXIMUM_ENERGY));
        }

        return self.write_unlocked(bus, address, &values).await;
    }

    pub async fn write_date_time(&mut self, bus: &mut dyn RegisterBus, value: &MeterDateTime) -> Result<(), MeterError> {
        value.validate()?;
        return self.write_unlocked(bus, RI_D19_80_C_DATE_TIME, &value.to_registers()).await;
    }

    pub async fn write_baud_rate(&mut self, bus: &mut dyn RegisterBus, baud_rate: u32) -> Result<(), MeterError> {
        let code: u16 = match baud_rate {
            1200 => 1,
            2400 => 2,
            4800 => 3,
            9600 => 4,
            _ => return Err(MeterError::InvalidArgument(format!("baud rate {}", baud_rate))),
        };

        return self.write_unlocked(bus, RI_D19_80_C_BAUD_RATE, &[code]).await;
    }

    pub async fn write_address(&mut self, bus: &mut dyn RegisterBus, address: u8) -> Result<(), MeterError> {
        if address > 247 {
            return Err(MeterError::InvalidArgument(format!("address {}", address)));
        }

        return self.write_unlocked(bus, RI_D19_80_C_ADDRESS, &[address as u16]).await;
    }

    /// Change the meter password, the new one is used from then on.
    pub async fn write_password(&mut self, bus: &mut dyn RegisterBus, password: u32) -> Result<(), MeterError> {
        self.write_unlocked(bus, RI_D19_80_C_PASSWORD, &split_words(password)).await?;
        self.password = password;
        Ok(())
    }
}

#[async_trait]
impl MeterDecoder for RiD1980C {
    fn model(&self) -> MeterModel {
        return MeterModel::RiD1980C;
    }

    async fn read_serial_number(&mut self, bus: &mut dyn RegisterBus) -> Result<String, MeterError> {
        let (address, count) = RI_D19_80_C_SERIAL_NUMBER;
        let registers = bus.read_registers(RegisterKind::Holding, address, count).await?;
        require_registers(&registers, count as usize)?;

        return Ok(bcd_to_string(&registers[..count as usize]));
    }

    async fn read_measurements(&mut self, bus: &mut dyn RegisterBus) -> Result<Reading, MeterError> {
        let registers = bus.read_registers(RI_D19_80_C.kind, RI_D19_80_C.address, RI_D19_80_C.count).await?;
        return Ok(RI_D19_80_C.decode(&registers)?);
    }

    async fn reset_energy(&mut self, bus: &mut dyn RegisterBus) -> Result<(), MeterError> {
        return self.write_energy(bus, EnergyCounter::Active, &[0; RI_D19_80_C_TARIFFS]).await;
    }
}
