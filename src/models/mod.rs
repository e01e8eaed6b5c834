use serde::{Deserialize, Serialize};

pub mod decimal;

pub use decimal::Decimal;

/// The quantities a meter may report, in status line order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingField {
    Voltage,
    Current,
    Frequency,
    ActivePower,
    ReactivePower,
    ApparentPower,
    PowerFactor,
    Temperature,
    ActiveEnergy,
    ReactiveEnergy,
}

impl ReadingField {
    pub const ALL: [ReadingField; 10] = [
        ReadingField::Voltage,
        ReadingField::Current,
        ReadingField::Frequency,
        ReadingField::ActivePower,
        ReadingField::ReactivePower,
        ReadingField::ApparentPower,
        ReadingField::PowerFactor,
        ReadingField::Temperature,
        ReadingField::ActiveEnergy,
        ReadingField::ReactiveEnergy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReadingField::Voltage => "voltage",
            ReadingField::Current => "current",
            ReadingField::Frequency => "frequency",
            ReadingField::ActivePower => "activePower",
            ReadingField::ReactivePower => "reactivePower",
            ReadingField::ApparentPower => "apparentPower",
            ReadingField::PowerFactor => "powerFactor",
            ReadingField::Temperature => "temperature",
            ReadingField::ActiveEnergy => "activeEnergy",
            ReadingField::ReactiveEnergy => "reactiveEnergy",
        }
    }
}

/// One measurement snapshot. Every field starts out as `Decimal::none()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reading {
    // Gauge values
    pub voltage: Decimal,
    pub current: Decimal,
    pub frequency: Decimal,
    pub active_power: Decimal,
    pub reactive_power: Decimal,
    pub apparent_power: Decimal,
    pub power_factor: Decimal,

    pub temperature: Decimal,

    // Counter values
    pub active_energy: Decimal,
    pub reactive_energy: Decimal,
}

impl Reading {
    pub fn get(&self, field: ReadingField) -> Decimal {
        match field {
            ReadingField::Voltage => self.voltage,
            ReadingField::Current => self.current,
            ReadingField::Frequency => self.frequency,
            ReadingField::ActivePower => self.active_power,
            ReadingField::ReactivePower => self.reactive_power,
            ReadingField::ApparentPower => self.apparent_power,
            ReadingField::PowerFactor => self.power_factor,
            ReadingField::Temperature => self.temperature,
            ReadingField::ActiveEnergy => self.active_energy,
            ReadingField::ReactiveEnergy => self.reactive_energy,
        }
    }

    pub fn set(&mut self, field: ReadingField, value: Decimal) {
        let slot = match field {
            ReadingField::Voltage => &mut self.voltage,
            ReadingField::Current => &mut self.current,
            ReadingField::Frequency => &mut self.frequency,
            ReadingField::ActivePower => &mut self.active_power,
            ReadingField::ReactivePower => &mut self.reactive_power,
            ReadingField::ApparentPower => &mut self.apparent_power,
            ReadingField::PowerFactor => &mut self.power_factor,
            ReadingField::Temperature => &mut self.temperature,
            ReadingField::ActiveEnergy => &mut self.active_energy,
            ReadingField::ReactiveEnergy => &mut self.reactive_energy,
        };
        *slot = value;
    }

    pub fn clear(&mut self) {
        *self = Reading::default();
    }

    /// Fields that have a value, in status line order.
    pub fn present(&self) -> impl Iterator<Item = (ReadingField, Decimal)> + '_ {
        ReadingField::ALL
            .iter()
            .map(move |field| (*field, self.get(*field)))
            .filter(|(_, value)| value.has_value())
    }

    pub fn is_empty(&self) -> bool {
        return self.present().next().is_none();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterModel {
    RiD1980C,
    Pzem004t100A,
}

impl MeterModel {
    pub fn to_string(&self) -> String {
        match self {
            MeterModel::RiD1980C => "RI-D19-80-C".to_string(),
            MeterModel::Pzem004t100A => "PZEM-004T-100A".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_keeps_field_order() {
        let mut reading = Reading::default();
        reading.reactive_energy = Decimal::new(1u32, 0);
        reading.voltage = Decimal::new(2300u16, -1);
        reading.temperature = Decimal::new(-4i8, 0);

        let names: Vec<&str> = reading.present().map(|(f, _)| f.name()).collect();
        assert_eq!(names, vec!["voltage", "temperature", "reactiveEnergy"]);
    }

    #[test]
    fn test_clear() {
        let mut reading = Reading::default();
        assert!(reading.is_empty());

        reading.set(ReadingField::PowerFactor, Decimal::new(99u16, -2));
        assert_eq!(reading.get(ReadingField::PowerFactor), Decimal::new(99u16, -2));
        assert!(!reading.is_empty());

        reading.clear();
        assert!(reading.is_empty());
    }
}
