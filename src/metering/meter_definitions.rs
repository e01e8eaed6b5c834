use crate::models::{Decimal, MeterModel, Reading, ReadingField};

use super::registers::{combine_words, require_registers, BusError, RegisterKind, WordOrder};

/// How a field is stored in the register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    U16,
    I16,
    /// Signed 8-bit value in the low byte of the register
    I8Low,
    /// Two consecutive registers forming an unsigned 32-bit value
    U32(WordOrder),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDefinition {
    pub field: ReadingField,
    pub offset: usize,
    pub format: FieldFormat,
    pub exponent: i8,
}

/// Limits on raw coefficients, a reading outside of them is discarded as a whole.
#[derive(Debug, Clone, Copy)]
pub struct Plausibility {
    pub voltage: (u32, u32),
    pub frequency: (u32, u32),
    pub max_active_power: u32,
    pub max_power_factor: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct MeterDefinition {
    pub model: MeterModel,
    pub kind: RegisterKind,
    pub address: u16,
    pub count: u16,
    pub fields: &'static [FieldDefinition],
    /// Number of successful fetches discarded after power on
    pub startup_suppression: u8,
    pub plausibility: Option<Plausibility>,
}

const fn field(field: ReadingField, offset: usize, format: FieldFormat, exponent: i8) -> FieldDefinition {
    return FieldDefinition { field, offset, format, exponent };
}

// Rayleigh Instruments RI-D19-80-C
const RI_D19_80_C_FIELDS: [FieldDefinition; 10] = [
    field(ReadingField::Voltage, 0x0000, FieldFormat::U16, -1),
    field(ReadingField::Current, 0x0001, FieldFormat::U16, -1),
    field(ReadingField::Frequency, 0x0002, FieldFormat::U16, -1),
    field(ReadingField::ActivePower, 0x0003, FieldFormat::U16, 0),
    field(ReadingField::ReactivePower, 0x0004, FieldFormat::U16, 0),
    field(ReadingField::ApparentPower, 0x0005, FieldFormat::U16, 0),
    field(ReadingField::PowerFactor, 0x0006, FieldFormat::I16, -1),
    field(ReadingField::ActiveEnergy, 0x0007, FieldFormat::U32(WordOrder::HighFirst), -2),
    field(ReadingField::ReactiveEnergy, 0x0011, FieldFormat::U32(WordOrder::HighFirst), -2),
    field(ReadingField::Temperature, 0x0025, FieldFormat::I8Low, 0),
];

pub const RI_D19_80_C: MeterDefinition = MeterDefinition {
    model: MeterModel::RiD1980C,
    kind: RegisterKind::Holding,
    address: 0x0000,
    count: 0x0026,
    fields: &RI_D19_80_C_FIELDS,
    startup_suppression: 0,
    plausibility: None,
};

pub const RI_D19_80_C_SERIAL_NUMBER: (u16, u16) = (0x0027, 3);
pub const RI_D19_80_C_DATE_TIME: u16 = 0x0021;
pub const RI_D19_80_C_BAUD_RATE: u16 = 0x002A;
pub const RI_D19_80_C_ADDRESS: u16 = 0x002B;
pub const RI_D19_80_C_PASSWORD: u16 = 0x002C;
pub const RI_D19_80_C_ACTIVE_ENERGY: u16 = 0x0007;
pub const RI_D19_80_C_REACTIVE_ENERGY: u16 = 0x0011;
pub const RI_D19_80_C_PASSWORD_ACCEPTED: [u16; 2] = [0xFE01, 0x0001];
/// daW·h, 6+2 digits in the record and 5+1 on the display
pub const RI_D19_80_C_MAXIMUM_ENERGY: u32 = 99_999_999;
pub const RI_D19_80_C_TARIFFS: usize = 4;

// Peacefair PZEM-004T-100A
const PZEM_004T_100A_FIELDS: [FieldDefinition; 6] = [
    field(ReadingField::Voltage, 0x0000, FieldFormat::U16, -1),
    field(ReadingField::Current, 0x0001, FieldFormat::U32(WordOrder::LowFirst), -3),
    field(ReadingField::ActivePower, 0x0003, FieldFormat::U32(WordOrder::LowFirst), -1),
    field(ReadingField::ActiveEnergy, 0x0005, FieldFormat::U32(WordOrder::LowFirst), -3),
    field(ReadingField::Frequency, 0x0007, FieldFormat::U16, -1),
    field(ReadingField::PowerFactor, 0x0008, FieldFormat::U16, -2),
];

pub const PZEM_004T_100A: MeterDefinition = MeterDefinition {
    model: MeterModel::Pzem004t100A,
    kind: RegisterKind::Input,
    address: 0x0000,
    count: 9,
    fields: &PZEM_004T_100A_FIELDS,
    /* about 2-3 seconds of garbage after power on */
    startup_suppression: 20,
    plausibility: Some(Plausibility {
        voltage: (800, 3000),
        frequency: (250, 750),
        max_active_power: 500_000,
        max_power_factor: 10_000,
    }),
};

pub fn get_definition(model: MeterModel) -> &'static MeterDefinition {
    return match model {
        MeterModel::RiD1980C => &RI_D19_80_C,
        MeterModel::Pzem004t100A => &PZEM_004T_100A,
    };
}

impl FieldDefinition {
    fn decode(&self, registers: &[u16]) -> Option<Decimal> {
        let register = *registers.get(self.offset)?;

        return Some(match self.format {
            FieldFormat::U16 => Decimal::new(register, self.exponent),
            FieldFormat::I16 => Decimal::new(register as i16, self.exponent),
            FieldFormat::I8Low => Decimal::new(register as u8 as i8, self.exponent),
            FieldFormat::U32(order) => Decimal::new(combine_words(registers, self.offset, order)?, self.exponent),
        });
    }
}

impl MeterDefinition {
    /// Decode every field of the register block into a fresh reading.
    pub fn decode(&self, registers: &[u16]) -> Result<Reading, BusError> {
        require_registers(registers, self.count as usize)?;

        let mut reading = Reading::default();
        for definition in self.fields {
            let value = definition.decode(registers).ok_or(BusError::ShortResponse {
                expected: self.count as usize,
                actual: registers.len(),
            })?;
            reading.set(definition.field, value);
        }

        return Ok(reading);
    }
}

impl Plausibility {
    pub fn accepts(&self, reading: &Reading) -> bool {
        let voltage = reading.voltage.coefficient();
        let frequency = reading.frequency.coefficient();

        return voltage >= self.voltage.0
            && voltage <= self.voltage.1
            && frequency >= self.frequency.0
            && frequency <= self.frequency.1
            && reading.active_power.coefficient() <= self.max_active_power
            && reading.power_factor.coefficient() <= self.max_power_factor;
    }
}
