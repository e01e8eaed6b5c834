use crate::models::{Decimal, Reading, ReadingField};

use super::structs::PAYLOAD_LEN;

#[derive(Debug, Clone, Copy)]
enum Width {
    U16,
    I16,
    U32,
    I8,
}

impl Width {
    fn len(&self) -> usize {
        return match self {
            Width::U16 | Width::I16 => 2,
            Width::U32 => 4,
            Width::I8 => 1,
        };
    }

    fn range(&self) -> (i64, i64) {
        return match self {
            Width::U16 => (0, u16::MAX as i64),
            Width::I16 => (i16::MIN as i64, i16::MAX as i64),
            Width::U32 => (0, u32::MAX as i64),
            Width::I8 => (i8::MIN as i64, i8::MAX as i64),
        };
    }
}

/* collector struct "!HHHHHHhLLb" */
const LAYOUT: [(ReadingField, Width, i8); 10] = [
    (ReadingField::Voltage, Width::U16, -1),
    (ReadingField::Current, Width::U16, -1),
    (ReadingField::Frequency, Width::U16, -1),
    (ReadingField::ActivePower, Width::U16, 0),
    (ReadingField::ReactivePower, Width::U16, 0),
    (ReadingField::ApparentPower, Width::U16, 0),
    (ReadingField::PowerFactor, Width::I16, -1),
    (ReadingField::ActiveEnergy, Width::U32, -2),
    (ReadingField::ReactiveEnergy, Width::U32, -2),
    (ReadingField::Temperature, Width::I8, 0),
];

const _: () = assert!(2 * 6 + 2 + 4 * 2 + 1 == PAYLOAD_LEN);

fn scale(value: Decimal, exponent: i8, (min, max): (i64, i64)) -> i64 {
    if !value.has_value() {
        return 0;
    }

    return match value.rescale(exponent) {
        Some(value) => value.clamp(min, max),
        /* overflow, only possible when scaling up by a large power of ten */
        None if value.is_signed() && (value.coefficient() as i32) < 0 => min,
        None => max,
    };
}

/// Pack a reading at the collector's fixed scales.
///
/// Values are truncated to the field's exponent and saturate at the field's range,
/// fields the meter does not report are sent as zero.
pub fn encode(reading: &Reading) -> [u8; PAYLOAD_LEN] {
    let mut payload = [0u8; PAYLOAD_LEN];
    let mut pos = 0;

    for (field, width, exponent) in LAYOUT.iter() {
        let value = scale(reading.get(*field), *exponent, width.range());
        let bytes = value.to_be_bytes();
        let len = width.len();
        payload[pos..pos + len].copy_from_slice(&bytes[8 - len..]);
        pos += len;
    }

    return payload;
}

/// Unpack a payload as the collector sees it.
pub fn decode(payload: &[u8; PAYLOAD_LEN]) -> Reading {
    let mut reading = Reading::default();
    let mut pos = 0;

    for (field, width, exponent) in LAYOUT.iter() {
        let bytes = &payload[pos..pos + width.len()];
        let value = match width {
            Width::U16 => Decimal::new(u16::from_be_bytes([bytes[0], bytes[1]]), *exponent),
            Width::I16 => Decimal::new(i16::from_be_bytes([bytes[0], bytes[1]]), *exponent),
            Width::U32 => Decimal::new(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), *exponent),
            Width::I8 => Decimal::new(bytes[0] as i8, *exponent),
        };
        reading.set(*field, value);
        pos += width.len();
    }

    return reading;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let mut reading = Reading::default();
        reading.voltage = Decimal::new(2301u16, -1);
        reading.current = Decimal::new(1788u32, -3);
        reading.frequency = Decimal::new(500u16, -1);
        reading.active_power = Decimal::new(2485u32, -1);
        reading.power_factor = Decimal::new(-994i16, -1);
        reading.active_energy = Decimal::new(0x0102_0304u32, -2);
        reading.temperature = Decimal::new(-23i8, 0);

        let payload = encode(&reading);
        assert_eq!(
            hex::encode(payload),
            concat!(
                "08fd", "0011", "01f4", "00f8", "0000", "0000", "fc1e",
                "01020304", "00000000", "e9"
            )
        );
    }

    #[test]
    fn test_saturates() {
        let mut reading = Reading::default();
        reading.voltage = Decimal::new(u32::MAX, 0);
        reading.power_factor = Decimal::new(-100_000i32, -1);
        reading.temperature = Decimal::new(300i16, 0);
        reading.active_energy = Decimal::new(1u8, 17);

        let decoded = decode(&encode(&reading));
        assert_eq!(decoded.voltage, Decimal::new(u16::MAX, -1));
        assert_eq!(decoded.power_factor, Decimal::new(i16::MIN, -1));
        assert_eq!(decoded.temperature, Decimal::new(i8::MAX, 0));
        assert_eq!(decoded.active_energy, Decimal::new(u32::MAX, -2));
    }

    #[test]
    fn test_decode_scales() {
        let mut reading = Reading::default();
        reading.reactive_energy = Decimal::new(777u32, -2);
        reading.apparent_power = Decimal::new(1203u16, 0);

        let decoded = decode(&encode(&reading));
        assert_eq!(decoded.reactive_energy, Decimal::new(777u32, -2));
        assert_eq!(decoded.apparent_power, Decimal::new(1203u16, 0));
        assert_eq!(decoded.voltage, Decimal::new(0u16, -1));
    }
}
