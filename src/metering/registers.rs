use async_trait::async_trait;
use thiserror::Error;

/// Errors of a single bus transaction. All of them are transient from the
/// meter's point of view, the next poll simply tries again.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Modbus error: {0}")]
    Modbus(String),
    #[error("Modbus exception code {0:#04x}")]
    Exception(u8),
    #[error("CRC mismatch")]
    CrcMismatch,
    #[error("Response too short, expected {expected} registers got {actual}")]
    ShortResponse { expected: usize, actual: usize },
    #[error("Unexpected response")]
    UnexpectedResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    Holding,
    Input,
}

/// Request/response primitive of the field bus.
///
/// Framing, CRC, timeouts and transceiver timing are the implementation's problem,
/// every call either returns a definitive result or an error.
#[async_trait]
pub trait RegisterBus: Send {
    async fn read_registers(&mut self, kind: RegisterKind, address: u16, count: u16) -> Result<Vec<u16>, BusError>;

    async fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), BusError>;

    /// Vendor function 0x28: unlock writes with a 4 byte password.
    /// Returns the two registers echoed by the meter.
    async fn write_password(&mut self, password: u32) -> Result<[u16; 2], BusError>;

    /// Vendor function 0x42: reset the energy counter.
    async fn reset_energy(&mut self) -> Result<(), BusError>;
}

/// How a 32-bit value is split over two consecutive 16-bit registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordOrder {
    /// `(register[n] << 16) | register[n + 1]`
    HighFirst,
    /// `(register[n + 1] << 16) | register[n]`
    LowFirst,
}

/// Read a register and the one after it as a 32-bit value.
pub fn combine_words(registers: &[u16], index: usize, order: WordOrder) -> Option<u32> {
    let first = *registers.get(index)? as u32;
    let second = *registers.get(index + 1)? as u32;

    return Some(match order {
        WordOrder::HighFirst => (first << 16) | second,
        WordOrder::LowFirst => (second << 16) | first,
    });
}

/// Split a 32-bit value into two registers, high word first.
pub fn split_words(value: u32) -> [u16; 2] {
    return [(value >> 16) as u16, value as u16];
}

pub fn require_registers(registers: &[u16], expected: usize) -> Result<(), BusError> {
    if registers.len() < expected {
        return Err(BusError::ShortResponse { expected, actual: registers.len() });
    }
    Ok(())
}

fn bcd_char(nibble: u16) -> char {
    let nibble = (nibble & 0xF) as u8;
    return match nibble < 10 {
        true => (b'0' + nibble) as char,
        false => (b'A' + (nibble - 10)) as char,
    };
}

/// Packed BCD registers to text, four digits per register, most significant first.
/// Nibbles above 9 are shown as `A`..`F` rather than rejected.
pub fn bcd_to_string(registers: &[u16]) -> String {
    let mut text = String::with_capacity(registers.len() * 4);

    for value in registers {
        text.push(bcd_char(value >> 12));
        text.push(bcd_char(value >> 8));
        text.push(bcd_char(value >> 4));
        text.push(bcd_char(*value));
    }

    return text;
}

/// The lowest four decimal digits of `value` as packed BCD.
pub fn dec_to_bcd(value: u16) -> u16 {
    let mut value = value;
    let mut bcd = 0;

    for shift in [0, 4, 8, 12] {
        bcd |= (value % 10) << shift;
        value /= 10;
    }

    return bcd;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_high_word_first() {
        let registers = [0x0000, 0x0001, 0x0002];
        assert_eq!(combine_words(&registers, 1, WordOrder::HighFirst), Some(65538));
    }

    #[test]
    fn test_low_word_first_pair() {
        let registers = [0x0000, 0x0002, 0x0001];
        assert_eq!(combine_words(&registers, 1, WordOrder::LowFirst), Some(65538));
    }

    #[test]
    fn test_pair_out_of_range() {
        let registers = [0x0001];
        assert_eq!(combine_words(&registers, 0, WordOrder::HighFirst), None);
    }

    #[test]
    fn test_split_words() {
        assert_eq!(split_words(0x0123_4567), [0x0123, 0x4567]);
    }

    #[test]
    fn test_bcd_to_string() {
        assert_eq!(bcd_to_string(&[0x0012, 0x3456, 0x7890]), "001234567890");
        assert_eq!(bcd_to_string(&[0xABCF]), "ABCF");
        assert_eq!(bcd_to_string(&[]), "");
    }

    #[test]
    fn test_dec_to_bcd() {
        assert_eq!(dec_to_bcd(2025), 0x2025);
        assert_eq!(dec_to_bcd(7), 0x0007);
        assert_eq!(dec_to_bcd(59), 0x0059);
        assert_eq!(dec_to_bcd(12345), 0x2345);
    }

    #[test]
    fn test_require_registers() {
        assert!(require_registers(&[1, 2, 3], 3).is_ok());
        assert!(matches!(
            require_registers(&[1, 2], 3),
            Err(BusError::ShortResponse { expected: 3, actual: 2 })
        ));
    }
}
