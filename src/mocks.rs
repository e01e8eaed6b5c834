use std::collections::{HashMap, VecDeque};
use std::io;
use std::time::Duration;

use async_trait::async_trait;

use crate::metering::registers::{BusError, RegisterBus, RegisterKind};
use crate::network::{Clock, DatagramLink, WallTime};

fn timeout() -> io::Error {
    return io::Error::new(io::ErrorKind::TimedOut, "mock timeout");
}

/// Register bus backed by blocks of registers keyed by their start address.
pub struct MockBus {
    registers: HashMap<(RegisterKind, u16), Vec<u16>>,
    reads: HashMap<(RegisterKind, u16), usize>,
    failures: usize,
    /// Registers echoed to every password
    pub password_echo: [u16; 2],
    pub passwords: Vec<u32>,
    pub writes: Vec<(u16, Vec<u16>)>,
    pub fail_writes: bool,
    pub energy_resets: usize,
}

impl MockBus {
    pub fn new() -> Self {
        return MockBus {
            registers: HashMap::new(),
            reads: HashMap::new(),
            failures: 0,
            password_echo: [0, 0],
            passwords: Vec::new(),
            writes: Vec::new(),
            fail_writes: false,
            energy_resets: 0,
        };
    }

    pub fn set_registers(&mut self, kind: RegisterKind, address: u16, values: &[u16]) {
        self.registers.insert((kind, address), values.to_vec());
    }

    /// Time out the next `count` transactions of any kind.
    pub fn fail_next(&mut self, count: usize) {
        self.failures = count;
    }

    pub fn reads(&self, kind: RegisterKind, address: u16) -> usize {
        return *self.reads.get(&(kind, address)).unwrap_or(&0);
    }

    fn transaction(&mut self) -> Result<(), BusError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(BusError::Io(timeout()));
        }
        Ok(())
    }
}

#[async_trait]
impl RegisterBus for MockBus {
    async fn read_registers(&mut self, kind: RegisterKind, address: u16, count: u16) -> Result<Vec<u16>, BusError> {
        *self.reads.entry((kind, address)).or_insert(0) += 1;
        self.transaction()?;

        let block = self.registers.get(&(kind, address)).ok_or(BusError::Exception(0x02))?;
        let count = count as usize;
        if block.len() < count {
            return Err(BusError::ShortResponse { expected: count, actual: block.len() });
        }
        return Ok(block[..count].to_vec());
    }

    async fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), BusError> {
        self.transaction()?;
        if self.fail_writes {
            return Err(BusError::Io(timeout()));
        }
        self.writes.push((address, values.to_vec()));
        Ok(())
    }

    async fn write_password(&mut self, password: u32) -> Result<[u16; 2], BusError> {
        self.transaction()?;
        self.passwords.push(password);
        return Ok(self.password_echo);
    }

    async fn reset_energy(&mut self) -> Result<(), BusError> {
        self.transaction()?;
        self.energy_resets += 1;
        Ok(())
    }
}

pub struct MockLink {
    pub up: bool,
    pub fail_send: bool,
    pub sent: Vec<Vec<u8>>,
    pub inbox: VecDeque<Vec<u8>>,
}

impl MockLink {
    pub fn new() -> Self {
        return MockLink { up: true, fail_send: false, sent: Vec::new(), inbox: VecDeque::new() };
    }
}

impl DatagramLink for MockLink {
    fn is_up(&self) -> bool {
        return self.up;
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.up || self.fail_send {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "mock send failure"));
        }
        self.sent.push(data.to_vec());
        Ok(())
    }

    fn try_receive(&mut self) -> io::Result<Option<Vec<u8>>> {
        return Ok(self.inbox.pop_front());
    }
}

/// Clock whose uptime and wall time only move when told to.
pub struct MockClock {
    uptime: Duration,
    wall: WallTime,
    pub sets: Vec<WallTime>,
}

impl MockClock {
    pub fn new(wall: WallTime) -> Self {
        return MockClock { uptime: Duration::from_secs(60), wall, sets: Vec::new() };
    }

    pub fn advance(&mut self, duration: Duration) {
        self.uptime += duration;
        self.wall = self.wall.add(duration);
    }
}

impl Clock for MockClock {
    fn uptime(&self) -> Duration {
        return self.uptime;
    }

    fn now(&self) -> WallTime {
        return self.wall;
    }

    fn set(&mut self, time: WallTime) {
        self.sets.push(time);
        self.wall = time;
    }
}
