use std::io;
use std::time::Duration;

use async_trait::async_trait;
use crc16::{State, MODBUS};
use log::{debug, warn};
use rmodbus::{client::ModbusRequest, guess_response_frame_len, ModbusProto};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::config::BusConfig;
use crate::metering::registers::{split_words, BusError, RegisterBus, RegisterKind};

const PASSWORD_FUNCTION: u8 = 0x28;
const PASSWORD_REGISTER: u16 = 0xFE01;
const RESET_ENERGY_FUNCTION: u8 = 0x42;
const EXCEPTION: u8 = 0x80;

/// Byte stream to the serial server carrying the RTU frames.
#[async_trait]
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + Sized {
    async fn open(address: &str, timeout: Duration) -> io::Result<Self>;
}

#[async_trait]
impl Transport for TcpStream {
    async fn open(address: &str, timeout: Duration) -> io::Result<Self> {
        let stream = time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| timed_out())??;
        let _ = stream.set_nodelay(true);
        return Ok(stream);
    }
}

fn timed_out() -> io::Error {
    return io::Error::new(io::ErrorKind::TimedOut, "timed out");
}

fn modbus_error(e: rmodbus::ErrorKind) -> BusError {
    return BusError::Modbus(format!("{:?}", e));
}

fn append_crc(frame: &mut Vec<u8>) {
    let crc = State::<MODBUS>::calculate(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

fn check_crc(frame: &[u8]) -> bool {
    if frame.len() < 4 {
        return false;
    }
    let (data, crc) = frame.split_at(frame.len() - 2);
    return State::<MODBUS>::calculate(data).to_le_bytes() == [crc[0], crc[1]];
}

/// Modbus RTU master for one unit. The connection is opened on the first
/// exchange and reopened after any failure other than a complete exception
/// reply to a vendor function.
pub struct ModbusRtuBus<S: Transport> {
    address: String,
    timeout: Duration,
    unit: u8,
    stream: Option<S>,
}

impl ModbusRtuBus<TcpStream> {
    pub fn connect(config: &BusConfig, unit: u8) -> Self {
        return ModbusRtuBus {
            address: format!("{}:{}", config.host, config.port),
            timeout: Duration::from_millis(config.timeout_ms),
            unit,
            stream: None,
        };
    }
}

impl<S: Transport> ModbusRtuBus<S> {
    pub fn from_stream(stream: S, unit: u8, timeout: Duration) -> Self {
        return ModbusRtuBus { address: String::from("stream"), timeout, unit, stream: Some(stream) };
    }

    async fn stream(&mut self) -> io::Result<&mut S> {
        if self.stream.is_none() {
            let stream = S::open(&self.address, self.timeout).await?;
            debug!("Connected to {}", self.address);
            self.stream = Some(stream);
        }

        return self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "not connected"));
    }

    fn check<T>(&mut self, result: Result<T, BusError>) -> Result<T, BusError> {
        match &result {
            Ok(_) | Err(BusError::Exception(_)) => {}
            Err(e) => {
                /* the rest of a bad frame may still arrive, start over with a clean connection */
                warn!("Exchange with unit {} on {} failed: {}", self.unit, self.address, e);
                self.stream = None;
            }
        }
        return result;
    }

    async fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, BusError> {
        let timeout = self.timeout;
        let stream = self.stream().await?;

        let exchange = async {
            stream.write_all(request).await?;
            stream.flush().await?;

            let mut response = vec![0u8; 3];
            stream.read_exact(&mut response).await?;

            let len = guess_response_frame_len(&response, ModbusProto::Rtu).map_err(modbus_error)? as usize;
            if len > response.len() {
                let mut rest = vec![0u8; len - response.len()];
                stream.read_exact(&mut rest).await?;
                response.extend(rest);
            }

            Ok::<_, BusError>(response)
        };

        return time::timeout(timeout, exchange).await.map_err(|_| timed_out())?;
    }

    /// Vendor specific functions are not known to rmodbus, frame them by hand.
    /// `ok_len` is the length of a normal reply including the CRC. Standard
    /// exceptions are 5 bytes, the password function answers with a full length
    /// frame carrying the exception bit instead.
    async fn transact_custom(&mut self, request: &[u8], ok_len: usize) -> Result<Vec<u8>, BusError> {
        let mut frame = request.to_vec();
        append_crc(&mut frame);

        let timeout = self.timeout;
        let unit = self.unit;
        let stream = self.stream().await?;

        let exchange = async {
            stream.write_all(&frame).await?;
            stream.flush().await?;

            let mut response = vec![0u8; 2];
            stream.read_exact(&mut response).await?;

            if response[0] != unit || response[1] & !EXCEPTION != request[1] {
                return Err(BusError::UnexpectedResponse);
            }

            if response[1] & EXCEPTION != 0 {
                let mut rest = [0u8; 3];
                stream.read_exact(&mut rest).await?;
                response.extend(rest);

                if check_crc(&response) {
                    return Err(BusError::Exception(response[2]));
                }
            }

            if ok_len > response.len() {
                let mut rest = vec![0u8; ok_len - response.len()];
                stream.read_exact(&mut rest).await?;
                response.extend(rest);
            }

            if !check_crc(&response) {
                return Err(BusError::CrcMismatch);
            }

            Ok::<_, BusError>(response)
        };

        return time::timeout(timeout, exchange).await.map_err(|_| timed_out())?;
    }
}

#[async_trait]
impl<S: Transport> RegisterBus for ModbusRtuBus<S> {
    async fn read_registers(&mut self, kind: RegisterKind, address: u16, count: u16) -> Result<Vec<u16>, BusError> {
        let mut mreq = ModbusRequest::new(self.unit, ModbusProto::Rtu);
        let mut request = Vec::new();

        match kind {
            RegisterKind::Holding => mreq.generate_get_holdings(address, count, &mut request),
            RegisterKind::Input => mreq.generate_get_inputs(address, count, &mut request),
        }
        .map_err(modbus_error)?;

        let result = self.transact(&request).await.and_then(|response| {
            let mut data = Vec::new();
            mreq.parse_u16(&response, &mut data).map_err(modbus_error)?;
            Ok(data)
        });
        return self.check(result);
    }

    async fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), BusError> {
        let mut mreq = ModbusRequest::new(self.unit, ModbusProto::Rtu);
        let mut request = Vec::new();
        mreq.generate_set_holdings_bulk(address, values, &mut request).map_err(modbus_error)?;

        let result = self
            .transact(&request)
            .await
            .and_then(|response| mreq.parse_ok(&response).map_err(modbus_error));
        return self.check(result);
    }

    /// `## 28 FE 01 00 02 04 pp pp pp pp`, answered by `## 28 FE 01 00 01` on success
    /// or `## A8 FE 01 00 02` on failure.
    async fn write_password(&mut self, password: u32) -> Result<[u16; 2], BusError> {
        let mut request = vec![self.unit, PASSWORD_FUNCTION];
        request.extend_from_slice(&PASSWORD_REGISTER.to_be_bytes());
        request.extend_from_slice(&2u16.to_be_bytes());
        request.push(4);
        for word in split_words(password) {
            request.extend_from_slice(&word.to_be_bytes());
        }

        let result = self.transact_custom(&request, 8).await;
        let response = self.check(result)?;
        if response.len() < 8 {
            return Err(BusError::UnexpectedResponse);
        }

        let register = u16::from_be_bytes([response[2], response[3]]);
        let value = u16::from_be_bytes([response[4], response[5]]);
        if response[1] & EXCEPTION != 0 {
            debug!("Password rejected, response {:04X} {:04X}", register, value);
        }
        return Ok([register, value]);
    }

    async fn reset_energy(&mut self) -> Result<(), BusError> {
        let request = [self.unit, RESET_ENERGY_FUNCTION];
        let result = self.transact_custom(&request, 4).await;
        self.check(result)?;
        Ok(())
    }
}
