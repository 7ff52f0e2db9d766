use std::collections::VecDeque;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DummyError {
    InvalidTest,
    Nack,
}

impl Error for DummyError {
    fn kind(&self) -> ErrorKind {
        match &self {
            DummyError::InvalidTest => ErrorKind::Other,
            DummyError::Nack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
        }
    }
}

/// Scripted bus for command based devices. Every read consumes the next
/// queued response, every write is recorded. Reads past the end of the
/// script are not acknowledged, like a device without data.
#[derive(Debug, Default)]
pub struct DummyBus {
    responses: VecDeque<Vec<u8>>,
    pub writes: Vec<(u8, Vec<u8>)>,
    pub nack_address: Option<u8>,
}

impl DummyBus {
    pub fn new(responses: &[&[u8]]) -> Self {
        Self {
            responses: responses.iter().map(|r| r.to_vec()).collect(),
            ..Default::default()
        }
    }

    pub fn push_response(&mut self, response: &[u8]) {
        self.responses.push_back(response.to_vec());
    }

    pub fn pending(&self) -> usize {
        self.responses.len()
    }

    /// Written bytes without addresses.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.writes.iter().map(|(_, w)| w.clone()).collect()
    }
}

impl ErrorType for DummyBus {
    type Error = DummyError;
}

impl I2c for DummyBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.nack_address == Some(address) {
            return Err(DummyError::Nack);
        }

        for op in operations {
            match op {
                Operation::Write(bytes) => self.writes.push((address, bytes.to_vec())),
                Operation::Read(buffer) => {
                    let response = self.responses.pop_front().ok_or(DummyError::Nack)?;
                    if response.len() != buffer.len() {
                        return Err(DummyError::InvalidTest);
                    }
                    buffer.copy_from_slice(&response);
                }
            }
        }

        Ok(())
    }
}

pub type WriteHook = fn(&mut [u8; 256], u8, u8);

/// Register file of a single device. Reads auto-increment from the last
/// written register, writes are register/value pairs.
pub struct RegisterBus {
    pub address: u8,
    pub regs: [u8; 256],
    pub writes: Vec<(u8, u8)>,
    pub on_write: Option<WriteHook>,
    pointer: u8,
}

impl RegisterBus {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            regs: [0; 256],
            writes: Vec::new(),
            on_write: None,
            pointer: 0,
        }
    }

    pub fn with_hook(mut self, hook: WriteHook) -> Self {
        self.on_write = Some(hook);
        self
    }

    pub fn set(&mut self, reg: u8, values: &[u8]) {
        for (i, v) in values.iter().enumerate() {
            self.regs[reg as usize + i] = *v;
        }
    }

    pub fn written_to(&self, reg: u8) -> Vec<u8> {
        self.writes
            .iter()
            .filter(|(r, _)| *r == reg)
            .map(|(_, v)| *v)
            .collect()
    }
}

impl ErrorType for RegisterBus {
    type Error = DummyError;
}

impl I2c for RegisterBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(DummyError::Nack);
        }

        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    let Some((&first, rest)) = bytes.split_first() else {
                        continue;
                    };
                    self.pointer = first;
                    let mut reg = first;
                    for (i, value) in rest.iter().enumerate() {
                        if i % 2 == 1 {
                            reg = *value;
                            continue;
                        }
                        self.regs[reg as usize] = *value;
                        self.writes.push((reg, *value));
                        if let Some(hook) = self.on_write {
                            hook(&mut self.regs, reg, *value);
                        }
                    }
                }
                Operation::Read(buffer) => {
                    for b in buffer.iter_mut() {
                        *b = self.regs[self.pointer as usize];
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
            }
        }

        Ok(())
    }
}

/// Routes one address to a register device and everything else to a
/// scripted bus.
pub struct SplitBus {
    pub commands: DummyBus,
    pub registers: RegisterBus,
}

impl ErrorType for SplitBus {
    type Error = DummyError;
}

impl I2c for SplitBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address == self.registers.address {
            self.registers.transaction(address, operations)
        } else {
            self.commands.transaction(address, operations)
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay {
    pub elapsed_ns: u64,
}

impl NoDelay {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += ns as u64;
    }
}

/// Sensirion CRC, for building response vectors.
pub fn crc8(data: &[u8]) -> u8 {
    crate::sensirion::crc(data)
}

/// Encodes words as a Sensirion response (each word followed by its CRC).
pub fn words(values: &[u16]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        let b = v.to_be_bytes();
        out.extend_from_slice(&b);
        out.push(crc8(&b));
    }
    out
}
