use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::Error;

/// Transport for devices with an 8 bit register map. Reads auto-increment,
/// writes go out as register/value pairs.
pub struct Registers<I2C, D> {
    i2c: I2C,
    delay: D,
    addr: u8,
}

impl<I2C, D> Registers<I2C, D> {
    pub fn new(i2c: I2C, delay: D, addr: u8) -> Self {
        Self { i2c, delay, addr }
    }

    pub fn address(&self) -> u8 {
        self.addr
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

impl<I2C: I2c, D: DelayNs> Registers<I2C, D> {
    pub fn delay_ms(&mut self, ms: u32) {
        if ms > 0 {
            self.delay.delay_ms(ms);
        }
    }

    pub fn delay_us(&mut self, us: u32) {
        if us > 0 {
            self.delay.delay_us(us);
        }
    }

    pub fn read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        self.i2c.write_read(self.addr, &[reg], buf)?;
        Ok(())
    }

    pub fn read_u8(&mut self, reg: u8) -> Result<u8, Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.read(reg, &mut buf)?;
        Ok(buf[0])
    }

    pub fn write_u8(&mut self, reg: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(self.addr, &[reg, value])?;
        Ok(())
    }

    /// Writes several registers in one transaction.
    pub fn write_pairs<const N: usize>(
        &mut self,
        pairs: &[(u8, u8); N],
    ) -> Result<(), Error<I2C::Error>> {
        let mut buf = [0u8; 32];
        let out = buf.get_mut(..N * 2).ok_or(Error::InvalidArgument)?;
        for (chunk, (reg, value)) in out.chunks_exact_mut(2).zip(pairs) {
            chunk[0] = *reg;
            chunk[1] = *value;
        }
        self.i2c.write(self.addr, out)?;
        Ok(())
    }

    /// Read-modify-write of the bits selected by `mask`.
    pub fn update_bits(&mut self, reg: u8, mask: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        let current = self.read_u8(reg)?;
        self.write_u8(reg, (current & !mask) | (value & mask))
    }

    /// Polls `reg` every millisecond until `done` accepts its value.
    pub fn poll_u8(
        &mut self,
        reg: u8,
        timeout_ms: u32,
        done: impl Fn(u8) -> bool,
    ) -> Result<u8, Error<I2C::Error>> {
        for _ in 0..=timeout_ms {
            let value = self.read_u8(reg)?;
            if done(value) {
                return Ok(value);
            }
            self.delay.delay_ms(1);
        }
        Err(Error::Timeout)
    }
}
