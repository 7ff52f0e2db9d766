use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::Error;

pub type Cmd = [u8; 2];

// CRC-8, polynomial 0x31, init 0xff. Same for every Sensirion sensor here.
pub(crate) fn crc(data: &[u8]) -> u8 {
    let mut crc = 0xff;

    for byte in data {
        crc ^= byte;

        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ 0x31;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

pub(crate) fn check_crc<E>(data: &[u8]) -> Result<(), Error<E>> {
    match data {
        [a, b, c] if crc(&[*a, *b]) == *c => Ok(()),
        _ => {
            warn!("CRC mismatch");
            Err(Error::InvalidCrc)
        }
    }
}

/// Verifies every 3 byte word of a raw response.
pub(crate) fn check_words<E>(data: &[u8]) -> Result<(), Error<E>> {
    for piece in data.as_chunks::<3>().0 {
        check_crc(piece)?;
    }
    Ok(())
}

/// Big endian word at word index `index` of a raw response.
pub(crate) fn word(raw: &[u8], index: usize) -> u16 {
    u16::from_be_bytes([raw[index * 3], raw[index * 3 + 1]])
}

/// Transport for Sensirion devices: commands followed by CRC protected
/// 16 bit words.
pub struct Sensor<I2C, D> {
    i2c: I2C,
    delay: D,
    addr: u8,
}

impl<I2C, D> Sensor<I2C, D> {
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

impl<I2C: I2c, D: DelayNs> Sensor<I2C, D> {
    pub fn delay_ms(&mut self, ms: u32) {
        if ms > 0 {
            self.delay.delay_ms(ms);
        }
    }

    /// Sends a bare command (16 bit for most devices, 8 bit for SHT4x).
    pub fn write_command(&mut self, cmd: &[u8]) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(self.addr, cmd)?;
        Ok(())
    }

    /// Sends a command with up to two argument words, each followed by its CRC.
    pub fn write_command_with_words(
        &mut self,
        cmd: &Cmd,
        args: &[u16],
    ) -> Result<(), Error<I2C::Error>> {
        let mut buf = [0u8; 8];
        if args.len() > 2 {
            return Err(Error::InvalidArgument);
        }
        buf[..2].copy_from_slice(cmd);
        for (i, arg) in args.iter().enumerate() {
            let bytes = arg.to_be_bytes();
            let at = 2 + i * 3;
            buf[at..at + 2].copy_from_slice(&bytes);
            buf[at + 2] = crc(&bytes);
        }
        self.i2c.write(self.addr, &buf[..2 + args.len() * 3])?;
        Ok(())
    }

    /// Reads without sending a command, used after a command whose result
    /// is fetched later.
    pub fn read_raw(&mut self, response: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        self.i2c.read(self.addr, response)?;
        check_words(response)
    }

    /// Sends `cmd`, waits `wait_ms` and reads a CRC checked response.
    /// Without a wait the two happen in one transaction.
    pub fn read(
        &mut self,
        cmd: &[u8],
        wait_ms: u32,
        response: &mut [u8],
    ) -> Result<(), Error<I2C::Error>> {
        self.read_unchecked(cmd, wait_ms, response)?;
        check_words(response)
    }

    pub fn read_unchecked(
        &mut self,
        cmd: &[u8],
        wait_ms: u32,
        response: &mut [u8],
    ) -> Result<(), Error<I2C::Error>> {
        if wait_ms == 0 {
            self.i2c.write_read(self.addr, cmd, response)?;
        } else {
            self.i2c.write(self.addr, cmd)?;
            self.delay.delay_ms(wait_ms);
            self.i2c.read(self.addr, response)?;
        }
        Ok(())
    }

    pub fn read_word(&mut self, cmd: &Cmd, wait_ms: u32) -> Result<u16, Error<I2C::Error>> {
        let [w] = self.read_words::<1>(cmd, wait_ms)?;
        Ok(w)
    }

    pub fn read_words<const N: usize>(
        &mut self,
        cmd: &Cmd,
        wait_ms: u32,
    ) -> Result<[u16; N], Error<I2C::Error>> {
        let mut result = [0u8; 9];
        let response = result.get_mut(..N * 3).ok_or(Error::InvalidArgument)?;
        self.read(cmd, wait_ms, response)?;

        let mut words = [0u16; N];
        for (i, w) in words.iter_mut().enumerate() {
            *w = word(&result, i);
        }
        Ok(words)
    }

    /// I2C general call reset (address 0x00, byte 0x06). Every device on the
    /// bus that supports it resets; the missing acknowledge is not an error.
    pub fn general_call_reset(&mut self) {
        let _ = self.i2c.write(0x00, &[0x06]);
    }
}
