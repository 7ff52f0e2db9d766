//! ENV III (SHT30 + QMP6988) and ENV IV (SHT40 + BMP280) units.
//!
//! A unit has no I/O of its own. It owns both sensor drivers and forwards
//! `begin` and `update` to them. Both sensors sit on the same bus, which can
//! be shared through [`RefCellDevice`] with [`Env3::new_shared`] and
//! [`Env4::new_shared`].

use core::cell::RefCell;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;

use crate::bmp280::{self, Bmp280};
use crate::component::Component;
use crate::qmp6988::{self, Qmp6988};
use crate::sht3x::{self, Sht3x};
use crate::sht4x::{self, Sht4x};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Env3Config {
    pub sht30: sht3x::Config,
    pub qmp6988: qmp6988::Config,
}

pub struct Env3<I2C, D, const N: usize = 1> {
    pub sht30: Sht3x<I2C, D, N>,
    pub qmp6988: Qmp6988<I2C, D, N>,
}

impl<I2C, D, const N: usize> Env3<I2C, D, N> {
    /// Each sensor gets its own bus handle and delay.
    pub fn new(
        sht30_i2c: I2C,
        qmp6988_i2c: I2C,
        sht30_delay: D,
        qmp6988_delay: D,
        config: Env3Config,
    ) -> Self {
        Self {
            sht30: Sht3x::new(sht30_i2c, sht30_delay, config.sht30),
            qmp6988: Qmp6988::new(qmp6988_i2c, qmp6988_delay, config.qmp6988),
        }
    }

    pub fn release(self) -> ((I2C, D), (I2C, D)) {
        (self.sht30.release(), self.qmp6988.release())
    }
}

impl<'a, BUS, D, const N: usize> Env3<RefCellDevice<'a, BUS>, D, N> {
    pub fn new_shared(
        bus: &'a RefCell<BUS>,
        sht30_delay: D,
        qmp6988_delay: D,
        config: Env3Config,
    ) -> Self {
        Self::new(
            RefCellDevice::new(bus),
            RefCellDevice::new(bus),
            sht30_delay,
            qmp6988_delay,
            config,
        )
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Component for Env3<I2C, D, N> {
    type Error = Error<I2C::Error>;

    const NAME: &'static str = "UnitENVIII";
    const DEFAULT_ADDRESS: u8 = 0x00;

    fn address(&self) -> u8 {
        Self::DEFAULT_ADDRESS
    }

    fn begin(&mut self) -> Result<(), Self::Error> {
        self.sht30.begin()?;
        self.qmp6988.begin()
    }

    fn update(&mut self, now_ms: u64, force: bool) -> Result<bool, Self::Error> {
        let sht30 = self.sht30.update(now_ms, force)?;
        let qmp6988 = self.qmp6988.update(now_ms, force)?;
        Ok(sht30 || qmp6988)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Env4Config {
    pub sht40: sht4x::Config,
    pub bmp280: bmp280::Config,
}

pub struct Env4<I2C, D, const N: usize = 1> {
    pub sht40: Sht4x<I2C, D, N>,
    pub bmp280: Bmp280<I2C, D, N>,
}

impl<I2C, D, const N: usize> Env4<I2C, D, N> {
    pub fn new(
        sht40_i2c: I2C,
        bmp280_i2c: I2C,
        sht40_delay: D,
        bmp280_delay: D,
        config: Env4Config,
    ) -> Self {
        Self {
            sht40: Sht4x::new(sht40_i2c, sht40_delay, config.sht40),
            bmp280: Bmp280::new(bmp280_i2c, bmp280_delay, config.bmp280),
        }
    }

    pub fn release(self) -> ((I2C, D), (I2C, D)) {
        (self.sht40.release(), self.bmp280.release())
    }
}

impl<'a, BUS, D, const N: usize> Env4<RefCellDevice<'a, BUS>, D, N> {
    pub fn new_shared(
        bus: &'a RefCell<BUS>,
        sht40_delay: D,
        bmp280_delay: D,
        config: Env4Config,
    ) -> Self {
        Self::new(
            RefCellDevice::new(bus),
            RefCellDevice::new(bus),
            sht40_delay,
            bmp280_delay,
            config,
        )
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Component for Env4<I2C, D, N> {
    type Error = Error<I2C::Error>;

    const NAME: &'static str = "UnitENVIV";
    const DEFAULT_ADDRESS: u8 = 0x00;

    fn address(&self) -> u8 {
        Self::DEFAULT_ADDRESS
    }

    fn begin(&mut self) -> Result<(), Self::Error> {
        self.sht40.begin()?;
        self.bmp280.begin()
    }

    fn update(&mut self, now_ms: u64, force: bool) -> Result<bool, Self::Error> {
        let sht40 = self.sht40.update(now_ms, force)?;
        let bmp280 = self.bmp280.update(now_ms, force)?;
        Ok(sht40 || bmp280)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_utils::{DummyBus, NoDelay, RegisterBus, SplitBus, words};
    use crate::periodic::PeriodicMeasurement;

    #[test]
    fn test_env3_shared_bus() {
        let mut registers = RegisterBus::new(qmp6988::ADDR);
        registers.set(
            qmp6988::registers::CHIP_ID,
            &[qmp6988::registers::CHIP_IDENTIFIER],
        );
        let sample = words(&[0x6666, 0x8000]);
        let bus = RefCell::new(SplitBus {
            commands: DummyBus::new(&[&sample]),
            registers,
        });

        let mut env: Env3<_, _, 2> =
            Env3::new_shared(&bus, NoDelay::default(), NoDelay::default(), Env3Config::default());
        env.begin().unwrap();
        assert!(env.sht30.in_periodic());
        assert!(env.qmp6988.in_periodic());
        assert_eq!(env.address(), 0);

        assert_eq!(env.update(0, false), Ok(true));
        assert!(env.sht30.updated());
        assert!(env.qmp6988.updated());
        assert!((env.sht30.latest().unwrap().celsius() - 25.0).abs() < 0.01);

        // both run at 1 s
        assert_eq!(env.update(500, false), Ok(false));
        // QMP6988 runs at 1 s, the SHT30 does not acknowledge the fetch
        assert_eq!(env.update(1000, false), Ok(true));
        assert!(!env.sht30.updated());
        assert_eq!(env.qmp6988.available(), 2);

        drop(env);
        let bus = bus.into_inner();
        assert_eq!(
            bus.commands.writes.first(),
            Some(&(sht3x::ADDR, vec![0x30, 0x93]))
        );
    }

    #[test]
    fn test_env3_begin_stops_at_missing_sensor() {
        let bus = RefCell::new(SplitBus {
            commands: DummyBus::default(),
            registers: RegisterBus::new(qmp6988::ADDR),
        });
        let mut env: Env3<_, _> =
            Env3::new_shared(&bus, NoDelay::default(), NoDelay::default(), Env3Config::default());
        assert_eq!(env.begin(), Err(Error::UnsupportedDevice));
        assert!(env.sht30.in_periodic());
        assert!(!env.qmp6988.in_periodic());
    }

    #[test]
    fn test_env4_shared_bus() {
        let mut registers = RegisterBus::new(bmp280::ADDR);
        registers.set(
            bmp280::registers::CHIP_ID,
            &[bmp280::registers::CHIP_IDENTIFIER],
        );
        let serial = words(&[0x1234, 0x5678]);
        let sample = words(&[0x6666, 0x8000]);
        let bus = RefCell::new(SplitBus {
            commands: DummyBus::new(&[&serial, &sample]),
            registers,
        });

        let mut env: Env4<_, _, 2> =
            Env4::new_shared(&bus, NoDelay::default(), NoDelay::default(), Env4Config::default());
        env.begin().unwrap();
        assert!(env.sht40.in_periodic());
        assert!(env.bmp280.in_periodic());

        assert_eq!(env.update(0, false), Ok(true));
        assert!((env.sht40.latest().unwrap().celsius() - 25.0).abs() < 0.01);
        assert_eq!(env.bmp280.available(), 1);

        let ((sht40_bus, _), (bmp280_bus, _)) = env.release();
        drop((sht40_bus, bmp280_bus));
        let bus = bus.into_inner();
        assert_eq!(bus.registers.written_to(bmp280::registers::SOFT_RESET), [0xb6]);
        assert_eq!(bus.commands.pending(), 0);
    }
}
