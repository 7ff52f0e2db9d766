//! SHT30 temperature and humidity sensor.

use core::fmt;
use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use heapless::String;

use crate::component::Component;
use crate::periodic::{Periodic, PeriodicMeasurement};
use crate::sensirion::{Cmd, Sensor, word};
use crate::Error;

pub mod commands;

pub const ADDR: u8 = 0x44;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Repeatability {
    #[default]
    High,
    Medium,
    Low,
}

impl Repeatability {
    /// Measurement duration without clock stretching.
    fn duration(self) -> u32 {
        match self {
            Repeatability::High => 15,
            Repeatability::Medium => 6,
            Repeatability::Low => 4,
        }
    }

    fn single_shot_command(self, stretch: bool) -> &'static Cmd {
        match (self, stretch) {
            (Repeatability::High, true) => &commands::SINGLE_SHOT_ENABLE_STRETCH_HIGH,
            (Repeatability::Medium, true) => &commands::SINGLE_SHOT_ENABLE_STRETCH_MEDIUM,
            (Repeatability::Low, true) => &commands::SINGLE_SHOT_ENABLE_STRETCH_LOW,
            (Repeatability::High, false) => &commands::SINGLE_SHOT_DISABLE_STRETCH_HIGH,
            (Repeatability::Medium, false) => &commands::SINGLE_SHOT_DISABLE_STRETCH_MEDIUM,
            (Repeatability::Low, false) => &commands::SINGLE_SHOT_DISABLE_STRETCH_LOW,
        }
    }
}

/// Measurements per second in periodic mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mps {
    Half,
    #[default]
    One,
    Two,
    Four,
    Ten,
}

impl Mps {
    pub fn interval(self) -> u32 {
        match self {
            Mps::Half => 2000,
            Mps::One => 1000,
            Mps::Two => 500,
            Mps::Four => 250,
            Mps::Ten => 100,
        }
    }

    fn periodic_command(self, rep: Repeatability) -> &'static Cmd {
        &commands::START_PERIODIC[self as usize][rep as usize]
    }
}

/// Status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status(pub u16);

impl Status {
    pub fn alert_pending(&self) -> bool {
        self.0 & (1 << 15) != 0
    }

    pub fn heater(&self) -> bool {
        self.0 & (1 << 13) != 0
    }

    pub fn tracking_alert_rh(&self) -> bool {
        self.0 & (1 << 11) != 0
    }

    pub fn tracking_alert_t(&self) -> bool {
        self.0 & (1 << 10) != 0
    }

    /// System reset detected since the last clear.
    pub fn reset(&self) -> bool {
        self.0 & (1 << 4) != 0
    }

    /// Last command was not processed.
    pub fn command(&self) -> bool {
        self.0 & (1 << 1) != 0
    }

    /// Checksum of the last write transfer failed.
    pub fn checksum(&self) -> bool {
        self.0 & 1 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub start_periodic: bool,
    pub mps: Mps,
    pub repeatability: Repeatability,
    pub start_heater: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_periodic: true,
            mps: Mps::One,
            repeatability: Repeatability::High,
            start_heater: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data {
    pub raw: [u8; 6],
}

impl Data {
    pub fn celsius(&self) -> f32 {
        -45.0 + 175.0 * word(&self.raw, 0) as f32 / 65535.0
    }

    pub fn fahrenheit(&self) -> f32 {
        self.celsius() * 9.0 / 5.0 + 32.0
    }

    pub fn humidity(&self) -> f32 {
        100.0 * word(&self.raw, 1) as f32 / 65536.0
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.1}°C, {:.1}% RH", self.celsius(), self.humidity())
    }
}

pub struct Sht3x<I2C, D, const N: usize = 1> {
    sensor: Sensor<I2C, D>,
    config: Config,
    periodic: Periodic<Data, N>,
}

impl<I2C, D, const N: usize> Sht3x<I2C, D, N> {
    pub fn new(i2c: I2C, delay: D, config: Config) -> Self {
        Self::with_address(i2c, delay, config, ADDR)
    }

    /// The SHT30 answers on 0x45 when ADDR is pulled high.
    pub fn with_address(i2c: I2C, delay: D, config: Config, address: u8) -> Self {
        Self {
            sensor: Sensor::new(i2c, delay, address),
            config,
            periodic: Periodic::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn release(self) -> (I2C, D) {
        self.sensor.release()
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Sht3x<I2C, D, N> {
    fn ensure_idle(&self) -> Result<(), Error<I2C::Error>> {
        if self.periodic.in_periodic() {
            debug!("periodic measurement is running");
            return Err(Error::PeriodicRunning);
        }
        Ok(())
    }

    fn command(&mut self, cmd: &Cmd, wait_ms: u32) -> Result<(), Error<I2C::Error>> {
        self.sensor.write_command(cmd)?;
        self.sensor.delay_ms(wait_ms);
        Ok(())
    }

    fn read_measurement(&mut self) -> Result<Data, Error<I2C::Error>> {
        let mut data = Data::default();
        self.sensor.read_raw(&mut data.raw)?;
        Ok(data)
    }

    /// Single shot measurement. With clock stretching the sensor holds SCL
    /// until the result is ready.
    pub fn measure_single_shot(
        &mut self,
        rep: Repeatability,
        stretch: bool,
    ) -> Result<Data, Error<I2C::Error>> {
        self.ensure_idle()?;
        let wait = if stretch {
            commands::COMMAND_DURATION
        } else {
            rep.duration()
        };
        self.command(rep.single_shot_command(stretch), wait)?;
        self.read_measurement()
    }

    pub fn start_periodic_measurement(
        &mut self,
        mps: Mps,
        rep: Repeatability,
    ) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        self.command(mps.periodic_command(rep), commands::START_PERIODIC_DURATION)?;
        self.periodic.start(mps.interval());
        debug!("periodic measurement started");
        Ok(())
    }

    /// Aborts the ongoing measurement and returns to single shot mode.
    /// Also accepted when no periodic measurement runs.
    pub fn stop_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.command(
            &commands::STOP_PERIODIC_MEASUREMENT,
            commands::COMMAND_DURATION,
        )?;
        self.periodic.stop();
        Ok(())
    }

    /// Accelerated response time: 4 measurements per second.
    pub fn write_mode_accelerate_response_time(&mut self) -> Result<(), Error<I2C::Error>> {
        if !self.periodic.in_periodic() {
            return Err(Error::NotPeriodic);
        }
        self.command(
            &commands::ACCELERATED_RESPONSE_TIME,
            commands::START_PERIODIC_DURATION,
        )?;
        self.periodic.set_interval(Mps::Four.interval());
        Ok(())
    }

    pub fn read_status(&mut self) -> Result<Status, Error<I2C::Error>> {
        Ok(Status(self.sensor.read_word(&commands::READ_STATUS, 0)?))
    }

    pub fn clear_status(&mut self) -> Result<(), Error<I2C::Error>> {
        self.command(&commands::CLEAR_STATUS, commands::COMMAND_DURATION)
    }

    pub fn soft_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        self.command(&commands::SOFT_RESET, commands::SOFT_RESET_DURATION)
    }

    /// Reset through the I2C general call. Every device on the bus that
    /// supports general call resets as well.
    pub fn general_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.clear_status()?;
        self.sensor.general_call_reset();
        self.sensor.delay_ms(1);

        for _ in 0..=commands::GENERAL_RESET_TIMEOUT {
            // The alert flag is raised after power up and after resets too.
            if let Ok(status) = self.read_status() {
                if status.reset() || status.alert_pending() {
                    self.periodic.stop();
                    return Ok(());
                }
            }
            self.sensor.delay_ms(1);
        }
        Err(Error::Timeout)
    }

    pub fn start_heater(&mut self) -> Result<(), Error<I2C::Error>> {
        self.command(&commands::START_HEATER, commands::COMMAND_DURATION)
    }

    pub fn stop_heater(&mut self) -> Result<(), Error<I2C::Error>> {
        self.command(&commands::STOP_HEATER, commands::COMMAND_DURATION)
    }

    pub fn read_serial_number(&mut self) -> Result<u32, Error<I2C::Error>> {
        self.ensure_idle()?;
        let [high, low] = self
            .sensor
            .read_words::<2>(&commands::GET_SERIAL_NUMBER_ENABLE_STRETCH, 0)?;
        Ok((high as u32) << 16 | low as u32)
    }

    /// Serial number as 8 upper case hex digits.
    pub fn read_serial_number_string(&mut self) -> Result<String<8>, Error<I2C::Error>> {
        let serial = self.read_serial_number()?;
        let mut s = String::new();
        write!(s, "{:08X}", serial).map_err(|_| Error::InvalidResponse)?;
        Ok(s)
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Component for Sht3x<I2C, D, N> {
    type Error = Error<I2C::Error>;

    const NAME: &'static str = "UnitSHT30";
    const DEFAULT_ADDRESS: u8 = ADDR;

    fn address(&self) -> u8 {
        self.sensor.address()
    }

    fn begin(&mut self) -> Result<(), Self::Error> {
        self.stop_periodic_measurement()?;
        self.soft_reset()?;
        if self.config.start_heater {
            self.start_heater()?;
        } else {
            self.stop_heater()?;
        }
        if self.config.start_periodic {
            self.start_periodic_measurement(self.config.mps, self.config.repeatability)?;
        }
        Ok(())
    }

    fn update(&mut self, now_ms: u64, force: bool) -> Result<bool, Self::Error> {
        self.periodic.begin_update();
        if !self.periodic.due(now_ms, force) {
            return Ok(false);
        }
        self.sensor.write_command(&commands::READ_MEASUREMENT)?;
        match self.read_measurement() {
            Ok(data) => {
                self.periodic.store(now_ms, data);
                Ok(true)
            }
            // No data since the last fetch, the sensor does not acknowledge.
            Err(Error::I2c(e)) if matches!(e.kind(), ErrorKind::NoAcknowledge(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl<I2C, D, const N: usize> PeriodicMeasurement<N> for Sht3x<I2C, D, N> {
    type Data = Data;

    fn periodic(&self) -> &Periodic<Data, N> {
        &self.periodic
    }

    fn periodic_mut(&mut self) -> &mut Periodic<Data, N> {
        &mut self.periodic
    }
}
