//! SCD40 / SCD41 CO2, temperature and humidity sensors.
//!
//! The model is chosen at the type level: `Scd4x<I2C, D, Scd40>` or
//! `Scd4x<I2C, D, Scd41>`. Single shot measurements and power management
//! only exist on the SCD41.

use core::fmt;
use core::fmt::Write as _;
use core::marker::PhantomData;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use heapless::String;

use crate::component::Component;
use crate::periodic::{Periodic, PeriodicMeasurement};
use crate::sensirion::{Sensor, check_words, word};
use crate::Error;

pub mod commands;

pub const ADDR: u8 = 0x62;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Variant {
    SCD40,
    SCD41,
    SCD43,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Type level model marker.
pub trait Model {
    const VARIANT: Variant;
    const NAME: &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scd40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scd41;

impl Model for Scd40 {
    const VARIANT: Variant = Variant::SCD40;
    const NAME: &'static str = "UnitSCD40";
}

impl Model for Scd41 {
    const VARIANT: Variant = Variant::SCD41;
    const NAME: &'static str = "UnitSCD41";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// 5 second signal update interval.
    #[default]
    Normal,
    /// Approximately 30 second signal update interval.
    LowPower,
}

impl Mode {
    fn command(self) -> &'static [u8; 2] {
        match self {
            Mode::Normal => &commands::START_PERIODIC_MEASUREMENT,
            Mode::LowPower => &commands::START_LOW_POWER_PERIODIC_MEASUREMENT,
        }
    }

    pub fn interval(self) -> u32 {
        match self {
            Mode::Normal => 5000,
            Mode::LowPower => 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub start_periodic: bool,
    pub mode: Mode,
    /// Automatic self calibration.
    pub calibration: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_periodic: true,
            mode: Mode::Normal,
            calibration: true,
        }
    }
}

/// Raw measurement: CO2, temperature and humidity words with their CRCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data {
    pub raw: [u8; 9],
}

impl Data {
    pub fn co2(&self) -> u16 {
        word(&self.raw, 0)
    }

    pub fn celsius(&self) -> f32 {
        -45.0 + temperature_from_raw(word(&self.raw, 1))
    }

    pub fn fahrenheit(&self) -> f32 {
        self.celsius() * 9.0 / 5.0 + 32.0
    }

    pub fn humidity(&self) -> f32 {
        100.0 * word(&self.raw, 2) as f32 / 65536.0
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ppm CO2, {:.1}°C, {:.1}% RH",
            self.co2(),
            self.celsius(),
            self.humidity()
        )
    }
}

const TEMPERATURE_OFFSET_MAX: f32 = 175.0;
const AMBIENT_PRESSURE_RANGE: core::ops::RangeInclusive<u16> = 700..=1200;

fn temperature_from_raw(raw: u16) -> f32 {
    raw as f32 * 175.0 / 65536.0
}

fn temperature_to_raw(celsius: f32) -> u16 {
    (celsius * 65536.0 / 175.0) as u16
}

pub struct Scd4x<I2C, D, M = Scd40, const N: usize = 1> {
    sensor: Sensor<I2C, D>,
    config: Config,
    periodic: Periodic<Data, N>,
    _model: PhantomData<M>,
}

impl<I2C, D, M, const N: usize> Scd4x<I2C, D, M, N> {
    pub fn new(i2c: I2C, delay: D, config: Config) -> Self {
        Self {
            sensor: Sensor::new(i2c, delay, ADDR),
            config,
            periodic: Periodic::new(),
            _model: PhantomData,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn release(self) -> (I2C, D) {
        self.sensor.release()
    }
}

impl<I2C: I2c, D: DelayNs, M: Model, const N: usize> Scd4x<I2C, D, M, N> {
    fn ensure_idle(&self) -> Result<(), Error<I2C::Error>> {
        if self.periodic.in_periodic() {
            debug!("periodic measurement is running");
            return Err(Error::PeriodicRunning);
        }
        Ok(())
    }

    fn write_word(&mut self, cmd: &[u8; 2], value: u16) -> Result<(), Error<I2C::Error>> {
        self.sensor.write_command_with_words(cmd, &[value])?;
        self.sensor.delay_ms(commands::COMMAND_DURATION);
        Ok(())
    }

    /// Starts periodic measurement in `mode`.
    pub fn start_periodic_measurement(&mut self, mode: Mode) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        self.sensor.write_command(mode.command())?;
        self.periodic.start(mode.interval());
        debug!("periodic measurement started");
        Ok(())
    }

    /// Command returns a sensor running in periodic measurement mode or low power
    /// periodic measurement mode back to the idle state, e.g. to then allow
    /// changing the sensor configuration or to save power.
    /// Note that the sensor will only respond to other commands 500 ms after the
    /// stop_periodic_measurement command has been issued; this call waits for it.
    pub fn stop_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        if !self.periodic.in_periodic() {
            return Err(Error::NotPeriodic);
        }
        self.sensor
            .write_command(&commands::STOP_PERIODIC_MEASUREMENT)?;
        self.periodic.stop();
        self.sensor
            .delay_ms(commands::STOP_PERIODIC_MEASUREMENT_DURATION);
        Ok(())
    }

    /// The temperature offset has no influence on the CO2 accuracy. Valid
    /// range is `0.0..175.0` °C.
    pub fn write_temperature_offset(&mut self, offset: f32) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        if !(0.0..TEMPERATURE_OFFSET_MAX).contains(&offset) {
            warn!("temperature offset out of range");
            return Err(Error::InvalidArgument);
        }
        self.write_word(
            &commands::SET_TEMPERATURE_OFFSET,
            temperature_to_raw(offset),
        )
    }

    pub fn read_temperature_offset(&mut self) -> Result<f32, Error<I2C::Error>> {
        self.ensure_idle()?;
        let raw = self
            .sensor
            .read_word(&commands::GET_TEMPERATURE_OFFSET, commands::COMMAND_DURATION)?;
        Ok(temperature_from_raw(raw))
    }

    /// Sensor altitude in meters above sea level.
    pub fn write_sensor_altitude(&mut self, altitude: u16) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        self.write_word(&commands::SET_SENSOR_ALTITUDE, altitude)
    }

    pub fn read_sensor_altitude(&mut self) -> Result<u16, Error<I2C::Error>> {
        self.ensure_idle()?;
        self.sensor
            .read_word(&commands::GET_SENSOR_ALTITUDE, commands::COMMAND_DURATION)
    }

    /// Ambient pressure in hPa (700 to 1200). Overrides the altitude
    /// compensation and may be issued during periodic measurement.
    pub fn write_ambient_pressure(&mut self, pressure: u16) -> Result<(), Error<I2C::Error>> {
        if !AMBIENT_PRESSURE_RANGE.contains(&pressure) {
            warn!("ambient pressure out of range {}", pressure);
            return Err(Error::InvalidArgument);
        }
        self.write_word(&commands::AMBIENT_PRESSURE, pressure)
    }

    pub fn read_ambient_pressure(&mut self) -> Result<u16, Error<I2C::Error>> {
        self.sensor
            .read_word(&commands::AMBIENT_PRESSURE, commands::COMMAND_DURATION)
    }

    /// Forced recalibration to `concentration` ppm. Returns the FRC
    /// correction in ppm.
    ///
    /// The sensor must have been operated for more than 3 minutes in the
    /// mode later used, in a homogenous and constant CO2 environment, and
    /// periodic measurement must have been stopped.
    pub fn perform_forced_recalibration(
        &mut self,
        concentration: u16,
    ) -> Result<i16, Error<I2C::Error>> {
        self.ensure_idle()?;
        self.sensor.write_command_with_words(
            &commands::PERFORM_FORCED_RECALIBRATION,
            &[concentration],
        )?;
        self.sensor
            .delay_ms(commands::PERFORM_FORCED_RECALIBRATION_DURATION);

        let mut response = [0u8; 3];
        self.sensor.read_raw(&mut response)?;
        match word(&response, 0) {
            0xffff => {
                error!("forced recalibration failed");
                Err(Error::InvalidResponse)
            }
            raw => Ok(raw.wrapping_sub(0x8000) as i16),
        }
    }

    pub fn write_automatic_self_calibration_enabled(
        &mut self,
        enabled: bool,
    ) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        self.write_word(
            &commands::SET_AUTOMATIC_SELF_CALIBRATION_ENABLED,
            enabled as u16,
        )
    }

    pub fn read_automatic_self_calibration_enabled(&mut self) -> Result<bool, Error<I2C::Error>> {
        self.ensure_idle()?;
        let raw = self.sensor.read_word(
            &commands::GET_AUTOMATIC_SELF_CALIBRATION_ENABLED,
            commands::COMMAND_DURATION,
        )?;
        Ok(raw == 0x0001)
    }

    /// Reference CO2 concentration (ppm) used by the automatic self calibration.
    pub fn write_automatic_self_calibration_target(
        &mut self,
        ppm: u16,
    ) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        self.write_word(&commands::SET_AUTOMATIC_SELF_CALIBRATION_TARGET, ppm)
    }

    pub fn read_automatic_self_calibration_target(&mut self) -> Result<u16, Error<I2C::Error>> {
        self.ensure_idle()?;
        self.sensor.read_word(
            &commands::GET_AUTOMATIC_SELF_CALIBRATION_TARGET,
            commands::COMMAND_DURATION,
        )
    }

    /// Polls the sensor for whether data from a periodic or single shot measurement is ready to be read out.
    pub fn read_data_ready_status(&mut self) -> Result<bool, Error<I2C::Error>> {
        let status = self
            .sensor
            .read_word(&commands::GET_DATA_READY_STATUS, commands::COMMAND_DURATION)?;

        // From the datasheet, if the 11 LSB are 0, data is not ready.
        Ok((status & 0x7FF) != 0)
    }

    /// Stores the configuration in EEPROM so it survives a power cycle.
    pub fn write_persist_settings(&mut self) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        self.sensor.write_command(&commands::PERSIST_SETTINGS)?;
        self.sensor.delay_ms(commands::PERSIST_SETTINGS_DURATION);
        Ok(())
    }

    /// Reading out the serial number can be used to identify the chip and to verify the presence of the sensor.
    pub fn read_serial_number(&mut self) -> Result<u64, Error<I2C::Error>> {
        self.ensure_idle()?;
        let words = self
            .sensor
            .read_words::<3>(&commands::GET_SERIAL_NUMBER, commands::COMMAND_DURATION)?;

        Ok((words[0] as u64) << 32 | (words[1] as u64) << 16 | (words[2] as u64))
    }

    /// Serial number as 12 upper case hex digits.
    pub fn read_serial_number_string(&mut self) -> Result<String<12>, Error<I2C::Error>> {
        let serial = self.read_serial_number()?;
        let mut s = String::new();
        write!(s, "{:012X}", serial).map_err(|_| Error::InvalidResponse)?;
        Ok(s)
    }

    /// End-of-line test of the sensor functionality, takes 10 seconds.
    /// Returns true if no malfunction was detected.
    pub fn perform_self_test(&mut self) -> Result<bool, Error<I2C::Error>> {
        self.ensure_idle()?;
        let status = self
            .sensor
            .read_word(&commands::PERFORM_SELF_TEST, commands::PERFORM_SELF_TEST_DURATION)?;

        Ok(status == 0)
    }

    /// Resets all configuration stored in EEPROM and erases the FRC and ASC
    /// algorithm history.
    pub fn perform_factory_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        self.sensor
            .write_command(&commands::PERFORM_FACTORY_RESET)?;
        self.sensor
            .delay_ms(commands::PERFORM_FACTORY_RESET_DURATION);
        Ok(())
    }

    /// Reloads user settings from EEPROM.
    pub fn reinit(&mut self) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        self.sensor.write_command(&commands::REINIT)?;
        self.sensor.delay_ms(commands::REINIT_DURATION);
        Ok(())
    }

    /// Reads out the SCD4x sensor variant
    pub fn read_sensor_variant(&mut self) -> Result<Variant, Error<I2C::Error>> {
        let status = self
            .sensor
            .read_word(&commands::GET_SENSOR_VARIANT, commands::COMMAND_DURATION)?;

        match status >> 12 {
            0b0000 => Ok(Variant::SCD40),
            0b0001 => Ok(Variant::SCD41),
            0b0101 => Ok(Variant::SCD43),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Reads the sensor output. The measurement data can only be read out once
    /// per signal update interval as the buffer is emptied upon read-out.
    /// Returns `None` if no data is ready.
    ///
    /// With `rht_only` the CO2 word is cleared, the sensor may still hold a
    /// stale value there.
    fn read_measurement(&mut self, rht_only: bool) -> Result<Option<Data>, Error<I2C::Error>> {
        if !self.read_data_ready_status()? {
            trace!("measurement not ready");
            return Ok(None);
        }

        let mut data = Data::default();
        self.sensor.read_unchecked(
            &commands::READ_MEASUREMENT,
            commands::COMMAND_DURATION,
            &mut data.raw,
        )?;
        if rht_only {
            data.raw[..3].fill(0);
            check_words(&data.raw[3..])?;
        } else {
            check_words(&data.raw)?;
        }
        Ok(Some(data))
    }

    fn is_valid_chip(&mut self) -> Result<(), Error<I2C::Error>> {
        let variant = self.read_sensor_variant()?;
        if variant != M::VARIANT {
            error!("not {}", M::NAME);
            return Err(Error::UnsupportedDevice);
        }
        Ok(())
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Scd4x<I2C, D, Scd41, N> {
    fn measure(&mut self, cmd: &[u8; 2], wait_ms: u32, rht_only: bool) -> Result<Data, Error<I2C::Error>> {
        self.ensure_idle()?;
        self.sensor.write_command(cmd)?;
        self.sensor.delay_ms(wait_ms);
        self.read_measurement(rht_only)?.ok_or(Error::NotReady)
    }

    /// On-demand measurement of CO2, temperature and humidity. Takes 5 seconds.
    pub fn measure_single_shot(&mut self) -> Result<Data, Error<I2C::Error>> {
        self.measure(
            &commands::MEASURE_SINGLE_SHOT,
            commands::MEASURE_SINGLE_SHOT_DURATION,
            false,
        )
    }

    /// On-demand measurement of temperature and humidity only. CO2 reads as 0.
    pub fn measure_single_shot_rht_only(&mut self) -> Result<Data, Error<I2C::Error>> {
        self.measure(
            &commands::MEASURE_SINGLE_SHOT_RHT_ONLY,
            commands::MEASURE_SINGLE_SHOT_RHT_ONLY_DURATION,
            true,
        )
    }

    /// Puts the sensor from idle to sleep.
    pub fn power_down(&mut self) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        self.sensor.write_command(&commands::POWER_DOWN)?;
        self.sensor.delay_ms(commands::COMMAND_DURATION);
        Ok(())
    }

    /// Wakes the sensor from sleep. The sensor does not acknowledge this
    /// command, so success is checked by reading the serial number.
    pub fn wake_up(&mut self) -> Result<(), Error<I2C::Error>> {
        let _ = self.sensor.write_command(&commands::WAKE_UP);
        self.sensor.delay_ms(commands::WAKE_UP_DURATION);
        self.read_serial_number().map(|_| ())
    }

    /// ASC initial period in hours, a multiple of 4.
    pub fn write_automatic_self_calibration_initial_period(
        &mut self,
        hours: u16,
    ) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        if hours % 4 != 0 {
            return Err(Error::InvalidArgument);
        }
        self.write_word(
            &commands::SET_AUTOMATIC_SELF_CALIBRATION_INITIAL_PERIOD,
            hours,
        )
    }

    pub fn read_automatic_self_calibration_initial_period(
        &mut self,
    ) -> Result<u16, Error<I2C::Error>> {
        self.ensure_idle()?;
        self.sensor.read_word(
            &commands::GET_AUTOMATIC_SELF_CALIBRATION_INITIAL_PERIOD,
            commands::COMMAND_DURATION,
        )
    }

    /// ASC standard period in hours, a multiple of 4.
    pub fn write_automatic_self_calibration_standard_period(
        &mut self,
        hours: u16,
    ) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        if hours % 4 != 0 {
            return Err(Error::InvalidArgument);
        }
        self.write_word(
            &commands::SET_AUTOMATIC_SELF_CALIBRATION_STANDARD_PERIOD,
            hours,
        )
    }

    pub fn read_automatic_self_calibration_standard_period(
        &mut self,
    ) -> Result<u16, Error<I2C::Error>> {
        self.ensure_idle()?;
        self.sensor.read_word(
            &commands::GET_AUTOMATIC_SELF_CALIBRATION_STANDARD_PERIOD,
            commands::COMMAND_DURATION,
        )
    }
}

impl<I2C: I2c, D: DelayNs, M: Model, const N: usize> Component for Scd4x<I2C, D, M, N> {
    type Error = Error<I2C::Error>;

    const NAME: &'static str = M::NAME;
    const DEFAULT_ADDRESS: u8 = ADDR;

    fn address(&self) -> u8 {
        self.sensor.address()
    }

    fn begin(&mut self) -> Result<(), Self::Error> {
        // The sensor may still be measuring from a previous run.
        self.sensor
            .write_command(&commands::STOP_PERIODIC_MEASUREMENT)?;
        self.periodic.stop();
        self.sensor
            .delay_ms(commands::STOP_PERIODIC_MEASUREMENT_DURATION);

        self.is_valid_chip()?;
        self.write_automatic_self_calibration_enabled(self.config.calibration)?;

        if self.config.start_periodic {
            self.start_periodic_measurement(self.config.mode)?;
        }
        Ok(())
    }

    fn update(&mut self, now_ms: u64, force: bool) -> Result<bool, Self::Error> {
        self.periodic.begin_update();
        if !self.periodic.due(now_ms, force) {
            return Ok(false);
        }
        match self.read_measurement(false)? {
            Some(data) => {
                self.periodic.store(now_ms, data);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl<I2C, D, M, const N: usize> PeriodicMeasurement<N> for Scd4x<I2C, D, M, N> {
    type Data = Data;

    fn periodic(&self) -> &Periodic<Data, N> {
        &self.periodic
    }

    fn periodic_mut(&mut self) -> &mut Periodic<Data, N> {
        &mut self.periodic
    }
}
