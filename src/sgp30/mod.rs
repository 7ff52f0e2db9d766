//! SGP30 TVOC and CO2eq gas sensor.

use core::fmt;
use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use heapless::String;

use crate::component::Component;
use crate::periodic::{Periodic, PeriodicMeasurement};
use crate::sensirion::{Sensor, word};
use crate::Error;

pub mod commands;

pub const ADDR: u8 = 0x58;

/// Oldest product version this driver supports.
const LOWER_LIMIT_VERSION: u8 = 0x20;
/// Product version that added the TVOC inceptive baseline.
const INCEPTIVE_BASELINE_VERSION: u8 = 0x21;
/// After IAQ init the sensor reports fixed 400 ppm / 0 ppb for 15 seconds.
const WARM_UP_MS: u64 = 15_000;
const MEASURE_TEST_PASSED: u16 = 0xd400;

/// Feature set word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Feature(pub u16);

impl Feature {
    /// 0 for SGP30. An SGPC3 reports 1.
    pub fn product_type(&self) -> u8 {
        ((self.0 >> 12) & 0x0f) as u8
    }

    /// The low 5 bits are subject to change with new features.
    pub fn product_version(&self) -> u8 {
        (self.0 & 0xff) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub start_periodic: bool,
    /// IAQ baseline restored on begin (ignored if both are zero).
    pub baseline_co2eq: u16,
    pub baseline_tvoc: u16,
    /// Absolute humidity restored on begin, 8.8 fixed point g/m³ (0 disables
    /// compensation).
    pub humidity: u16,
    /// TVOC inceptive baseline written on begin when non-zero.
    pub inceptive_tvoc: u16,
    /// Measurement interval in ms.
    pub interval: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_periodic: true,
            baseline_co2eq: 0,
            baseline_tvoc: 0,
            humidity: 0,
            inceptive_tvoc: 0,
            interval: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data {
    pub raw: [u8; 6],
}

impl Data {
    /// CO2 equivalent, ppm.
    pub fn co2eq(&self) -> u16 {
        word(&self.raw, 0)
    }

    /// Total VOC, ppb.
    pub fn tvoc(&self) -> u16 {
        word(&self.raw, 1)
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ppm CO2eq, {} ppb TVOC", self.co2eq(), self.tvoc())
    }
}

/// H2 concentration in ppm from the raw signal.
pub fn calculate_h2(raw: u16) -> f32 {
    0.5 * libm::expf((13119.0 - raw as f32) / 512.0)
}

/// Ethanol concentration in ppm from the raw signal.
pub fn calculate_ethanol(raw: u16) -> f32 {
    0.4 * libm::expf((18472.0 - raw as f32) / 512.0)
}

/// Absolute humidity in g/m³ to the 8.8 fixed point format of
/// `SET_ABSOLUTE_HUMIDITY`.
pub fn absolute_humidity_to_raw(gm3: f32) -> Option<u16> {
    let v = libm::roundf(gm3 * 256.0);
    if !(-32768.0..=32767.0).contains(&v) {
        return None;
    }
    Some(v as i16 as u16)
}

pub struct Sgp30<I2C, D, const N: usize = 1> {
    sensor: Sensor<I2C, D>,
    config: Config,
    periodic: Periodic<Data, N>,
    version: u8,
    warming_up: bool,
    can_measure_at: Option<u64>,
}

impl<I2C, D, const N: usize> Sgp30<I2C, D, N> {
    pub fn new(i2c: I2C, delay: D, config: Config) -> Self {
        Self {
            sensor: Sensor::new(i2c, delay, ADDR),
            config,
            periodic: Periodic::new(),
            version: 0,
            warming_up: false,
            can_measure_at: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Product version read by `begin`.
    pub fn product_version(&self) -> u8 {
        self.version
    }

    /// Still inside the 15 s initialization phase after IAQ init.
    pub fn warming_up(&self) -> bool {
        self.warming_up
    }

    pub fn release(self) -> (I2C, D) {
        self.sensor.release()
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Sgp30<I2C, D, N> {
    fn ensure_idle(&self) -> Result<(), Error<I2C::Error>> {
        if self.periodic.in_periodic() {
            debug!("periodic measurement is running");
            return Err(Error::PeriodicRunning);
        }
        Ok(())
    }

    /// Sends IAQ init and starts periodic measurement every `interval` ms.
    ///
    /// The first 15 seconds are an initialization phase in which `update`
    /// stores nothing. The phase is counted from the first `update`.
    pub fn start_periodic_measurement(&mut self, interval: u32) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        if interval < commands::MEASURE_IAQ_DURATION {
            warn!("interval too short {}", interval);
            return Err(Error::InvalidArgument);
        }

        self.sensor.write_command(&commands::IAQ_INIT)?;
        self.periodic.start(interval);
        self.warming_up = true;
        self.can_measure_at = None;
        self.sensor.delay_ms(commands::IAQ_INIT_DURATION);
        Ok(())
    }

    /// Like [`Self::start_periodic_measurement`], then restores the IAQ
    /// baseline and the absolute humidity. Restoring must happen inside the
    /// initialization phase, which this guarantees.
    pub fn start_periodic_measurement_with_baseline(
        &mut self,
        co2eq: u16,
        tvoc: u16,
        humidity: u16,
        interval: u32,
    ) -> Result<(), Error<I2C::Error>> {
        self.start_periodic_measurement(interval)?;
        self.write_iaq_baseline(co2eq, tvoc)?;
        self.write_absolute_humidity(humidity)
    }

    /// Stops periodic measurement. The sensor has no stop command, it just
    /// is not polled anymore.
    pub fn stop_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.periodic.stop();
        Ok(())
    }

    fn read_measurement(&mut self) -> Result<Data, Error<I2C::Error>> {
        let mut data = Data::default();
        self.sensor.read(
            &commands::MEASURE_IAQ,
            commands::MEASURE_IAQ_DURATION,
            &mut data.raw,
        )?;
        Ok(data)
    }

    /// Raw H2 and ethanol signals.
    pub fn measure_raw_signal(&mut self) -> Result<(u16, u16), Error<I2C::Error>> {
        let [h2, ethanol] = self
            .sensor
            .read_words::<2>(&commands::MEASURE_RAW, commands::MEASURE_RAW_DURATION)?;
        Ok((h2, ethanol))
    }

    /// H2 and ethanol in ppm, see [`calculate_h2`] and [`calculate_ethanol`].
    pub fn measure_raw_signal_ppm(&mut self) -> Result<(f32, f32), Error<I2C::Error>> {
        let (h2, ethanol) = self.measure_raw_signal()?;
        Ok((calculate_h2(h2), calculate_ethanol(ethanol)))
    }

    /// IAQ baseline as `(co2eq, tvoc)`.
    pub fn read_iaq_baseline(&mut self) -> Result<(u16, u16), Error<I2C::Error>> {
        let [co2eq, tvoc] = self.sensor.read_words::<2>(
            &commands::GET_IAQ_BASELINE,
            commands::GET_IAQ_BASELINE_DURATION,
        )?;
        Ok((co2eq, tvoc))
    }

    pub fn write_iaq_baseline(&mut self, co2eq: u16, tvoc: u16) -> Result<(), Error<I2C::Error>> {
        // Set takes the words in the reverse order of get.
        self.sensor
            .write_command_with_words(&commands::SET_IAQ_BASELINE, &[tvoc, co2eq])?;
        self.sensor.delay_ms(commands::SET_IAQ_BASELINE_DURATION);
        Ok(())
    }

    /// Absolute humidity in 8.8 fixed point g/m³. Zero disables the
    /// humidity compensation.
    pub fn write_absolute_humidity(&mut self, raw: u16) -> Result<(), Error<I2C::Error>> {
        self.sensor
            .write_command_with_words(&commands::SET_ABSOLUTE_HUMIDITY, &[raw])?;
        self.sensor
            .delay_ms(commands::SET_ABSOLUTE_HUMIDITY_DURATION);
        Ok(())
    }

    pub fn write_absolute_humidity_gm3(&mut self, gm3: f32) -> Result<(), Error<I2C::Error>> {
        let raw = absolute_humidity_to_raw(gm3).ok_or_else(|| {
            warn!("absolute humidity out of range");
            Error::InvalidArgument
        })?;
        self.write_absolute_humidity(raw)
    }

    /// On-chip self test. Returns true if it passed.
    pub fn measure_test(&mut self) -> Result<bool, Error<I2C::Error>> {
        self.ensure_idle()?;
        let result = self
            .sensor
            .read_word(&commands::MEASURE_TEST, commands::MEASURE_TEST_DURATION)?;
        Ok(result == MEASURE_TEST_PASSED)
    }

    pub fn read_feature_set(&mut self) -> Result<Feature, Error<I2C::Error>> {
        let value = self
            .sensor
            .read_word(&commands::GET_FEATURE_SET, commands::GET_FEATURE_SET_DURATION)?;
        Ok(Feature(value))
    }

    fn ensure_inceptive_baseline(&self) -> Result<(), Error<I2C::Error>> {
        if self.version < INCEPTIVE_BASELINE_VERSION {
            warn!("product version {} has no inceptive baseline", self.version);
            return Err(Error::UnsupportedDevice);
        }
        Ok(())
    }

    pub fn read_tvoc_inceptive_baseline(&mut self) -> Result<u16, Error<I2C::Error>> {
        self.ensure_inceptive_baseline()?;
        self.sensor.read_word(
            &commands::GET_TVOC_INCEPTIVE_BASELINE,
            commands::GET_TVOC_INCEPTIVE_BASELINE_DURATION,
        )
    }

    pub fn write_tvoc_inceptive_baseline(&mut self, tvoc: u16) -> Result<(), Error<I2C::Error>> {
        self.ensure_inceptive_baseline()?;
        self.sensor
            .write_command_with_words(&commands::SET_TVOC_INCEPTIVE_BASELINE, &[tvoc])?;
        self.sensor
            .delay_ms(commands::SET_TVOC_INCEPTIVE_BASELINE_DURATION);
        Ok(())
    }

    /// 48 bit serial number.
    pub fn read_serial_number(&mut self) -> Result<u64, Error<I2C::Error>> {
        let words = self
            .sensor
            .read_words::<3>(&commands::GET_SERIAL_ID, commands::GET_SERIAL_ID_DURATION)?;
        Ok(words
            .iter()
            .fold(0u64, |acc, w| (acc << 16) | *w as u64))
    }

    /// Serial number as 12 upper case hex digits.
    pub fn read_serial_number_string(&mut self) -> Result<String<12>, Error<I2C::Error>> {
        let serial = self.read_serial_number()?;
        let mut s = String::new();
        write!(s, "{:012X}", serial).map_err(|_| Error::InvalidResponse)?;
        Ok(s)
    }

    /// Reset through the I2C general call. Every device on the bus that
    /// supports general call resets as well. IAQ init is needed afterwards.
    pub fn general_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor.general_call_reset();
        self.periodic.stop();
        self.sensor.delay_ms(commands::GENERAL_RESET_DURATION);
        Ok(())
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Component for Sgp30<I2C, D, N> {
    type Error = Error<I2C::Error>;

    const NAME: &'static str = "UnitSGP30";
    const DEFAULT_ADDRESS: u8 = ADDR;

    fn address(&self) -> u8 {
        self.sensor.address()
    }

    fn begin(&mut self) -> Result<(), Self::Error> {
        self.sensor.delay_ms(1);

        let feature = self.read_feature_set()?;
        if feature.product_type() != 0 {
            error!("not an SGP30, product type {}", feature.product_type());
            return Err(Error::UnsupportedDevice);
        }
        self.version = feature.product_version();
        if self.version < LOWER_LIMIT_VERSION {
            error!("product version {} not supported", self.version);
            return Err(Error::UnsupportedDevice);
        }

        if !self.config.start_periodic {
            return Ok(());
        }
        let Config {
            baseline_co2eq,
            baseline_tvoc,
            humidity,
            inceptive_tvoc,
            interval,
            ..
        } = self.config;
        if baseline_co2eq != 0 || baseline_tvoc != 0 {
            self.start_periodic_measurement_with_baseline(
                baseline_co2eq,
                baseline_tvoc,
                humidity,
                interval,
            )?;
        } else {
            self.start_periodic_measurement(interval)?;
            if humidity != 0 {
                self.write_absolute_humidity(humidity)?;
            }
        }
        if inceptive_tvoc != 0 {
            self.write_tvoc_inceptive_baseline(inceptive_tvoc)?;
        }
        Ok(())
    }

    fn update(&mut self, now_ms: u64, force: bool) -> Result<bool, Self::Error> {
        self.periodic.begin_update();
        if !self.periodic.in_periodic() {
            return Ok(false);
        }
        if self.warming_up {
            let can_measure_at = *self
                .can_measure_at
                .get_or_insert(now_ms.saturating_add(WARM_UP_MS));
            self.warming_up = now_ms < can_measure_at;
            return Ok(false);
        }
        if !self.periodic.due(now_ms, force) {
            return Ok(false);
        }
        let data = self.read_measurement()?;
        self.periodic.store(now_ms, data);
        Ok(true)
    }
}

impl<I2C, D, const N: usize> PeriodicMeasurement<N> for Sgp30<I2C, D, N> {
    type Data = Data;

    fn periodic(&self) -> &Periodic<Data, N> {
        &self.periodic
    }

    fn periodic_mut(&mut self) -> &mut Periodic<Data, N> {
        &mut self.periodic
    }
}
