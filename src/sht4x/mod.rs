//! SHT40 temperature and humidity sensor.
//!
//! The SHT4x has no periodic mode of its own. Periodic measurement is
//! emulated: every due `update` reads the measurement triggered by the
//! previous one and triggers the next. The heater is fired at most at the
//! configured duty cycle.

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

pub const ADDR: u8 = 0x44;

/// Upper bound of the heater duty cycle. The heater is designed for at
/// most 10 % duty; 5 % keeps a margin.
pub const MAX_HEATER_DUTY: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Precision {
    #[default]
    High,
    Medium,
    Low,
}

/// Heater pulse length. The heater power follows the [`Precision`]:
/// 200 mW for high, 110 mW for medium, 20 mW for low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Heater {
    /// 1 second
    Long,
    /// 0.1 seconds
    Short,
    #[default]
    None,
}

fn command(precision: Precision, heater: Heater) -> (u8, u32) {
    let (p, h) = (precision as usize, heater as usize);
    (commands::MEASURE[p][h], commands::MEASURE_DURATION[p][h])
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub start_periodic: bool,
    pub precision: Precision,
    pub heater: Heater,
    /// Heater duty cycle, `(0.0, 0.05]`.
    pub heater_duty: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_periodic: true,
            precision: Precision::High,
            heater: Heater::None,
            heater_duty: MAX_HEATER_DUTY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data {
    pub raw: [u8; 6],
    /// Measured right after a heater pulse.
    pub heater: bool,
}

impl Data {
    pub fn celsius(&self) -> f32 {
        -45.0 + 175.0 * word(&self.raw, 0) as f32 / 65535.0
    }

    pub fn fahrenheit(&self) -> f32 {
        -49.0 + 315.0 * word(&self.raw, 0) as f32 / 65535.0
    }

    /// Relative humidity. Not clamped, values slightly outside 0..100 are
    /// possible.
    pub fn humidity(&self) -> f32 {
        -6.0 + 125.0 * word(&self.raw, 1) as f32 / 65535.0
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.1}°C, {:.1}% RH", self.celsius(), self.humidity())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Schedule {
    heater_cmd: u8,
    heater_duration: u32,
    measure_cmd: u8,
    measure_duration: u32,
    heater_interval: u64,
    latest_heater: Option<u64>,
    /// The pending measurement was triggered with the heater.
    pending_heater: bool,
}

pub struct Sht4x<I2C, D, const N: usize = 1> {
    sensor: Sensor<I2C, D>,
    config: Config,
    periodic: Periodic<Data, N>,
    schedule: Schedule,
}

impl<I2C, D, const N: usize> Sht4x<I2C, D, N> {
    pub fn new(i2c: I2C, delay: D, config: Config) -> Self {
        Self {
            sensor: Sensor::new(i2c, delay, ADDR),
            config,
            periodic: Periodic::new(),
            schedule: Schedule::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn release(self) -> (I2C, D) {
        self.sensor.release()
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Sht4x<I2C, D, N> {
    fn ensure_idle(&self) -> Result<(), Error<I2C::Error>> {
        if self.periodic.in_periodic() {
            debug!("periodic measurement is running");
            return Err(Error::PeriodicRunning);
        }
        Ok(())
    }

    fn read_measurement(&mut self) -> Result<Data, Error<I2C::Error>> {
        let mut data = Data::default();
        self.sensor.read_raw(&mut data.raw)?;
        Ok(data)
    }

    fn reset_status(&mut self) {
        self.periodic.stop();
        self.schedule = Schedule::default();
    }

    pub fn measure_single_shot(
        &mut self,
        precision: Precision,
        heater: Heater,
    ) -> Result<Data, Error<I2C::Error>> {
        self.ensure_idle()?;
        let (cmd, duration) = command(precision, heater);
        self.sensor.write_command(&[cmd])?;
        self.sensor.delay_ms(duration);
        let mut data = self.read_measurement()?;
        data.heater = heater != Heater::None;
        Ok(data)
    }

    /// Starts emulated periodic measurement. The first measurement is
    /// triggered (with the heater if requested) and waited for, so the next
    /// `update` can read it.
    pub fn start_periodic_measurement(
        &mut self,
        precision: Precision,
        heater: Heater,
        duty: f32,
    ) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        if duty <= 0.0 || duty > MAX_HEATER_DUTY {
            warn!("heater duty must be within (0.0, 0.05]");
            return Err(Error::InvalidArgument);
        }

        let (heater_cmd, heater_duration) = command(precision, heater);
        let (measure_cmd, measure_duration) = command(precision, Heater::None);

        self.sensor.write_command(&[heater_cmd])?;
        self.schedule = Schedule {
            heater_cmd,
            heater_duration,
            measure_cmd,
            measure_duration,
            heater_interval: (heater_duration as f32 / duty) as u64,
            latest_heater: None,
            pending_heater: heater != Heater::None,
        };
        self.periodic.start(heater_duration);
        self.sensor.delay_ms(heater_duration);
        Ok(())
    }

    /// Stops emulated periodic measurement. A pending measurement is waited
    /// for and dismissed.
    pub fn stop_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        if !self.periodic.in_periodic() {
            return Err(Error::NotPeriodic);
        }
        self.sensor.delay_ms(self.periodic.interval());
        // The result may already have been read, nothing to dismiss then.
        let _ = self.read_measurement();
        self.periodic.stop();
        Ok(())
    }

    pub fn read_serial_number(&mut self) -> Result<u32, Error<I2C::Error>> {
        self.ensure_idle()?;
        let mut response = [0u8; 6];
        self.sensor.read(
            &[commands::GET_SERIAL_NUMBER],
            commands::COMMAND_DURATION,
            &mut response,
        )?;
        Ok((word(&response, 0) as u32) << 16 | word(&response, 1) as u32)
    }

    /// Serial number as 8 upper case hex digits.
    pub fn read_serial_number_string(&mut self) -> Result<String<8>, Error<I2C::Error>> {
        let serial = self.read_serial_number()?;
        let mut s = String::new();
        write!(s, "{:08X}", serial).map_err(|_| Error::InvalidResponse)?;
        Ok(s)
    }

    pub fn soft_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        self.sensor.write_command(&[commands::SOFT_RESET])?;
        self.sensor.delay_ms(commands::COMMAND_DURATION);
        self.reset_status();
        Ok(())
    }

    /// Reset through the I2C general call. Every device on the bus that
    /// supports general call resets as well.
    pub fn general_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor.general_call_reset();
        self.sensor.delay_ms(commands::COMMAND_DURATION);
        self.reset_status();
        Ok(())
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Component for Sht4x<I2C, D, N> {
    type Error = Error<I2C::Error>;

    const NAME: &'static str = "UnitSHT40";
    const DEFAULT_ADDRESS: u8 = ADDR;

    fn address(&self) -> u8 {
        self.sensor.address()
    }

    fn begin(&mut self) -> Result<(), Self::Error> {
        self.soft_reset()?;
        let serial = self.read_serial_number()?;
        debug!("SHT40 serial {=u32:#x}", serial);

        if self.config.start_periodic {
            self.start_periodic_measurement(
                self.config.precision,
                self.config.heater,
                self.config.heater_duty,
            )?;
        }
        Ok(())
    }

    fn update(&mut self, now_ms: u64, force: bool) -> Result<bool, Self::Error> {
        self.periodic.begin_update();
        if !self.periodic.due(now_ms, force) {
            return Ok(false);
        }

        let mut data = self.read_measurement()?;
        data.heater = self.schedule.pending_heater;
        self.periodic.store(now_ms, data);

        let latest_heater = *self.schedule.latest_heater.get_or_insert(now_ms);
        let (cmd, duration, heater) = if now_ms >= latest_heater + self.schedule.heater_interval {
            self.schedule.latest_heater = Some(now_ms);
            (
                self.schedule.heater_cmd,
                self.schedule.heater_duration,
                self.schedule.heater_cmd != self.schedule.measure_cmd,
            )
        } else {
            (
                self.schedule.measure_cmd,
                self.schedule.measure_duration,
                false,
            )
        };

        if let Err(e) = self.sensor.write_command(&[cmd]) {
            error!("failed to trigger measurement, periodic measurement stopped");
            self.periodic.stop();
            return Err(e);
        }
        self.schedule.pending_heater = heater;
        self.periodic.set_interval(duration);
        Ok(true)
    }
}

impl<I2C, D, const N: usize> PeriodicMeasurement<N> for Sht4x<I2C, D, N> {
    type Data = Data;

    fn periodic(&self) -> &Periodic<Data, N> {
        &self.periodic
    }

    fn periodic_mut(&mut self) -> &mut Periodic<Data, N> {
        &mut self.periodic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_utils::{DummyBus, NoDelay, words};

    fn sht40(bus: DummyBus) -> Sht4x<DummyBus, NoDelay, 8> {
        Sht4x::new(bus, NoDelay::default(), Config::default())
    }

    #[test]
    fn test_conversion() {
        let data = Data {
            raw: words(&[0x6666, 0x8000]).try_into().unwrap(),
            heater: false,
        };
        assert!((data.celsius() - 25.0).abs() < 0.01);
        assert!((data.fahrenheit() - 77.0).abs() < 0.01);
        assert!((data.humidity() - 56.5).abs() < 0.01);
    }

    #[test]
    fn test_single_shot_with_heater() {
        let mut sensor = sht40(DummyBus::new(&[&words(&[0x6666, 0x8000])]));
        let data = sensor
            .measure_single_shot(Precision::Medium, Heater::Short)
            .unwrap();
        assert!(data.heater);
        let (bus, delay) = sensor.release();
        assert_eq!(bus.written(), [vec![0x24]]);
        assert_eq!(delay.elapsed_ms(), 110);
    }

    #[test]
    fn test_begin() {
        let bus = DummyBus::new(&[&words(&[0x1234, 0x5678])]);
        let mut sensor = sht40(bus);
        sensor.begin().unwrap();
        assert!(sensor.in_periodic());
        assert_eq!(sensor.interval(), 9);
        let (bus, _) = sensor.release();
        assert_eq!(bus.written(), [vec![0x94], vec![0x89], vec![0xfd]]);
    }

    #[test]
    fn test_start_rejects_duty() {
        let mut sensor = sht40(DummyBus::default());
        assert_eq!(
            sensor.start_periodic_measurement(Precision::High, Heater::Long, 0.0),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            sensor.start_periodic_measurement(Precision::High, Heater::Long, 0.051),
            Err(Error::InvalidArgument)
        );
        assert!(!sensor.in_periodic());
    }

    #[test]
    fn test_emulated_periodic_with_heater() {
        let sample = words(&[0x6666, 0x8000]);
        let bus = DummyBus::new(&[&sample, &sample, &sample]);
        let mut sensor = sht40(bus);
        // 110 ms pulse at 5 % duty: one pulse every 2200 ms
        sensor
            .start_periodic_measurement(Precision::High, Heater::Short, 0.05)
            .unwrap();
        assert_eq!(sensor.interval(), 110);

        assert_eq!(sensor.update(1000, false), Ok(true));
        assert!(sensor.latest().unwrap().heater);
        assert_eq!(sensor.interval(), 9);

        assert_eq!(sensor.update(1005, false), Ok(false));
        assert_eq!(sensor.update(1009, false), Ok(true));
        assert!(!sensor.latest().unwrap().heater);

        assert_eq!(sensor.update(3200, false), Ok(true));
        assert_eq!(sensor.interval(), 110);

        let (bus, _) = sensor.release();
        assert_eq!(
            bus.written(),
            [vec![0x32], vec![0xfd], vec![0xfd], vec![0x32]]
        );
    }

    #[test]
    fn test_stop_dismisses_pending() {
        let sample = words(&[0x6666, 0x8000]);
        let mut sensor = sht40(DummyBus::new(&[&sample]));
        sensor
            .start_periodic_measurement(Precision::Low, Heater::None, 0.05)
            .unwrap();
        sensor.stop_periodic_measurement().unwrap();
        assert!(!sensor.in_periodic());
        assert!(sensor.empty());
        assert_eq!(sensor.stop_periodic_measurement(), Err(Error::NotPeriodic));
        let (bus, _) = sensor.release();
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_rejected_while_periodic() {
        let mut sensor = sht40(DummyBus::default());
        sensor
            .start_periodic_measurement(Precision::High, Heater::None, 0.05)
            .unwrap();
        assert_eq!(
            sensor.measure_single_shot(Precision::High, Heater::None),
            Err(Error::PeriodicRunning)
        );
        assert_eq!(sensor.read_serial_number(), Err(Error::PeriodicRunning));
        assert_eq!(sensor.soft_reset(), Err(Error::PeriodicRunning));

        sensor.general_reset().unwrap();
        assert!(!sensor.in_periodic());
    }

    #[test]
    fn test_serial_string() {
        let mut sensor = sht40(DummyBus::new(&[&words(&[0x0f1e, 0x2d3c])]));
        assert_eq!(
            sensor.read_serial_number_string().unwrap().as_str(),
            "0F1E2D3C"
        );
    }
}
