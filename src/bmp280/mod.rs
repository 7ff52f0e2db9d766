//! BMP280 pressure and temperature sensor (ENV IV).

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::component::Component;
use crate::periodic::{Periodic, PeriodicMeasurement};
use crate::register::Registers;
use crate::Error;

pub mod registers;

pub const ADDR: u8 = 0x76;

/// Raw value of a channel whose oversampling is `Skipped`.
const NOT_MEASURED: u32 = 0x80_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
    Sleep = 0,
    Forced = 1,
    Normal = 3,
}

impl PowerMode {
    fn from_bits(bits: u8) -> Self {
        // 01 and 10 are both forced mode
        match bits & 0x03 {
            0 => PowerMode::Sleep,
            3 => PowerMode::Normal,
            _ => PowerMode::Forced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Oversampling {
    /// Channel is not measured.
    Skipped = 0,
    X1 = 1,
    X2 = 2,
    X4 = 3,
    X8 = 4,
    X16 = 5,
}

impl Oversampling {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Oversampling::Skipped,
            1 => Oversampling::X1,
            2 => Oversampling::X2,
            3 => Oversampling::X4,
            4 => Oversampling::X8,
            _ => Oversampling::X16,
        }
    }
}

/// Resolution presets from the datasheet, `(pressure, temperature)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OversamplingSetting {
    /// 16 bit / 2.62 Pa
    UltraLowPower,
    /// 17 bit / 1.31 Pa
    LowPower,
    /// 18 bit / 0.66 Pa
    StandardResolution,
    /// 19 bit / 0.33 Pa
    HighResolution,
    /// 20 bit / 0.16 Pa, temperature 17 bit
    UltraHighResolution,
}

impl OversamplingSetting {
    pub fn oversampling(&self) -> (Oversampling, Oversampling) {
        use Oversampling::*;
        match self {
            OversamplingSetting::UltraLowPower => (X1, X1),
            OversamplingSetting::LowPower => (X2, X1),
            OversamplingSetting::StandardResolution => (X4, X1),
            OversamplingSetting::HighResolution => (X8, X1),
            OversamplingSetting::UltraHighResolution => (X16, X2),
        }
    }
}

/// IIR filter coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Filter {
    Off = 0,
    Coeff2 = 1,
    Coeff4 = 2,
    Coeff8 = 3,
    Coeff16 = 4,
}

impl Filter {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Filter::Off,
            1 => Filter::Coeff2,
            2 => Filter::Coeff4,
            3 => Filter::Coeff8,
            _ => Filter::Coeff16,
        }
    }
}

/// Inactive time between measurements in normal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Standby {
    Time0_5ms = 0,
    Time62_5ms = 1,
    Time125ms = 2,
    Time250ms = 3,
    Time500ms = 4,
    Time1sec = 5,
    Time2sec = 6,
    Time4sec = 7,
}

impl Standby {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Standby::Time0_5ms,
            1 => Standby::Time62_5ms,
            2 => Standby::Time125ms,
            3 => Standby::Time250ms,
            4 => Standby::Time500ms,
            5 => Standby::Time1sec,
            6 => Standby::Time2sec,
            _ => Standby::Time4sec,
        }
    }

    /// Polling interval used for periodic measurement, in ms.
    pub fn interval(&self) -> u32 {
        match self {
            Standby::Time0_5ms => 0,
            Standby::Time62_5ms => 62,
            Standby::Time125ms => 125,
            Standby::Time250ms => 250,
            Standby::Time500ms => 500,
            Standby::Time1sec => 1000,
            Standby::Time2sec => 2000,
            Standby::Time4sec => 4000,
        }
    }
}

/// Recommended settings from the datasheet, section 3.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UseCase {
    /// Handheld device, low power
    LowPower,
    /// Handheld device, dynamic
    Dynamic,
    Weather,
    /// Elevator or floor change detection
    Elevator,
    Drop,
    /// Indoor navigation
    Indoor,
}

impl UseCase {
    pub fn settings(&self) -> (OversamplingSetting, Filter, Standby) {
        use OversamplingSetting::*;
        match self {
            UseCase::LowPower => (UltraHighResolution, Filter::Coeff4, Standby::Time62_5ms),
            UseCase::Dynamic => (StandardResolution, Filter::Coeff16, Standby::Time0_5ms),
            UseCase::Weather => (UltraLowPower, Filter::Off, Standby::Time4sec),
            UseCase::Elevator => (StandardResolution, Filter::Coeff4, Standby::Time125ms),
            UseCase::Drop => (LowPower, Filter::Off, Standby::Time0_5ms),
            UseCase::Indoor => (UltraHighResolution, Filter::Coeff16, Standby::Time0_5ms),
        }
    }
}

/// `ctrl_meas`: osrs_t 7..5, osrs_p 4..2, mode 1..0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct CtrlMeas(u8);

impl CtrlMeas {
    fn osrs_t(&self) -> Oversampling {
        Oversampling::from_bits(self.0 >> 5)
    }

    fn osrs_p(&self) -> Oversampling {
        Oversampling::from_bits(self.0 >> 2)
    }

    fn mode(&self) -> PowerMode {
        PowerMode::from_bits(self.0)
    }

    fn with_osrs_t(self, os: Oversampling) -> Self {
        Self((self.0 & !(0x07 << 5)) | ((os as u8) << 5))
    }

    fn with_osrs_p(self, os: Oversampling) -> Self {
        Self((self.0 & !(0x07 << 2)) | ((os as u8) << 2))
    }

    fn with_mode(self, mode: PowerMode) -> Self {
        Self((self.0 & !0x03) | mode as u8)
    }
}

/// `config`: t_sb 7..5, filter 4..2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ConfigReg(u8);

impl ConfigReg {
    fn standby(&self) -> Standby {
        Standby::from_bits(self.0 >> 5)
    }

    fn filter(&self) -> Filter {
        Filter::from_bits(self.0 >> 2)
    }

    fn with_standby(self, standby: Standby) -> Self {
        Self((self.0 & !(0x07 << 5)) | ((standby as u8) << 5))
    }

    fn with_filter(self, filter: Filter) -> Self {
        Self((self.0 & !(0x07 << 2)) | ((filter as u8) << 2))
    }
}

/// Factory trimming parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Trimming {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,
    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,
}

impl Trimming {
    pub fn from_bytes(buf: &[u8; registers::TRIMMING_LEN]) -> Self {
        let u = |i: usize| u16::from_le_bytes([buf[i], buf[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([buf[i], buf[i + 1]]);
        Self {
            dig_t1: u(0),
            dig_t2: s(2),
            dig_t3: s(4),
            dig_p1: u(6),
            dig_p2: s(8),
            dig_p3: s(10),
            dig_p4: s(12),
            dig_p5: s(14),
            dig_p6: s(16),
            dig_p7: s(18),
            dig_p8: s(20),
            dig_p9: s(22),
        }
    }

    /// Returns `(celsius, t_fine)`.
    fn compensate_temperature(&self, adc_t: i32) -> (f32, f32) {
        let t1 = self.dig_t1 as f32;
        let var1 = (adc_t as f32 / 16384.0 - t1 / 1024.0) * self.dig_t2 as f32;
        let d = adc_t as f32 / 131072.0 - t1 / 8192.0;
        let var2 = d * d * self.dig_t3 as f32;
        let t_fine = (var1 + var2) as i32 as f32;
        ((var1 + var2) / 5120.0, t_fine)
    }

    fn compensate_pressure(&self, adc_p: i32, t_fine: f32) -> f32 {
        let var1 = t_fine / 2.0 - 64000.0;
        let var2 = var1 * var1 * self.dig_p6 as f32 / 32768.0;
        let var2 = var2 + var1 * self.dig_p5 as f32 * 2.0;
        let var2 = var2 / 4.0 + self.dig_p4 as f32 * 65536.0;
        let var1 =
            (self.dig_p3 as f32 * var1 * var1 / 524288.0 + self.dig_p2 as f32 * var1) / 524288.0;
        let var1 = (1.0 + var1 / 32768.0) * self.dig_p1 as f32;
        if var1 == 0.0 {
            return 0.0;
        }
        let p = 1048576.0 - adc_p as f32;
        let p = (p - var2 / 4096.0) * 6250.0 / var1;
        let var1 = self.dig_p9 as f32 * p * p / 2147483648.0;
        let var2 = p * self.dig_p8 as f32 / 32768.0;
        p + (var1 + var2 + self.dig_p7 as f32) / 16.0
    }
}

/// One burst of the data registers together with the trimming needed to
/// convert it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data {
    /// `[0..3]` pressure, `[3..6]` temperature
    pub raw: [u8; 6],
    pub trimming: Trimming,
}

impl Data {
    fn adc(bytes: &[u8]) -> u32 {
        (bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32
    }

    fn adc_p(&self) -> u32 {
        Self::adc(&self.raw[0..3])
    }

    fn adc_t(&self) -> u32 {
        Self::adc(&self.raw[3..6])
    }

    /// Temperature in °C, NaN if temperature was not measured.
    pub fn celsius(&self) -> f32 {
        let adc_t = self.adc_t();
        if adc_t == NOT_MEASURED {
            return f32::NAN;
        }
        self.trimming.compensate_temperature((adc_t >> 4) as i32).0
    }

    pub fn fahrenheit(&self) -> f32 {
        self.celsius() * 9.0 / 5.0 + 32.0
    }

    /// Pressure in Pa, NaN if either channel was not measured.
    pub fn pressure(&self) -> f32 {
        let (adc_p, adc_t) = (self.adc_p(), self.adc_t());
        if adc_t == NOT_MEASURED || adc_p == NOT_MEASURED {
            return f32::NAN;
        }
        let (_, t_fine) = self.trimming.compensate_temperature((adc_t >> 4) as i32);
        self.trimming.compensate_pressure((adc_p >> 4) as i32, t_fine)
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.2}°C, {:.1} Pa", self.celsius(), self.pressure())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub start_periodic: bool,
    pub osrs_pressure: Oversampling,
    pub osrs_temperature: Oversampling,
    pub filter: Filter,
    pub standby: Standby,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_periodic: true,
            osrs_pressure: Oversampling::X16,
            osrs_temperature: Oversampling::X2,
            filter: Filter::Coeff16,
            standby: Standby::Time1sec,
        }
    }
}

pub struct Bmp280<I2C, D, const N: usize = 1> {
    regs: Registers<I2C, D>,
    config: Config,
    periodic: Periodic<Data, N>,
    trimming: Trimming,
}

impl<I2C, D, const N: usize> Bmp280<I2C, D, N> {
    pub fn new(i2c: I2C, delay: D, config: Config) -> Self {
        Self::with_address(i2c, delay, config, ADDR)
    }

    /// The unit is strapped to 0x76, a bare module may use 0x77.
    pub fn with_address(i2c: I2C, delay: D, config: Config, address: u8) -> Self {
        Self {
            regs: Registers::new(i2c, delay, address),
            config,
            periodic: Periodic::new(),
            trimming: Trimming::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Trimming read by `begin`.
    pub fn trimming(&self) -> &Trimming {
        &self.trimming
    }

    pub fn release(self) -> (I2C, D) {
        self.regs.release()
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Bmp280<I2C, D, N> {
    fn ensure_idle(&self) -> Result<(), Error<I2C::Error>> {
        if self.periodic.in_periodic() {
            debug!("periodic measurement is running");
            return Err(Error::PeriodicRunning);
        }
        Ok(())
    }

    pub fn read_status(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.regs.read_u8(registers::STATUS)
    }

    /// A conversion is running.
    pub fn is_measuring(&mut self) -> Result<bool, Error<I2C::Error>> {
        Ok(self.read_status()? & registers::STATUS_MEASURING != 0)
    }

    fn wait_data_ready(&mut self, timeout_ms: u32) -> Result<(), Error<I2C::Error>> {
        self.regs.poll_u8(registers::STATUS, timeout_ms, |s| {
            s & (registers::STATUS_MEASURING | registers::STATUS_IM_UPDATE) == 0
        })?;
        Ok(())
    }

    fn read_ctrl_meas(&mut self) -> Result<CtrlMeas, Error<I2C::Error>> {
        Ok(CtrlMeas(self.regs.read_u8(registers::CTRL_MEAS)?))
    }

    fn read_config(&mut self) -> Result<ConfigReg, Error<I2C::Error>> {
        Ok(ConfigReg(self.regs.read_u8(registers::CONFIG)?))
    }

    pub fn read_power_mode(&mut self) -> Result<PowerMode, Error<I2C::Error>> {
        Ok(self.read_ctrl_meas()?.mode())
    }

    /// Mode changes are delayed by the device until a running conversion
    /// ends, so this waits for it first.
    pub fn write_power_mode(&mut self, mode: PowerMode) -> Result<(), Error<I2C::Error>> {
        let ctrl = self.read_ctrl_meas()?.with_mode(mode);
        self.wait_data_ready(registers::MODE_CHANGE_TIMEOUT)?;
        self.regs.write_u8(registers::CTRL_MEAS, ctrl.0)
    }

    /// Oversampling as `(pressure, temperature)`.
    pub fn read_oversampling(&mut self) -> Result<(Oversampling, Oversampling), Error<I2C::Error>> {
        let ctrl = self.read_ctrl_meas()?;
        Ok((ctrl.osrs_p(), ctrl.osrs_t()))
    }

    pub fn write_oversampling(
        &mut self,
        osrs_pressure: Oversampling,
        osrs_temperature: Oversampling,
    ) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        let ctrl = self
            .read_ctrl_meas()?
            .with_osrs_p(osrs_pressure)
            .with_osrs_t(osrs_temperature);
        self.regs.write_u8(registers::CTRL_MEAS, ctrl.0)
    }

    pub fn write_oversampling_pressure(&mut self, os: Oversampling) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        let ctrl = self.read_ctrl_meas()?.with_osrs_p(os);
        self.regs.write_u8(registers::CTRL_MEAS, ctrl.0)
    }

    pub fn write_oversampling_temperature(
        &mut self,
        os: Oversampling,
    ) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        let ctrl = self.read_ctrl_meas()?.with_osrs_t(os);
        self.regs.write_u8(registers::CTRL_MEAS, ctrl.0)
    }

    pub fn write_oversampling_setting(
        &mut self,
        setting: OversamplingSetting,
    ) -> Result<(), Error<I2C::Error>> {
        let (p, t) = setting.oversampling();
        self.write_oversampling(p, t)
    }

    pub fn read_filter(&mut self) -> Result<Filter, Error<I2C::Error>> {
        Ok(self.read_config()?.filter())
    }

    /// Writes to `config` may be ignored outside sleep mode, so this fails
    /// with [`Error::NotReady`] unless the device sleeps.
    pub fn write_filter(&mut self, filter: Filter) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        let mode = self.read_power_mode()?;
        if mode != PowerMode::Sleep {
            error!("config write needs sleep mode, mode is {}", mode as u8);
            return Err(Error::NotReady);
        }
        let config = self.read_config()?.with_filter(filter);
        self.regs.write_u8(registers::CONFIG, config.0)
    }

    pub fn read_standby_time(&mut self) -> Result<Standby, Error<I2C::Error>> {
        Ok(self.read_config()?.standby())
    }

    pub fn write_standby_time(&mut self, standby: Standby) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        let config = self.read_config()?.with_standby(standby);
        self.regs.write_u8(registers::CONFIG, config.0)
    }

    pub fn write_use_case(&mut self, use_case: UseCase) -> Result<(), Error<I2C::Error>> {
        let (setting, filter, standby) = use_case.settings();
        self.write_oversampling_setting(setting)?;
        self.write_filter(filter)?;
        self.write_standby_time(standby)
    }

    /// Resets the device and waits until the trimming copy is done.
    pub fn soft_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.regs
            .write_u8(registers::SOFT_RESET, registers::RESET_VALUE)?;
        self.regs.poll_u8(registers::STATUS, registers::SOFT_RESET_TIMEOUT, |s| {
            s & registers::STATUS_IM_UPDATE == 0
        })?;
        self.periodic.stop();
        Ok(())
    }

    pub fn read_trimming(&mut self) -> Result<Trimming, Error<I2C::Error>> {
        let mut buf = [0u8; registers::TRIMMING_LEN];
        self.regs.read(registers::TRIMMING, &mut buf)?;
        Ok(Trimming::from_bytes(&buf))
    }

    fn read_measurement(&mut self) -> Result<Data, Error<I2C::Error>> {
        let mut data = Data {
            trimming: self.trimming,
            ..Default::default()
        };
        self.regs.read(registers::DATA, &mut data.raw)?;
        Ok(data)
    }

    /// Writes the settings and enters normal mode.
    ///
    /// Pressure needs temperature for its compensation.
    pub fn start_periodic_measurement(
        &mut self,
        osrs_pressure: Oversampling,
        osrs_temperature: Oversampling,
        filter: Filter,
        standby: Standby,
    ) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        let config = ConfigReg::default().with_standby(standby).with_filter(filter);
        let ctrl = CtrlMeas::default()
            .with_osrs_p(osrs_pressure)
            .with_osrs_t(osrs_temperature);
        self.regs.write_pairs(&[
            (registers::CONFIG, config.0),
            (registers::CTRL_MEAS, ctrl.0),
        ])?;
        self.start_periodic_measurement_current()
    }

    /// Enters normal mode with the settings already in the device.
    pub fn start_periodic_measurement_current(&mut self) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        let standby = self.read_config()?.standby();
        self.write_power_mode(PowerMode::Normal)?;
        self.periodic.start(standby.interval());
        Ok(())
    }

    pub fn stop_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        if !self.periodic.in_periodic() {
            return Err(Error::NotPeriodic);
        }
        self.write_power_mode(PowerMode::Sleep)?;
        self.periodic.stop();
        Ok(())
    }

    /// Writes the settings and runs one forced measurement.
    pub fn measure_single_shot(
        &mut self,
        osrs_pressure: Oversampling,
        osrs_temperature: Oversampling,
        filter: Filter,
    ) -> Result<Data, Error<I2C::Error>> {
        self.ensure_idle()?;
        if osrs_temperature == Oversampling::Skipped {
            warn!("temperature must be measured");
            return Err(Error::InvalidArgument);
        }
        let config = ConfigReg::default().with_filter(filter);
        let ctrl = CtrlMeas::default()
            .with_osrs_p(osrs_pressure)
            .with_osrs_t(osrs_temperature);
        self.regs.write_pairs(&[
            (registers::CONFIG, config.0),
            (registers::CTRL_MEAS, ctrl.0),
        ])?;
        self.measure_single_shot_current()
    }

    /// One forced measurement with the settings already in the device.
    pub fn measure_single_shot_current(&mut self) -> Result<Data, Error<I2C::Error>> {
        self.ensure_idle()?;
        self.write_power_mode(PowerMode::Forced)?;

        // The device returns to sleep once the conversion is done
        for _ in 0..=registers::SINGLE_SHOT_TIMEOUT {
            let done = self.read_power_mode()? == PowerMode::Sleep
                && self.read_status()?
                    & (registers::STATUS_MEASURING | registers::STATUS_IM_UPDATE)
                    == 0;
            if done {
                return self.read_measurement();
            }
            self.regs.delay_ms(1);
        }
        warn!("forced measurement timed out");
        Err(Error::Timeout)
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Component for Bmp280<I2C, D, N> {
    type Error = Error<I2C::Error>;

    const NAME: &'static str = "UnitBMP280";
    const DEFAULT_ADDRESS: u8 = ADDR;

    fn address(&self) -> u8 {
        self.regs.address()
    }

    fn begin(&mut self) -> Result<(), Self::Error> {
        self.soft_reset()?;
        let id = self.regs.read_u8(registers::CHIP_ID)?;
        if id != registers::CHIP_IDENTIFIER {
            error!("not a BMP280, chip id {=u8:#x}", id);
            return Err(Error::UnsupportedDevice);
        }

        self.trimming = self.read_trimming()?;
        trace!(
            "trimming T {} {} {} P1 {}",
            self.trimming.dig_t1,
            self.trimming.dig_t2,
            self.trimming.dig_t3,
            self.trimming.dig_p1,
        );

        let Config {
            start_periodic,
            osrs_pressure,
            osrs_temperature,
            filter,
            standby,
        } = self.config;
        if start_periodic {
            self.start_periodic_measurement(osrs_pressure, osrs_temperature, filter, standby)?;
        }
        Ok(())
    }

    fn update(&mut self, now_ms: u64, force: bool) -> Result<bool, Self::Error> {
        self.periodic.begin_update();
        if !self.periodic.due(now_ms, force) {
            return Ok(false);
        }
        let data = self.read_measurement()?;
        self.periodic.store(now_ms, data);
        Ok(true)
    }
}

impl<I2C, D, const N: usize> PeriodicMeasurement<N> for Bmp280<I2C, D, N> {
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
    use crate::debug_utils::{NoDelay, RegisterBus};

    // Datasheet section 3.12 example
    const TRIMMING: Trimming = Trimming {
        dig_t1: 27504,
        dig_t2: 26435,
        dig_t3: -1000,
        dig_p1: 36477,
        dig_p2: -10685,
        dig_p3: 3024,
        dig_p4: 2855,
        dig_p5: 140,
        dig_p6: -7,
        dig_p7: 15500,
        dig_p8: -14600,
        dig_p9: 6000,
    };
    // adc_P 415148, adc_T 519888
    const RAW: [u8; 6] = [0x65, 0x5a, 0xc0, 0x7e, 0xed, 0x00];

    fn trimming_bytes() -> Vec<u8> {
        let t = TRIMMING;
        let mut v = Vec::new();
        v.extend(t.dig_t1.to_le_bytes());
        for s in [t.dig_t2, t.dig_t3] {
            v.extend(s.to_le_bytes());
        }
        v.extend(t.dig_p1.to_le_bytes());
        for s in [
            t.dig_p2, t.dig_p3, t.dig_p4, t.dig_p5, t.dig_p6, t.dig_p7, t.dig_p8, t.dig_p9,
        ] {
            v.extend(s.to_le_bytes());
        }
        v
    }

    // Forced mode finishes immediately.
    fn forced_returns_to_sleep(regs: &mut [u8; 256], reg: u8, value: u8) {
        if reg == registers::CTRL_MEAS && value & 0x03 != 0x03 {
            regs[registers::CTRL_MEAS as usize] = value & !0x03;
        }
    }

    fn device() -> RegisterBus {
        let mut bus = RegisterBus::new(ADDR).with_hook(forced_returns_to_sleep);
        bus.set(registers::CHIP_ID, &[registers::CHIP_IDENTIFIER]);
        bus.set(registers::TRIMMING, &trimming_bytes());
        bus.set(registers::DATA, &RAW);
        bus
    }

    fn bmp280(bus: RegisterBus, config: Config) -> Bmp280<RegisterBus, NoDelay, 2> {
        Bmp280::new(bus, NoDelay::default(), config)
    }

    #[test]
    fn test_compensation() {
        let data = Data {
            raw: RAW,
            trimming: TRIMMING,
        };
        assert!((data.celsius() - 25.08).abs() < 0.01);
        assert!((data.pressure() - 100653.27).abs() < 1.0);
        assert!((data.fahrenheit() - 77.144).abs() < 0.02);
    }

    #[test]
    fn test_skipped_channel_is_nan() {
        let data = Data {
            raw: [0x80, 0x00, 0x00, 0x7e, 0xed, 0x00],
            trimming: TRIMMING,
        };
        assert!(!data.celsius().is_nan());
        assert!(data.pressure().is_nan());

        let data = Data {
            raw: [0x65, 0x5a, 0xc0, 0x80, 0x00, 0x00],
            trimming: TRIMMING,
        };
        assert!(data.celsius().is_nan());
        assert!(data.pressure().is_nan());
    }

    #[test]
    fn test_trimming_from_bytes() {
        let bytes: [u8; 24] = trimming_bytes().try_into().unwrap();
        assert_eq!(Trimming::from_bytes(&bytes), TRIMMING);
    }

    #[test]
    fn test_begin_starts_normal_mode() {
        let mut sensor = bmp280(device(), Config::default());
        sensor.begin().unwrap();
        assert_eq!(sensor.trimming(), &TRIMMING);
        assert!(sensor.in_periodic());
        assert_eq!(sensor.interval(), 1000);

        let (bus, _) = sensor.release();
        assert_eq!(bus.written_to(registers::SOFT_RESET), [0xb6]);
        // t_sb 1 s, filter 16
        assert_eq!(bus.written_to(registers::CONFIG), [0b101_100_00]);
        // osrs_t x2, osrs_p x16, then normal mode
        assert_eq!(
            bus.written_to(registers::CTRL_MEAS),
            [0b010_101_00, 0b010_101_11]
        );
    }

    #[test]
    fn test_begin_rejects_other_chip() {
        let mut bus = device();
        bus.set(registers::CHIP_ID, &[0x60]);
        let mut sensor = bmp280(bus, Config::default());
        assert_eq!(sensor.begin(), Err(Error::UnsupportedDevice));
    }

    #[test]
    fn test_soft_reset_timeout() {
        let mut bus = device();
        bus.set(registers::STATUS, &[registers::STATUS_IM_UPDATE]);
        let mut sensor = bmp280(bus, Config::default());
        assert_eq!(sensor.soft_reset(), Err(Error::Timeout));
    }

    #[test]
    fn test_update() {
        let mut sensor = bmp280(device(), Config::default());
        sensor.begin().unwrap();

        assert_eq!(sensor.update(0, false), Ok(true));
        assert_eq!(sensor.update(999, false), Ok(false));
        assert!(!sensor.updated());
        assert_eq!(sensor.update(1000, false), Ok(true));
        assert_eq!(sensor.available(), 2);
        let latest = sensor.latest().unwrap();
        assert!((latest.pressure() - 100653.27).abs() < 1.0);
    }

    #[test]
    fn test_settings_rejected_while_periodic() {
        let mut sensor = bmp280(device(), Config::default());
        sensor.begin().unwrap();
        assert_eq!(
            sensor.write_oversampling(Oversampling::X1, Oversampling::X1),
            Err(Error::PeriodicRunning)
        );
        assert_eq!(sensor.write_filter(Filter::Off), Err(Error::PeriodicRunning));
        assert_eq!(
            sensor.write_standby_time(Standby::Time4sec),
            Err(Error::PeriodicRunning)
        );
        assert_eq!(
            sensor.measure_single_shot_current(),
            Err(Error::PeriodicRunning)
        );

        sensor.stop_periodic_measurement().unwrap();
        assert_eq!(sensor.read_power_mode(), Ok(PowerMode::Sleep));
        assert_eq!(sensor.stop_periodic_measurement(), Err(Error::NotPeriodic));
    }

    #[test]
    fn test_use_case() {
        let config = Config {
            start_periodic: false,
            ..Default::default()
        };
        let mut sensor = bmp280(device(), config);
        sensor.begin().unwrap();
        sensor.write_use_case(UseCase::Elevator).unwrap();
        assert_eq!(
            sensor.read_oversampling(),
            Ok((Oversampling::X4, Oversampling::X1))
        );
        assert_eq!(sensor.read_filter(), Ok(Filter::Coeff4));
        assert_eq!(sensor.read_standby_time(), Ok(Standby::Time125ms));
    }

    #[test]
    fn test_single_shot() {
        let config = Config {
            start_periodic: false,
            ..Default::default()
        };
        let mut sensor = bmp280(device(), config);
        sensor.begin().unwrap();

        assert_eq!(
            sensor.measure_single_shot(Oversampling::X1, Oversampling::Skipped, Filter::Off),
            Err(Error::InvalidArgument)
        );
        let data = sensor
            .measure_single_shot(Oversampling::X4, Oversampling::X1, Filter::Off)
            .unwrap();
        assert!((data.celsius() - 25.08).abs() < 0.01);
        assert!(!sensor.in_periodic());

        let (bus, _) = sensor.release();
        assert_eq!(
            bus.written_to(registers::CTRL_MEAS),
            [0b001_011_00, 0b001_011_01]
        );
    }

    #[test]
    fn test_register_fields() {
        let ctrl = CtrlMeas(0b111_110_10);
        assert_eq!(ctrl.osrs_t(), Oversampling::X16);
        assert_eq!(ctrl.osrs_p(), Oversampling::X16);
        assert_eq!(ctrl.mode(), PowerMode::Forced);
        let config = ConfigReg(0b000_111_00);
        assert_eq!(config.filter(), Filter::Coeff16);
        assert_eq!(config.standby(), Standby::Time0_5ms);
    }
}
