//! QMP6988 barometric pressure sensor (ENV III).

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::component::Component;
use crate::periodic::{Periodic, PeriodicMeasurement};
use crate::register::Registers;
use crate::Error;

pub mod registers;

pub const ADDR: u8 = 0x70;

/// Raw conversions are offset binary around 2^23.
const SUB_RAW: u32 = 0x80_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
    Sleep = 0,
    Forced = 1,
    Normal = 3,
}

impl PowerMode {
    fn from_bits(bits: u8) -> Self {
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
    Skip = 0,
    X1 = 1,
    X2 = 2,
    X4 = 3,
    X8 = 4,
    X16 = 5,
    X32 = 6,
    X64 = 7,
}

impl Oversampling {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Oversampling::Skip,
            1 => Oversampling::X1,
            2 => Oversampling::X2,
            3 => Oversampling::X4,
            4 => Oversampling::X8,
            5 => Oversampling::X16,
            6 => Oversampling::X32,
            _ => Oversampling::X64,
        }
    }
}

/// Oversampling presets, `(pressure, temperature)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OversamplingSetting {
    HighSpeed,
    LowPower,
    Standard,
    HighAccuracy,
    UltraHighAccuracy,
}

impl OversamplingSetting {
    pub fn oversampling(&self) -> (Oversampling, Oversampling) {
        use Oversampling::*;
        match self {
            OversamplingSetting::HighSpeed => (X2, X1),
            OversamplingSetting::LowPower => (X4, X1),
            OversamplingSetting::Standard => (X8, X1),
            OversamplingSetting::HighAccuracy => (X16, X2),
            OversamplingSetting::UltraHighAccuracy => (X32, X4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Filter {
    Off = 0,
    Coeff2 = 1,
    Coeff4 = 2,
    Coeff8 = 3,
    Coeff16 = 4,
    Coeff32 = 5,
}

impl Filter {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Filter::Off,
            1 => Filter::Coeff2,
            2 => Filter::Coeff4,
            3 => Filter::Coeff8,
            4 => Filter::Coeff16,
            _ => Filter::Coeff32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Standby {
    Time1ms = 0,
    Time5ms = 1,
    Time50ms = 2,
    Time250ms = 3,
    Time500ms = 4,
    Time1sec = 5,
    Time2sec = 6,
    Time4sec = 7,
}

impl Standby {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Standby::Time1ms,
            1 => Standby::Time5ms,
            2 => Standby::Time50ms,
            3 => Standby::Time250ms,
            4 => Standby::Time500ms,
            5 => Standby::Time1sec,
            6 => Standby::Time2sec,
            _ => Standby::Time4sec,
        }
    }

    pub fn interval(&self) -> u32 {
        match self {
            Standby::Time1ms => 1,
            Standby::Time5ms => 5,
            Standby::Time50ms => 50,
            Standby::Time250ms => 250,
            Standby::Time500ms => 500,
            Standby::Time1sec => 1000,
            Standby::Time2sec => 2000,
            Standby::Time4sec => 4000,
        }
    }
}

/// Application presets from the datasheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UseCase {
    Weather,
    Drop,
    Elevator,
    Stair,
    /// Indoor navigation
    Indoor,
}

impl UseCase {
    pub fn settings(&self) -> (OversamplingSetting, Filter) {
        match self {
            UseCase::Weather => (OversamplingSetting::HighSpeed, Filter::Off),
            UseCase::Drop => (OversamplingSetting::LowPower, Filter::Off),
            UseCase::Elevator => (OversamplingSetting::Standard, Filter::Coeff4),
            UseCase::Stair => (OversamplingSetting::HighAccuracy, Filter::Coeff8),
            UseCase::Indoor => (OversamplingSetting::UltraHighAccuracy, Filter::Coeff32),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status(pub u8);

impl Status {
    /// A conversion is running.
    pub fn measure(&self) -> bool {
        self.0 & registers::STATUS_MEASURE != 0
    }

    /// OTP data is being copied.
    pub fn otp_update(&self) -> bool {
        self.0 & registers::STATUS_OTP_UPDATE != 0
    }
}

/// `ctrl_meas`: temp_average 7..5, press_average 4..2, power_mode 1..0.
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

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Fixed point compensation coefficients derived from the OTP block.
/// The comments give the Q format of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    /// 20Q4
    pub b00: i32,
    /// 28Q15
    pub bt1: i32,
    /// 34Q38
    pub bt2: i64,
    /// 31Q20
    pub bp1: i32,
    /// 28Q34
    pub b11: i32,
    /// 29Q43
    pub bp2: i32,
    /// 29Q53
    pub b12: i32,
    /// 29Q60
    pub b21: i32,
    /// 28Q65
    pub bp3: i32,
    /// 20Q4
    pub a0: i32,
    /// 31Q23
    pub a1: i32,
    /// 31Q47
    pub a2: i32,
}

impl Calibration {
    pub fn from_bytes(otp: &[u8; registers::CALIBRATION_LEN]) -> Self {
        let be = |i: usize| u16::from_be_bytes([otp[i], otp[i + 1]]);
        let k = |i: usize| be(i) as i16 as i64;
        let b00 = ((be(0) as u32) << 4) | ((otp[24] >> 4) & 0x0f) as u32;
        let a0 = ((be(18) as u32) << 4) | (otp[24] & 0x0f) as u32;
        Self {
            b00: sign_extend(b00, 20),
            bt1: (2982 * k(2) + 107_370_906) as i32,
            bt2: 329_854 * k(4) + 108_083_093,
            bp1: (19923 * k(6) + 1_133_836_764) as i32,
            b11: (2406 * k(8) + 118_215_883) as i32,
            bp2: (3079 * k(10) - 181_579_595) as i32,
            b12: (6846 * k(12) + 85_590_281) as i32,
            b21: (13836 * k(14) + 79_333_336) as i32,
            bp3: (2915 * k(16) + 157_155_561) as i32,
            a0: sign_extend(a0, 20),
            a1: (3608 * k(20) - 1_731_677_965) as i32,
            a2: (16889 * k(22) - 87_619_360) as i32,
        }
    }

    /// Temperature in 1/256 °C.
    pub fn temperature256(&self, dt: i32) -> i16 {
        let dt = dt as i64;
        let wk1 = self.a1 as i64 * dt;
        let wk2 = (self.a2 as i64 * dt) >> 14;
        let wk2 = (wk2 * dt) >> 10;
        let wk2 = ((wk1 + wk2) / 32767) >> 19;
        ((self.a0 as i64 + wk2) >> 4) as i16
    }

    /// Pressure in 1/16 Pa.
    pub fn pressure16(&self, dp: i32, tx: i16) -> i32 {
        let (dp, tx) = (dp as i64, tx as i64);

        let mut wk1 = self.bt1 as i64 * tx;
        wk1 += (self.bp1 as i64 * dp) >> 5;

        let mut wk3 = (((self.bt2 * tx) >> 1) * tx) >> 8;
        wk3 += (((self.b11 as i64 * tx) >> 4) * dp) >> 1;
        wk3 += (((self.bp2 as i64 * dp) >> 13) * dp) >> 1;
        wk1 += wk3 >> 14;

        let mut wk3 = (((self.b12 as i64 * tx * tx) >> 22) * dp) >> 1;
        wk3 += (((((self.b21 as i64 * tx) >> 6) * dp) >> 23) * dp) >> 1;
        wk3 += ((((self.bp3 as i64 * dp) >> 12) * dp) >> 23) * dp;
        wk1 += wk3 >> 15;

        wk1 /= 32767;
        wk1 >>= 11;
        (wk1 + self.b00 as i64) as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data {
    /// `[0..3]` pressure, `[3..6]` temperature
    pub raw: [u8; 6],
    pub calibration: Calibration,
}

impl Data {
    fn adc(bytes: &[u8]) -> u32 {
        (bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32
    }

    fn dt(&self) -> Option<i32> {
        let rt = Self::adc(&self.raw[3..6]);
        (rt != 0).then(|| rt.wrapping_sub(SUB_RAW) as i32)
    }

    fn dp(&self) -> Option<i32> {
        let rp = Self::adc(&self.raw[0..3]);
        (rp != 0).then(|| rp.wrapping_sub(SUB_RAW) as i32)
    }

    pub fn temperature256(&self) -> Option<i16> {
        self.dt().map(|dt| self.calibration.temperature256(dt))
    }

    /// Temperature in °C, NaN if not measured.
    pub fn celsius(&self) -> f32 {
        self.temperature256()
            .map_or(f32::NAN, |t| t as f32 / 256.0)
    }

    pub fn fahrenheit(&self) -> f32 {
        self.celsius() * 9.0 / 5.0 + 32.0
    }

    /// Pressure in Pa, NaN if not measured.
    pub fn pressure(&self) -> f32 {
        match (self.temperature256(), self.dp()) {
            (Some(t), Some(dp)) => self.calibration.pressure16(dp, t) as f32 / 16.0,
            _ => f32::NAN,
        }
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
            osrs_pressure: Oversampling::X8,
            osrs_temperature: Oversampling::X1,
            filter: Filter::Coeff4,
            standby: Standby::Time1sec,
        }
    }
}

pub struct Qmp6988<I2C, D, const N: usize = 1> {
    regs: Registers<I2C, D>,
    config: Config,
    periodic: Periodic<Data, N>,
    calibration: Calibration,
    only_temperature: bool,
}

impl<I2C, D, const N: usize> Qmp6988<I2C, D, N> {
    pub fn new(i2c: I2C, delay: D, config: Config) -> Self {
        Self::with_address(i2c, delay, config, ADDR)
    }

    pub fn with_address(i2c: I2C, delay: D, config: Config, address: u8) -> Self {
        Self {
            regs: Registers::new(i2c, delay, address),
            config,
            periodic: Periodic::new(),
            calibration: Calibration::default(),
            only_temperature: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn release(self) -> (I2C, D) {
        self.regs.release()
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Qmp6988<I2C, D, N> {
    fn ensure_idle(&self) -> Result<(), Error<I2C::Error>> {
        if self.periodic.in_periodic() {
            debug!("periodic measurement is running");
            return Err(Error::PeriodicRunning);
        }
        Ok(())
    }

    pub fn read_status(&mut self) -> Result<Status, Error<I2C::Error>> {
        Ok(Status(self.regs.read_u8(registers::STATUS)?))
    }

    fn wait_data_ready(&mut self, timeout_ms: u32) -> Result<(), Error<I2C::Error>> {
        self.regs
            .poll_u8(registers::STATUS, timeout_ms, |s| !Status(s).measure())?;
        Ok(())
    }

    fn read_ctrl_meas(&mut self) -> Result<CtrlMeas, Error<I2C::Error>> {
        Ok(CtrlMeas(self.regs.read_u8(registers::CTRL_MEAS)?))
    }

    pub fn read_power_mode(&mut self) -> Result<PowerMode, Error<I2C::Error>> {
        Ok(self.read_ctrl_meas()?.mode())
    }

    /// Switching modes mid conversion corrupts the next result, so this
    /// waits for a running conversion first.
    pub fn write_power_mode(&mut self, mode: PowerMode) -> Result<(), Error<I2C::Error>> {
        let ctrl = self.read_ctrl_meas()?.with_mode(mode);
        self.wait_data_ready(registers::MEASUREMENT_TIMEOUT)?;
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
        Ok(Filter::from_bits(self.regs.read_u8(registers::IIR_FILTER)?))
    }

    pub fn write_filter(&mut self, filter: Filter) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        self.regs.write_u8(registers::IIR_FILTER, filter as u8)
    }

    pub fn read_standby_time(&mut self) -> Result<Standby, Error<I2C::Error>> {
        Ok(Standby::from_bits(self.regs.read_u8(registers::IO_SETUP)? >> 5))
    }

    pub fn write_standby_time(&mut self, standby: Standby) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        self.regs
            .update_bits(registers::IO_SETUP, 0x07 << 5, (standby as u8) << 5)
    }

    pub fn write_use_case(&mut self, use_case: UseCase) -> Result<(), Error<I2C::Error>> {
        let (setting, filter) = use_case.settings();
        self.write_oversampling_setting(setting)?;
        self.write_filter(filter)
    }

    /// The device does not acknowledge the reset write, so its result is
    /// ignored.
    pub fn soft_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        let _ = self.regs.write_u8(registers::RESET, registers::RESET_VALUE);
        self.regs.delay_ms(registers::RESET_DURATION);
        self.regs.write_u8(registers::RESET, 0x00)?;
        self.periodic.stop();
        Ok(())
    }

    pub fn read_calibration(&mut self) -> Result<Calibration, Error<I2C::Error>> {
        let mut otp = [0u8; registers::CALIBRATION_LEN];
        self.regs.read(registers::CALIBRATION, &mut otp)?;
        Ok(Calibration::from_bytes(&otp))
    }

    fn read_measurement(&mut self, only_temperature: bool) -> Result<Data, Error<I2C::Error>> {
        let mut data = Data {
            calibration: self.calibration,
            ..Default::default()
        };
        self.regs.read(registers::DATA, &mut data.raw)?;
        // The pressure registers keep their last value when skipped
        if only_temperature {
            data.raw[..3].fill(0);
        }
        Ok(data)
    }

    /// Temperature is required, pressure may be skipped for temperature
    /// only measurement.
    pub fn start_periodic_measurement(
        &mut self,
        osrs_pressure: Oversampling,
        osrs_temperature: Oversampling,
        filter: Filter,
        standby: Standby,
    ) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        if osrs_temperature == Oversampling::Skip {
            warn!("temperature must be measured");
            return Err(Error::InvalidArgument);
        }
        self.write_oversampling(osrs_pressure, osrs_temperature)?;
        self.write_filter(filter)?;
        self.write_standby_time(standby)?;
        self.start_periodic_measurement_current()
    }

    /// Enters normal mode with the settings already in the device.
    pub fn start_periodic_measurement_current(&mut self) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        let standby = self.read_standby_time()?;
        self.only_temperature = self.read_ctrl_meas()?.osrs_p() == Oversampling::Skip;
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

    pub fn measure_single_shot(
        &mut self,
        osrs_pressure: Oversampling,
        osrs_temperature: Oversampling,
        filter: Filter,
    ) -> Result<Data, Error<I2C::Error>> {
        self.ensure_idle()?;
        if osrs_temperature == Oversampling::Skip {
            warn!("temperature must be measured");
            return Err(Error::InvalidArgument);
        }
        self.write_oversampling(osrs_pressure, osrs_temperature)?;
        self.write_filter(filter)?;
        self.measure_single_shot_current()
    }

    /// One forced measurement with the settings already in the device.
    pub fn measure_single_shot_current(&mut self) -> Result<Data, Error<I2C::Error>> {
        self.ensure_idle()?;
        let only_temperature = self.read_ctrl_meas()?.osrs_p() == Oversampling::Skip;
        self.write_power_mode(PowerMode::Forced)?;
        self.wait_data_ready(registers::MEASUREMENT_TIMEOUT)?;
        self.read_measurement(only_temperature)
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Component for Qmp6988<I2C, D, N> {
    type Error = Error<I2C::Error>;

    const NAME: &'static str = "UnitQMP6988";
    const DEFAULT_ADDRESS: u8 = ADDR;

    fn address(&self) -> u8 {
        self.regs.address()
    }

    fn begin(&mut self) -> Result<(), Self::Error> {
        let id = self.regs.read_u8(registers::CHIP_ID)?;
        if id != registers::CHIP_IDENTIFIER {
            error!("not a QMP6988, chip id {=u8:#x}", id);
            return Err(Error::UnsupportedDevice);
        }
        self.soft_reset()?;
        self.calibration = self.read_calibration()?;

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
        let data = self.read_measurement(self.only_temperature)?;
        self.periodic.store(now_ms, data);
        Ok(true)
    }
}

impl<I2C, D, const N: usize> PeriodicMeasurement<N> for Qmp6988<I2C, D, N> {
    type Data = Data;

    fn periodic(&self) -> &Periodic<Data, N> {
        &self.periodic
    }

    fn periodic_mut(&mut self) -> &mut Periodic<Data, N> {
        &mut self.periodic
    }
}
