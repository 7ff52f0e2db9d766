//! BME688 gas, pressure, temperature and humidity sensor (ENV Pro).
//!
//! Conversions follow the floating point variant of the Bosch reference
//! driver. Gas resistance is computed with the formula matching the device
//! variant read at `begin`.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use heapless::Vec;

use crate::component::Component;
use crate::periodic::{Periodic, PeriodicMeasurement};
use crate::register::Registers;
use crate::Error;

pub mod registers;

use registers::{FIELD_COUNT, FIELD_LEN, MAX_PROFILES};

pub const ADDR: u8 = 0x77;

/// idac, res_heat and gas_wait for all ten profiles, 0x50..0x6d.
const HEATER_BLOCK_LEN: usize = 3 * MAX_PROFILES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Sleep = 0,
    Forced = 1,
    Parallel = 2,
    Sequential = 3,
}

impl Mode {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Mode::Sleep,
            1 => Mode::Forced,
            2 => Mode::Parallel,
            _ => Mode::Sequential,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Oversampling {
    /// Channel is not measured.
    None = 0,
    X1 = 1,
    X2 = 2,
    X4 = 3,
    X8 = 4,
    X16 = 5,
}

impl Oversampling {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Oversampling::None,
            1 => Oversampling::X1,
            2 => Oversampling::X2,
            3 => Oversampling::X4,
            4 => Oversampling::X8,
            _ => Oversampling::X16,
        }
    }

    fn cycles(&self) -> u32 {
        match self {
            Oversampling::None => 0,
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
            Oversampling::X16 => 16,
        }
    }
}

/// IIR filter coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Filter {
    None = 0,
    Coeff1 = 1,
    Coeff3 = 2,
    Coeff7 = 3,
    Coeff15 = 4,
    Coeff31 = 5,
    Coeff63 = 6,
    Coeff127 = 7,
}

impl Filter {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Filter::None,
            1 => Filter::Coeff1,
            2 => Filter::Coeff3,
            3 => Filter::Coeff7,
            4 => Filter::Coeff15,
            5 => Filter::Coeff31,
            6 => Filter::Coeff63,
            _ => Filter::Coeff127,
        }
    }
}

/// Standby time between sequential mode cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Odr {
    Ms0_59 = 0,
    Ms62_5 = 1,
    Ms125 = 2,
    Ms250 = 3,
    Ms500 = 4,
    Ms1000 = 5,
    Ms10 = 6,
    Ms20 = 7,
    /// No standby
    None = 8,
}

impl Odr {
    fn from_bits(odr3: bool, odr20: u8) -> Self {
        if odr3 {
            return Odr::None;
        }
        match odr20 & 0x07 {
            0 => Odr::Ms0_59,
            1 => Odr::Ms62_5,
            2 => Odr::Ms125,
            3 => Odr::Ms250,
            4 => Odr::Ms500,
            5 => Odr::Ms1000,
            6 => Odr::Ms10,
            _ => Odr::Ms20,
        }
    }

    /// `(ctrl_gas_1 odr3 bit, config odr 2..0)`
    fn bits(&self) -> (u8, u8) {
        match self {
            Odr::None => (registers::ODR3, 0),
            odr => (0, *odr as u8),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GasWaitFactor {
    X1 = 0,
    X4 = 1,
    X16 = 2,
    X64 = 3,
}

/// Encoded heater duration: a 6 bit step and a 2 bit multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GasWait(pub u8);

impl GasWait {
    /// 63 × 64 ms
    pub const MAX: GasWait = GasWait(0xff);

    fn encode(mut step: u32) -> Self {
        let mut factor = 0u8;
        while step > 0x3f {
            step /= 4;
            factor += 1;
        }
        Self(step as u8 | factor << 6)
    }

    /// Encodes `ms`, saturating at [`GasWait::MAX`].
    pub fn from_duration(ms: u16) -> Self {
        if ms >= 0xfc0 {
            return Self::MAX;
        }
        Self::encode(ms as u32)
    }

    /// Encodes the parallel mode heater duration, counted in 477 µs steps.
    pub fn from_shared_duration(ms: u16) -> Self {
        if ms >= 0x783 {
            return Self::MAX;
        }
        Self::encode(ms as u32 * 1000 / 477)
    }

    pub fn step(&self) -> u8 {
        self.0 & 0x3f
    }

    pub fn factor(&self) -> GasWaitFactor {
        match self.0 >> 6 {
            0 => GasWaitFactor::X1,
            1 => GasWaitFactor::X4,
            2 => GasWaitFactor::X16,
            _ => GasWaitFactor::X64,
        }
    }

    /// Duration in ms (477 µs steps for the shared duration).
    pub fn duration(&self) -> u16 {
        let multiplier = match self.factor() {
            GasWaitFactor::X1 => 1,
            GasWaitFactor::X4 => 4,
            GasWaitFactor::X16 => 16,
            GasWaitFactor::X64 => 64,
        };
        self.step() as u16 * multiplier
    }
}

/// Temperature, pressure and humidity settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TphSetting {
    pub oversampling_temperature: Oversampling,
    pub oversampling_pressure: Oversampling,
    pub oversampling_humidity: Oversampling,
    pub filter: Filter,
    pub odr: Odr,
}

impl Default for TphSetting {
    fn default() -> Self {
        Self {
            oversampling_temperature: Oversampling::X2,
            oversampling_pressure: Oversampling::X1,
            oversampling_humidity: Oversampling::X16,
            filter: Filter::None,
            odr: Odr::None,
        }
    }
}

impl TphSetting {
    /// Duration of one TPH and gas conversion in µs, heating excluded.
    pub fn measurement_duration(&self, mode: Mode) -> u32 {
        let cycles = self.oversampling_temperature.cycles()
            + self.oversampling_pressure.cycles()
            + self.oversampling_humidity.cycles();
        // TPH switching and gas measurement
        let mut duration = cycles * 1963 + 477 * 4 + 477 * 5;
        if mode != Mode::Parallel {
            // wake up
            duration += 1000;
        }
        duration
    }
}

/// Heater configuration for all measuring modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeaterConf {
    pub enable: bool,
    /// Forced mode target in °C.
    pub temperature: u16,
    /// Forced mode heating time in ms.
    pub duration: u16,
    /// Parallel and sequential targets in °C.
    pub temperature_profile: [u16; MAX_PROFILES],
    /// Sequential heating times in ms. In parallel mode each entry is a
    /// multiple of `shared_duration`.
    pub duration_profile: [u16; MAX_PROFILES],
    pub profile_len: u8,
    /// Parallel mode heating time in ms.
    pub shared_duration: u16,
}

impl Default for HeaterConf {
    fn default() -> Self {
        Self::forced(300, 100)
    }
}

impl HeaterConf {
    pub fn forced(temperature: u16, duration: u16) -> Self {
        Self {
            enable: true,
            temperature,
            duration,
            temperature_profile: [0; MAX_PROFILES],
            duration_profile: [0; MAX_PROFILES],
            profile_len: 0,
            shared_duration: 0,
        }
    }
}

/// Heater registers as read back. Targets are stored as heater resistance
/// codes, so the temperatures they came from cannot be recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeaterRegisters {
    pub enable: bool,
    pub profile_len: u8,
    pub res_heat: [u8; MAX_PROFILES],
    pub gas_wait: [GasWait; MAX_PROFILES],
    pub shared_wait: GasWait,
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

    fn with_osrs_t(self, os: Oversampling) -> Self {
        Self((self.0 & !(0x07 << 5)) | ((os as u8) << 5))
    }

    fn with_osrs_p(self, os: Oversampling) -> Self {
        Self((self.0 & !(0x07 << 2)) | ((os as u8) << 2))
    }

    fn sleeping(self) -> Self {
        Self(self.0 & !0x03)
    }
}

/// `config`: odr 7..5, filter 4..2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ConfigReg(u8);

impl ConfigReg {
    fn odr(&self) -> u8 {
        self.0 >> 5
    }

    fn filter(&self) -> Filter {
        Filter::from_bits(self.0 >> 2)
    }

    fn with_odr(self, odr: u8) -> Self {
        Self((self.0 & !(0x07 << 5)) | ((odr & 0x07) << 5))
    }

    fn with_filter(self, filter: Filter) -> Self {
        Self((self.0 & !(0x07 << 2)) | ((filter as u8) << 2))
    }
}

/// Factory calibration, named as in the Bosch reference driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    pub par_t1: u16,
    pub par_t2: i16,
    pub par_t3: i8,
    pub par_p1: u16,
    pub par_p2: i16,
    pub par_p3: i8,
    pub par_p4: i16,
    pub par_p5: i16,
    pub par_p6: i8,
    pub par_p7: i8,
    pub par_p8: i16,
    pub par_p9: i16,
    pub par_p10: u8,
    pub par_h1: u16,
    pub par_h2: u16,
    pub par_h3: i8,
    pub par_h4: i8,
    pub par_h5: i8,
    pub par_h6: u8,
    pub par_h7: i8,
    pub par_gh1: i8,
    pub par_gh2: i16,
    pub par_gh3: i8,
    pub res_heat_range: u8,
    pub res_heat_val: i8,
    pub range_sw_err: i8,
}

impl Calibration {
    /// Parses the blocks at 0x8a, 0xe1 and 0x00.
    pub fn from_blocks(
        c0: &[u8; registers::COEFF0_LEN],
        c1: &[u8; registers::COEFF1_LEN],
        c2: &[u8; registers::COEFF2_LEN],
    ) -> Self {
        let le = |b: &[u8], i: usize| u16::from_le_bytes([b[i], b[i + 1]]);
        Self {
            par_t1: le(c1, 8),
            par_t2: le(c0, 0) as i16,
            par_t3: c0[2] as i8,
            par_p1: le(c0, 4),
            par_p2: le(c0, 6) as i16,
            par_p3: c0[8] as i8,
            par_p4: le(c0, 10) as i16,
            par_p5: le(c0, 12) as i16,
            par_p6: c0[15] as i8,
            par_p7: c0[14] as i8,
            par_p8: le(c0, 18) as i16,
            par_p9: le(c0, 20) as i16,
            par_p10: c0[22],
            // 12 bit values sharing 0xe2
            par_h1: (c1[2] as u16) << 4 | (c1[1] & 0x0f) as u16,
            par_h2: (c1[0] as u16) << 4 | (c1[1] >> 4) as u16,
            par_h3: c1[3] as i8,
            par_h4: c1[4] as i8,
            par_h5: c1[5] as i8,
            par_h6: c1[6],
            par_h7: c1[7] as i8,
            par_gh1: c1[12] as i8,
            par_gh2: le(c1, 10) as i16,
            par_gh3: c1[13] as i8,
            res_heat_val: c2[0] as i8,
            res_heat_range: (c2[2] >> 4) & 0x03,
            range_sw_err: (c2[4] as i8) >> 4,
        }
    }

    /// Returns `(celsius, t_fine)`.
    pub fn compensate_temperature(&self, adc: u32) -> (f32, f32) {
        let t1 = self.par_t1 as f32;
        let var1 = (adc as f32 / 16384.0 - t1 / 1024.0) * self.par_t2 as f32;
        let d = adc as f32 / 131072.0 - t1 / 8192.0;
        let var2 = d * d * (self.par_t3 as f32 * 16.0);
        let t_fine = var1 + var2;
        (t_fine / 5120.0, t_fine)
    }

    /// Pressure in Pa.
    pub fn compensate_pressure(&self, adc: u32, t_fine: f32) -> f32 {
        let var1 = t_fine / 2.0 - 64000.0;
        let var2 = var1 * var1 * (self.par_p6 as f32 / 131072.0);
        let var2 = var2 + var1 * self.par_p5 as f32 * 2.0;
        let var2 = var2 / 4.0 + self.par_p4 as f32 * 65536.0;
        let var1 = (self.par_p3 as f32 * var1 * var1 / 16384.0 + self.par_p2 as f32 * var1)
            / 524288.0;
        let var1 = (1.0 + var1 / 32768.0) * self.par_p1 as f32;
        if var1 == 0.0 {
            return 0.0;
        }
        let p = 1048576.0 - adc as f32;
        let p = (p - var2 / 4096.0) * 6250.0 / var1;
        let var1 = self.par_p9 as f32 * p * p / 2147483648.0;
        let var2 = p * (self.par_p8 as f32 / 32768.0);
        let q = p / 256.0;
        let var3 = q * q * q * (self.par_p10 as f32 / 131072.0);
        p + (var1 + var2 + var3 + self.par_p7 as f32 * 128.0) / 16.0
    }

    /// Relative humidity in %, clamped to 0..=100.
    pub fn compensate_humidity(&self, adc: u32, t_fine: f32) -> f32 {
        let temp = t_fine / 5120.0;
        let var1 = adc as f32
            - (self.par_h1 as f32 * 16.0 + (self.par_h3 as f32 / 2.0) * temp);
        let var2 = var1
            * ((self.par_h2 as f32 / 262144.0)
                * (1.0
                    + (self.par_h4 as f32 / 16384.0) * temp
                    + (self.par_h5 as f32 / 1048576.0) * temp * temp));
        let var3 = self.par_h6 as f32 / 16384.0;
        let var4 = self.par_h7 as f32 / 2097152.0;
        let humidity = var2 + (var3 + var4 * temp) * var2 * var2;
        humidity.clamp(0.0, 100.0)
    }

    /// Gas resistance in Ω for the high gas variant (BME688).
    pub fn gas_resistance_high(&self, adc: u32, range: u8) -> f32 {
        let var1 = 262144u32 >> (range & 0x0f);
        let var2 = (adc as i32 - 512) * 3 + 4096;
        1_000_000.0 * var1 as f32 / var2 as f32
    }

    /// Gas resistance in Ω for the low gas variant (BME680).
    pub fn gas_resistance_low(&self, adc: u32, range: u8) -> f32 {
        const K1: [f32; 16] = [
            0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, -0.8, 0.0, 0.0, -0.2, -0.5, 0.0, -1.0, 0.0, 0.0,
        ];
        const K2: [f32; 16] = [
            0.0, 0.0, 0.0, 0.0, 0.1, 0.7, 0.0, -0.8, -0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        ];
        let range = (range & 0x0f) as usize;
        let var1 = 1340.0 + 5.0 * self.range_sw_err as f32;
        let var2 = var1 * (1.0 + K1[range] / 100.0);
        let var3 = 1.0 + K2[range] / 100.0;
        1.0 / (var3 * 0.000000125 * (1u32 << range) as f32 * ((adc as f32 - 512.0) / var2 + 1.0))
    }

    /// `res_heat_x` code for a heater target, capped at 400 °C.
    pub fn heater_resistance(&self, temperature: u16, ambient: i8) -> u8 {
        let temperature = temperature.min(400) as f32;
        let var1 = self.par_gh1 as f32 / 16.0 + 49.0;
        let var2 = (self.par_gh2 as f32 / 32768.0) * 0.0005 + 0.00235;
        let var3 = self.par_gh3 as f32 / 1024.0;
        let var4 = var1 * (1.0 + var2 * temperature);
        let var5 = var4 + var3 * ambient as f32;
        (3.4 * (var5
            * (4.0 / (4.0 + self.res_heat_range as f32))
            * (1.0 / (1.0 + self.res_heat_val as f32 * 0.002))
            - 25.0)) as u8
    }
}

/// One compensated field.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data {
    /// New data, gas valid and heater stable flags.
    pub status: u8,
    /// Heater profile step the gas reading belongs to.
    pub gas_index: u8,
    pub meas_index: u8,
    pub res_heat: u8,
    pub idac: u8,
    pub gas_wait: u8,
    /// °C
    pub temperature: f32,
    /// Pa
    pub pressure: f32,
    /// %RH
    pub humidity: f32,
    /// Ω
    pub gas_resistance: f32,
}

impl Data {
    fn parse(
        raw: &[u8],
        heater: &[u8; HEATER_BLOCK_LEN],
        calibration: &Calibration,
        gas_high: bool,
    ) -> Self {
        let adc = |i: usize| (raw[i] as u32) << 12 | (raw[i + 1] as u32) << 4 | (raw[i + 2] as u32) >> 4;
        let adc_hum = u16::from_be_bytes([raw[8], raw[9]]) as u32;
        let (gas_msb, gas_lsb) = if gas_high {
            (raw[15], raw[16])
        } else {
            (raw[13], raw[14])
        };
        let adc_gas = (gas_msb as u32) << 2 | (gas_lsb as u32) >> 6;
        let gas_range = gas_lsb & 0x0f;

        let gas_index = raw[0] & registers::GAS_INDEX;
        let profile = gas_index as usize;
        let heater_reg = |base: usize| {
            if profile < MAX_PROFILES {
                heater[base + profile]
            } else {
                0
            }
        };

        let (temperature, t_fine) = calibration.compensate_temperature(adc(5));
        Self {
            status: (raw[0] & registers::NEW_DATA)
                | (gas_lsb & (registers::GAS_VALID | registers::HEAT_STABLE)),
            gas_index,
            meas_index: raw[1],
            idac: heater_reg(0),
            res_heat: heater_reg(MAX_PROFILES),
            gas_wait: heater_reg(2 * MAX_PROFILES),
            temperature,
            pressure: calibration.compensate_pressure(adc(2), t_fine),
            humidity: calibration.compensate_humidity(adc_hum, t_fine),
            gas_resistance: if gas_high {
                calibration.gas_resistance_high(adc_gas, gas_range)
            } else {
                calibration.gas_resistance_low(adc_gas, gas_range)
            },
        }
    }

    pub fn new_data(&self) -> bool {
        self.status & registers::NEW_DATA != 0
    }

    pub fn gas_valid(&self) -> bool {
        self.status & registers::GAS_VALID != 0
    }

    pub fn heater_stable(&self) -> bool {
        self.status & registers::HEAT_STABLE != 0
    }

    pub fn fahrenheit(&self) -> f32 {
        self.temperature * 9.0 / 5.0 + 32.0
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:.2}°C, {:.1} Pa, {:.2}%RH, {:.0} Ω",
            self.temperature, self.pressure, self.humidity, self.gas_resistance
        )
    }
}

/// Orders fields oldest first. `meas_index` wraps, so the oldest field is
/// the one following the largest gap between neighbouring indices.
fn sort_by_meas_index(fields: &mut [Data]) {
    fields.sort_unstable_by_key(|d| d.meas_index);
    let len = fields.len();
    let mut oldest = 0;
    let mut widest = 0;
    for i in 0..len {
        let previous = fields[(i + len - 1) % len].meas_index;
        let gap = fields[i].meas_index.wrapping_sub(previous);
        if gap > widest {
            widest = gap;
            oldest = i;
        }
    }
    fields.rotate_left(oldest);
}

/// Checks six alternating hot/cool measurements: plausible ambient values,
/// valid gas readings and a hot/cool resistance ratio showing the heater works.
fn self_test_passed(data: &[Data; registers::SELF_TEST_MEASUREMENTS]) -> bool {
    let first = &data[0];
    let mut failures = 0;
    if !(0.0..=60.0).contains(&first.temperature) {
        failures += 1;
    }
    if !(90000.0..=110000.0).contains(&first.pressure) {
        failures += 1;
    }
    if !(20.0..=80.0).contains(&first.humidity) {
        failures += 1;
    }
    failures += data.iter().filter(|d| !d.gas_valid()).count();

    let ratio =
        (5.0 * (data[3].gas_resistance + data[5].gas_resistance)) / (2.0 * data[4].gas_resistance);
    if (ratio as u32) < 6 {
        failures += 1;
    }
    if failures > 0 {
        debug!("self test failed {} checks", failures);
    }
    failures == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub start_periodic: bool,
    /// Used for the heater resistance, °C.
    pub ambient_temperature: i8,
    pub mode: Mode,
    pub oversampling_temperature: Oversampling,
    pub oversampling_pressure: Oversampling,
    pub oversampling_humidity: Oversampling,
    pub filter: Filter,
    pub odr: Odr,
    pub heater_enable: bool,
    /// °C
    pub heater_temperature: u16,
    /// ms
    pub heater_duration: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_periodic: true,
            ambient_temperature: 25,
            mode: Mode::Forced,
            oversampling_temperature: Oversampling::X2,
            oversampling_pressure: Oversampling::X1,
            oversampling_humidity: Oversampling::X16,
            filter: Filter::None,
            odr: Odr::None,
            heater_enable: true,
            heater_temperature: 300,
            heater_duration: 100,
        }
    }
}

impl Config {
    fn tph_setting(&self) -> TphSetting {
        TphSetting {
            oversampling_temperature: self.oversampling_temperature,
            oversampling_pressure: self.oversampling_pressure,
            oversampling_humidity: self.oversampling_humidity,
            filter: self.filter,
            odr: self.odr,
        }
    }

    fn heater_conf(&self) -> HeaterConf {
        HeaterConf {
            enable: self.heater_enable,
            ..HeaterConf::forced(self.heater_temperature, self.heater_duration)
        }
    }
}

pub struct Bme688<I2C, D, const N: usize = 1> {
    regs: Registers<I2C, D>,
    config: Config,
    periodic: Periodic<Data, N>,
    calibration: Calibration,
    variant: u8,
    mode: Mode,
    tph: TphSetting,
    heater: HeaterConf,
    heater_mode: Mode,
    waiting: bool,
    can_measure_at: Option<u64>,
}

impl<I2C, D, const N: usize> Bme688<I2C, D, N> {
    pub fn new(i2c: I2C, delay: D, config: Config) -> Self {
        Self::with_address(i2c, delay, config, ADDR)
    }

    /// SDO low selects 0x76.
    pub fn with_address(i2c: I2C, delay: D, config: Config, address: u8) -> Self {
        Self {
            regs: Registers::new(i2c, delay, address),
            config,
            periodic: Periodic::new(),
            calibration: Calibration::default(),
            variant: registers::VARIANT_GAS_HIGH,
            mode: Mode::Sleep,
            tph: config.tph_setting(),
            heater: config.heater_conf(),
            heater_mode: config.mode,
            waiting: false,
            can_measure_at: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Calibration read by `begin`.
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn variant(&self) -> u8 {
        self.variant
    }

    pub fn gas_high(&self) -> bool {
        self.variant == registers::VARIANT_GAS_HIGH
    }

    /// Mode last written to the device.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Last written TPH setting.
    pub fn tph_setting(&self) -> &TphSetting {
        &self.tph
    }

    /// Last written heater configuration.
    pub fn heater_conf(&self) -> &HeaterConf {
        &self.heater
    }

    /// The first measurement after start is still pending.
    pub fn waiting(&self) -> bool {
        self.waiting
    }

    pub fn release(self) -> (I2C, D) {
        self.regs.release()
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Bme688<I2C, D, N> {
    fn ensure_idle(&self) -> Result<(), Error<I2C::Error>> {
        if self.periodic.in_periodic() {
            debug!("periodic measurement is running");
            return Err(Error::PeriodicRunning);
        }
        Ok(())
    }

    /// Resets the device. Registers return to their defaults, so the cached
    /// TPH setting is reloaded.
    pub fn soft_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.regs
            .write_u8(registers::SOFT_RESET, registers::RESET_VALUE)?;
        self.regs.delay_ms(registers::RESET_DURATION);
        self.periodic.stop();
        self.waiting = false;
        self.mode = Mode::Sleep;
        self.tph = self.read_tph_setting()?;
        Ok(())
    }

    pub fn read_variant(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.regs.read_u8(registers::VARIANT_ID)
    }

    /// Bytes are combined in the order 2-3-1-0.
    pub fn read_unique_id(&mut self) -> Result<u32, Error<I2C::Error>> {
        let mut buf = [0u8; 4];
        self.regs.read(registers::UNIQUE_ID, &mut buf)?;
        let high = ((buf[3] as u32) | (buf[2] as u32) << 8) & 0x7fff;
        Ok(high << 16 | (buf[1] as u32) << 8 | buf[0] as u32)
    }

    pub fn read_calibration(&mut self) -> Result<Calibration, Error<I2C::Error>> {
        let mut c0 = [0u8; registers::COEFF0_LEN];
        let mut c1 = [0u8; registers::COEFF1_LEN];
        let mut c2 = [0u8; registers::COEFF2_LEN];
        self.regs.read(registers::COEFF0, &mut c0)?;
        self.regs.read(registers::COEFF1, &mut c1)?;
        self.regs.read(registers::COEFF2, &mut c2)?;
        Ok(Calibration::from_blocks(&c0, &c1, &c2))
    }

    /// ctrl_gas_1, ctrl_hum, 0x73, ctrl_meas, config
    fn read_control(&mut self) -> Result<[u8; 5], Error<I2C::Error>> {
        let mut buf = [0u8; 5];
        self.regs.read(registers::CTRL_GAS1, &mut buf)?;
        Ok(buf)
    }

    fn read_ctrl_meas(&mut self) -> Result<CtrlMeas, Error<I2C::Error>> {
        Ok(CtrlMeas(self.regs.read_u8(registers::CTRL_MEAS)?))
    }

    fn read_config(&mut self) -> Result<ConfigReg, Error<I2C::Error>> {
        Ok(ConfigReg(self.regs.read_u8(registers::CONFIG)?))
    }

    pub fn read_tph_setting(&mut self) -> Result<TphSetting, Error<I2C::Error>> {
        let [gas1, hum, _, meas, config] = self.read_control()?;
        let (meas, config) = (CtrlMeas(meas), ConfigReg(config));
        Ok(TphSetting {
            oversampling_temperature: meas.osrs_t(),
            oversampling_pressure: meas.osrs_p(),
            oversampling_humidity: Oversampling::from_bits(hum),
            filter: config.filter(),
            odr: Odr::from_bits(gas1 & registers::ODR3 != 0, config.odr()),
        })
    }

    /// Settings are written in sleep mode; the previous mode is restored.
    pub fn write_tph_setting(&mut self, setting: &TphSetting) -> Result<(), Error<I2C::Error>> {
        let mode = self.read_mode()?;
        self.write_mode(Mode::Sleep)?;

        let [gas1, hum, _, meas, config] = self.read_control()?;
        let (odr3, odr20) = setting.odr.bits();
        let meas = CtrlMeas(meas)
            .with_osrs_t(setting.oversampling_temperature)
            .with_osrs_p(setting.oversampling_pressure)
            .sleeping();
        let config = ConfigReg(config)
            .with_filter(setting.filter)
            .with_odr(odr20);
        self.regs.write_pairs(&[
            (registers::CTRL_GAS1, (gas1 & !registers::ODR3) | odr3),
            (registers::CTRL_HUM, (hum & !0x07) | setting.oversampling_humidity as u8),
            (registers::CTRL_MEAS, meas.0),
            (registers::CONFIG, config.0),
        ])?;
        self.tph = *setting;

        if mode != Mode::Sleep {
            self.write_mode(mode)?;
        }
        Ok(())
    }

    pub fn read_oversampling_temperature(&mut self) -> Result<Oversampling, Error<I2C::Error>> {
        Ok(self.read_ctrl_meas()?.osrs_t())
    }

    pub fn read_oversampling_pressure(&mut self) -> Result<Oversampling, Error<I2C::Error>> {
        Ok(self.read_ctrl_meas()?.osrs_p())
    }

    pub fn read_oversampling_humidity(&mut self) -> Result<Oversampling, Error<I2C::Error>> {
        Ok(Oversampling::from_bits(
            self.regs.read_u8(registers::CTRL_HUM)?,
        ))
    }

    /// Writes all three channels. Humidity takes effect with the
    /// `ctrl_meas` write, which also puts the device to sleep.
    pub fn write_oversampling(
        &mut self,
        temperature: Oversampling,
        pressure: Oversampling,
        humidity: Oversampling,
    ) -> Result<(), Error<I2C::Error>> {
        self.regs
            .update_bits(registers::CTRL_HUM, 0x07, humidity as u8)?;
        let meas = self
            .read_ctrl_meas()?
            .with_osrs_t(temperature)
            .with_osrs_p(pressure)
            .sleeping();
        self.regs.write_u8(registers::CTRL_MEAS, meas.0)?;
        self.mode = Mode::Sleep;
        self.tph.oversampling_temperature = temperature;
        self.tph.oversampling_pressure = pressure;
        self.tph.oversampling_humidity = humidity;
        Ok(())
    }

    /// Puts the device to sleep.
    pub fn write_oversampling_temperature(
        &mut self,
        os: Oversampling,
    ) -> Result<(), Error<I2C::Error>> {
        let meas = self.read_ctrl_meas()?.with_osrs_t(os).sleeping();
        self.regs.write_u8(registers::CTRL_MEAS, meas.0)?;
        self.mode = Mode::Sleep;
        self.tph.oversampling_temperature = os;
        Ok(())
    }

    /// Puts the device to sleep.
    pub fn write_oversampling_pressure(&mut self, os: Oversampling) -> Result<(), Error<I2C::Error>> {
        let meas = self.read_ctrl_meas()?.with_osrs_p(os).sleeping();
        self.regs.write_u8(registers::CTRL_MEAS, meas.0)?;
        self.mode = Mode::Sleep;
        self.tph.oversampling_pressure = os;
        Ok(())
    }

    pub fn write_oversampling_humidity(&mut self, os: Oversampling) -> Result<(), Error<I2C::Error>> {
        self.regs.update_bits(registers::CTRL_HUM, 0x07, os as u8)?;
        self.tph.oversampling_humidity = os;
        Ok(())
    }

    pub fn read_filter(&mut self) -> Result<Filter, Error<I2C::Error>> {
        Ok(self.read_config()?.filter())
    }

    pub fn write_filter(&mut self, filter: Filter) -> Result<(), Error<I2C::Error>> {
        let config = self.read_config()?.with_filter(filter);
        self.regs.write_u8(registers::CONFIG, config.0)?;
        self.tph.filter = filter;
        Ok(())
    }

    pub fn read_odr(&mut self) -> Result<Odr, Error<I2C::Error>> {
        let gas1 = self.regs.read_u8(registers::CTRL_GAS1)?;
        let config = self.read_config()?;
        Ok(Odr::from_bits(gas1 & registers::ODR3 != 0, config.odr()))
    }

    pub fn write_odr(&mut self, odr: Odr) -> Result<(), Error<I2C::Error>> {
        let (odr3, odr20) = odr.bits();
        self.regs
            .update_bits(registers::CTRL_GAS1, registers::ODR3, odr3)?;
        let config = self.read_config()?.with_odr(odr20);
        self.regs.write_u8(registers::CONFIG, config.0)?;
        self.tph.odr = odr;
        Ok(())
    }

    pub fn read_heater_setting(&mut self) -> Result<HeaterRegisters, Error<I2C::Error>> {
        // idac, res_heat and gas_wait blocks followed by gas_wait_shared
        let mut block = [0u8; HEATER_BLOCK_LEN + 1];
        self.regs.read(registers::IDAC_HEAT0, &mut block)?;
        let mut ctrl = [0u8; 2];
        self.regs.read(registers::CTRL_GAS0, &mut ctrl)?;

        let mut setting = HeaterRegisters {
            enable: ctrl[0] & registers::HEATER_OFF == 0
                && ctrl[1] & registers::RUN_GAS != 0,
            profile_len: ctrl[1] & registers::NB_CONV,
            shared_wait: GasWait(block[HEATER_BLOCK_LEN]),
            ..Default::default()
        };
        setting
            .res_heat
            .copy_from_slice(&block[MAX_PROFILES..2 * MAX_PROFILES]);
        for (wait, raw) in setting
            .gas_wait
            .iter_mut()
            .zip(&block[2 * MAX_PROFILES..HEATER_BLOCK_LEN])
        {
            *wait = GasWait(*raw);
        }
        Ok(setting)
    }

    /// Programs the heater for `mode`. Leaves the device in sleep mode.
    pub fn write_heater_setting(
        &mut self,
        mode: Mode,
        conf: &HeaterConf,
    ) -> Result<(), Error<I2C::Error>> {
        let len = conf.profile_len as usize;
        if mode == Mode::Sleep || len > MAX_PROFILES {
            warn!("invalid heater setting, profiles {}", conf.profile_len);
            return Err(Error::InvalidArgument);
        }
        self.write_mode(Mode::Sleep)?;

        let ambient = self.config.ambient_temperature;
        let nb_conv = match mode {
            Mode::Parallel | Mode::Sequential => {
                if mode == Mode::Parallel {
                    let shared = GasWait::from_shared_duration(conf.shared_duration);
                    self.regs.write_u8(registers::GAS_WAIT_SHARED, shared.0)?;
                }
                for i in 0..len {
                    let res_heat = self
                        .calibration
                        .heater_resistance(conf.temperature_profile[i], ambient);
                    let duration = conf.duration_profile[i];
                    let wait = if mode == Mode::Parallel {
                        u8::try_from(duration).unwrap_or(u8::MAX)
                    } else {
                        GasWait::from_duration(duration).0
                    };
                    let offset = i as u8;
                    self.regs.write_pairs(&[
                        (registers::RES_HEAT0 + offset, res_heat),
                        (registers::GAS_WAIT0 + offset, wait),
                    ])?;
                }
                conf.profile_len
            }
            _ => {
                let res_heat = self
                    .calibration
                    .heater_resistance(conf.temperature, ambient);
                self.regs.write_pairs(&[
                    (registers::RES_HEAT0, res_heat),
                    (registers::GAS_WAIT0, GasWait::from_duration(conf.duration).0),
                ])?;
                0
            }
        };

        let (heater_off, run_gas) = if !conf.enable {
            (registers::HEATER_OFF, 0)
        } else if self.gas_high() {
            (0, registers::RUN_GAS_HIGH)
        } else {
            (0, registers::RUN_GAS_LOW)
        };
        let mut ctrl = [0u8; 2];
        self.regs.read(registers::CTRL_GAS0, &mut ctrl)?;
        self.regs.write_pairs(&[
            (
                registers::CTRL_GAS0,
                (ctrl[0] & !registers::HEATER_OFF) | heater_off,
            ),
            (
                registers::CTRL_GAS1,
                (ctrl[1] & !(registers::NB_CONV | registers::RUN_GAS))
                    | (nb_conv & registers::NB_CONV)
                    | run_gas << 4,
            ),
        ])?;
        self.heater = *conf;
        self.heater_mode = mode;
        Ok(())
    }

    pub fn read_mode(&mut self) -> Result<Mode, Error<I2C::Error>> {
        Ok(Mode::from_bits(self.regs.read_u8(registers::CTRL_MEAS)?))
    }

    /// A running conversion is stopped first; the device is written back to
    /// sleep until it reports sleep mode.
    pub fn write_mode(&mut self, mode: Mode) -> Result<(), Error<I2C::Error>> {
        for _ in 0..=registers::MODE_CHANGE_RETRIES {
            let ctrl = self.read_ctrl_meas()?;
            if Mode::from_bits(ctrl.0) == Mode::Sleep {
                if mode != Mode::Sleep {
                    self.regs
                        .write_u8(registers::CTRL_MEAS, ctrl.sleeping().0 | mode as u8)?;
                }
                self.mode = mode;
                return Ok(());
            }
            self.regs
                .write_u8(registers::CTRL_MEAS, ctrl.sleeping().0)?;
            self.regs.delay_ms(registers::POLL_PERIOD);
        }
        warn!("device did not enter sleep mode");
        Err(Error::Timeout)
    }

    /// Fields with new data, oldest first. Forced mode only uses the first
    /// field.
    fn read_measurement(&mut self, mode: Mode) -> Result<Vec<Data, FIELD_COUNT>, Error<I2C::Error>> {
        let count = if mode == Mode::Forced { 1 } else { FIELD_COUNT };
        let mut raw = [0u8; FIELD_LEN * FIELD_COUNT];
        let raw = &mut raw[..FIELD_LEN * count];
        self.regs.read(registers::FIELD0, raw)?;
        let mut heater = [0u8; HEATER_BLOCK_LEN];
        self.regs.read(registers::IDAC_HEAT0, &mut heater)?;

        let gas_high = self.gas_high();
        let mut fields: Vec<Data, FIELD_COUNT> = raw
            .chunks_exact(FIELD_LEN)
            .map(|field| Data::parse(field, &heater, &self.calibration, gas_high))
            .filter(|data| data.new_data())
            .collect();
        sort_by_meas_index(&mut fields);
        Ok(fields)
    }

    /// One forced measurement with the current TPH and heater settings.
    pub fn measure_single_shot(&mut self) -> Result<Data, Error<I2C::Error>> {
        self.ensure_idle()?;
        self.write_mode(Mode::Sleep)?;
        self.write_mode(Mode::Forced)?;

        let interval_us =
            self.tph.measurement_duration(Mode::Forced) + self.heater.duration as u32 * 1000;
        self.regs
            .delay_ms(interval_us.div_ceil(1000) + registers::SINGLE_SHOT_MARGIN);

        for _ in 0..=registers::SINGLE_SHOT_RETRIES {
            if let Some(data) = self.read_measurement(Mode::Forced)?.first() {
                return Ok(*data);
            }
            self.regs.delay_ms(1);
        }
        warn!("forced measurement timed out");
        Err(Error::Timeout)
    }

    /// Enters `mode` and derives the polling interval from the measurement
    /// duration and the heater setting. The first measurement is only read
    /// one interval after the first update.
    pub fn start_periodic_measurement(&mut self, mode: Mode) -> Result<(), Error<I2C::Error>> {
        self.ensure_idle()?;
        let heater = &self.heater;
        let heating_us = match mode {
            Mode::Forced => heater.duration as u32 * 1000,
            Mode::Parallel => {
                let len = (heater.profile_len as usize).min(MAX_PROFILES);
                heater.duration_profile[..len]
                    .iter()
                    .map(|d| *d as u32 * 1000)
                    .sum::<u32>()
                    + heater.shared_duration as u32 * 1000
            }
            Mode::Sequential => heater.duration_profile[0] as u32 * 1000,
            Mode::Sleep => {
                warn!("periodic measurement needs a measuring mode");
                return Err(Error::InvalidArgument);
            }
        };

        self.write_mode(mode)?;
        let interval_us = self.tph.measurement_duration(mode) + heating_us;
        self.periodic.start(interval_us.div_ceil(1000));
        self.waiting = true;
        self.can_measure_at = None;
        debug!("periodic mode {} every {} ms", mode as u8, self.periodic.interval());
        Ok(())
    }

    pub fn stop_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.write_mode(Mode::Sleep)?;
        self.periodic.stop();
        self.waiting = false;
        Ok(())
    }

    /// Runs the gas sensor self test. It takes about 13 s and overwrites
    /// the settings, which are written back afterwards.
    pub fn self_test(&mut self) -> Result<bool, Error<I2C::Error>> {
        self.ensure_idle()?;
        let (tph, heater, heater_mode) = (self.tph, self.heater, self.heater_mode);
        let passed = self.run_self_test()?;
        self.write_tph_setting(&tph)?;
        self.write_heater_setting(heater_mode, &heater)?;
        Ok(passed)
    }

    fn run_self_test(&mut self) -> Result<bool, Error<I2C::Error>> {
        self.write_tph_setting(&TphSetting {
            oversampling_temperature: Oversampling::X2,
            oversampling_pressure: Oversampling::X16,
            oversampling_humidity: Oversampling::X1,
            filter: Filter::None,
            odr: Odr::None,
        })?;

        let mut heater = HeaterConf::forced(
            registers::SELF_TEST_HIGH_TEMP,
            registers::SELF_TEST_FIRST_DURATION,
        );
        let Some(first) = self.self_test_measurement(&heater)? else {
            return Ok(false);
        };
        if first.idac == 0x00 || first.idac == 0xff || !first.gas_valid() {
            warn!("heater current {=u8:#x} is not plausible", first.idac);
            return Ok(false);
        }

        heater.duration = registers::SELF_TEST_DURATION;
        let mut data = [Data::default(); registers::SELF_TEST_MEASUREMENTS];
        for (i, slot) in data.iter_mut().enumerate() {
            heater.temperature = if i % 2 == 0 {
                registers::SELF_TEST_HIGH_TEMP
            } else {
                registers::SELF_TEST_LOW_TEMP
            };
            let Some(measured) = self.self_test_measurement(&heater)? else {
                return Ok(false);
            };
            *slot = measured;
        }
        Ok(self_test_passed(&data))
    }

    fn self_test_measurement(&mut self, heater: &HeaterConf) -> Result<Option<Data>, Error<I2C::Error>> {
        self.write_heater_setting(Mode::Forced, heater)?;
        self.write_mode(Mode::Forced)?;
        self.regs.delay_ms(heater.duration as u32);
        Ok(self.read_measurement(Mode::Forced)?.first().copied())
    }
}

impl<I2C: I2c, D: DelayNs, const N: usize> Component for Bme688<I2C, D, N> {
    type Error = Error<I2C::Error>;

    const NAME: &'static str = "UnitBME688";
    const DEFAULT_ADDRESS: u8 = ADDR;

    fn address(&self) -> u8 {
        self.regs.address()
    }

    fn begin(&mut self) -> Result<(), Self::Error> {
        self.soft_reset()?;
        let id = self.regs.read_u8(registers::CHIP_ID)?;
        if id != registers::CHIP_IDENTIFIER {
            error!("not a BME68x, chip id {=u8:#x}", id);
            return Err(Error::UnsupportedDevice);
        }
        self.variant = self.read_variant()?;
        self.calibration = self.read_calibration()?;
        trace!(
            "variant {} calibration T {} {} {}",
            self.variant,
            self.calibration.par_t1,
            self.calibration.par_t2,
            self.calibration.par_t3,
        );

        let config = self.config;
        self.write_tph_setting(&config.tph_setting())?;
        self.write_heater_setting(config.mode, &config.heater_conf())?;
        if config.start_periodic {
            self.start_periodic_measurement(config.mode)?;
        }
        Ok(())
    }

    fn update(&mut self, now_ms: u64, force: bool) -> Result<bool, Self::Error> {
        self.periodic.begin_update();
        if self.waiting {
            let interval = self.periodic.interval() as u64;
            let can_measure_at = *self
                .can_measure_at
                .get_or_insert(now_ms.saturating_add(interval));
            self.waiting = now_ms < can_measure_at;
            return Ok(false);
        }
        if !self.periodic.due(now_ms, force) {
            return Ok(false);
        }

        let fields = self.read_measurement(self.mode)?;
        if fields.is_empty() {
            return Ok(false);
        }
        if self.mode == Mode::Forced {
            // The device sleeps after each forced conversion
            if let Err(err) = self.write_mode(Mode::Forced) {
                error!("failed to trigger the next forced measurement");
                self.mode = Mode::Sleep;
                self.periodic.stop();
                return Err(err);
            }
        }
        for data in fields {
            self.periodic.store(now_ms, data);
        }
        Ok(true)
    }
}

impl<I2C, D, const N: usize> PeriodicMeasurement<N> for Bme688<I2C, D, N> {
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

    const CALIBRATION: Calibration = Calibration {
        par_t1: 26231,
        par_t2: 26377,
        par_t3: 3,
        par_p1: 36340,
        par_p2: -10300,
        par_p3: 88,
        par_p4: 6500,
        par_p5: -95,
        par_p6: 30,
        par_p7: 30,
        par_p8: -300,
        par_p9: -2300,
        par_p10: 30,
        par_h1: 750,
        par_h2: 1000,
        par_h3: 0,
        par_h4: 45,
        par_h5: 20,
        par_h6: 120,
        par_h7: -100,
        par_gh1: -50,
        par_gh2: -10000,
        par_gh3: 18,
        res_heat_range: 1,
        res_heat_val: 40,
        range_sw_err: 0,
    };

    // adc pressure 350000, temperature 500000, humidity 22000, gas 600 range 5,
    // new data with a valid gas reading and a stable heater
    const FIELD: [u8; FIELD_LEN] = [
        0x80, 0x00, 0x55, 0x73, 0x00, 0x7a, 0x12, 0x00, 0x55, 0xf0, 0, 0, 0, 0x96, 0x35, 0x96,
        0x35,
    ];

    fn calibration_blocks() -> ([u8; 23], [u8; 14], [u8; 5]) {
        let c = CALIBRATION;
        let mut c0 = [0u8; 23];
        c0[0..2].copy_from_slice(&c.par_t2.to_le_bytes());
        c0[2] = c.par_t3 as u8;
        c0[4..6].copy_from_slice(&c.par_p1.to_le_bytes());
        c0[6..8].copy_from_slice(&c.par_p2.to_le_bytes());
        c0[8] = c.par_p3 as u8;
        c0[10..12].copy_from_slice(&c.par_p4.to_le_bytes());
        c0[12..14].copy_from_slice(&c.par_p5.to_le_bytes());
        c0[14] = c.par_p7 as u8;
        c0[15] = c.par_p6 as u8;
        c0[18..20].copy_from_slice(&c.par_p8.to_le_bytes());
        c0[20..22].copy_from_slice(&c.par_p9.to_le_bytes());
        c0[22] = c.par_p10;

        let mut c1 = [0u8; 14];
        c1[0] = (c.par_h2 >> 4) as u8;
        c1[1] = ((c.par_h2 & 0x0f) << 4) as u8 | (c.par_h1 & 0x0f) as u8;
        c1[2] = (c.par_h1 >> 4) as u8;
        c1[3] = c.par_h3 as u8;
        c1[4] = c.par_h4 as u8;
        c1[5] = c.par_h5 as u8;
        c1[6] = c.par_h6;
        c1[7] = c.par_h7 as u8;
        c1[8..10].copy_from_slice(&c.par_t1.to_le_bytes());
        c1[10..12].copy_from_slice(&c.par_gh2.to_le_bytes());
        c1[12] = c.par_gh1 as u8;
        c1[13] = c.par_gh3 as u8;

        let c2 = [
            c.res_heat_val as u8,
            0,
            c.res_heat_range << 4,
            0,
            (c.range_sw_err << 4) as u8,
        ];
        (c0, c1, c2)
    }

    // Forced conversions finish immediately.
    fn forced_returns_to_sleep(regs: &mut [u8; 256], reg: u8, value: u8) {
        if reg == registers::CTRL_MEAS && value & 0x03 == Mode::Forced as u8 {
            regs[registers::CTRL_MEAS as usize] = value & !0x03;
        }
    }

    fn device() -> RegisterBus {
        let mut bus = RegisterBus::new(ADDR).with_hook(forced_returns_to_sleep);
        let (c0, c1, c2) = calibration_blocks();
        bus.set(registers::COEFF0, &c0);
        bus.set(registers::COEFF1, &c1);
        bus.set(registers::COEFF2, &c2);
        bus.set(registers::CHIP_ID, &[registers::CHIP_IDENTIFIER]);
        bus.set(registers::VARIANT_ID, &[registers::VARIANT_GAS_HIGH]);
        bus.set(registers::FIELD0, &FIELD);
        bus.set(registers::IDAC_HEAT0, &[0x30]);
        bus
    }

    fn bme688(bus: RegisterBus, config: Config) -> Bme688<RegisterBus, NoDelay, 4> {
        Bme688::new(bus, NoDelay::default(), config)
    }

    fn idle() -> Config {
        Config {
            start_periodic: false,
            ..Default::default()
        }
    }

    fn heater_block() -> [u8; HEATER_BLOCK_LEN] {
        let mut heater = [0u8; HEATER_BLOCK_LEN];
        heater[0] = 0x30;
        heater[MAX_PROFILES] = 107;
        heater[2 * MAX_PROFILES] = 0x59;
        heater
    }

    #[test]
    fn test_calibration_from_blocks() {
        let (c0, c1, c2) = calibration_blocks();
        assert_eq!(Calibration::from_blocks(&c0, &c1, &c2), CALIBRATION);
    }

    #[test]
    fn test_compensation() {
        let data = Data::parse(&FIELD, &heater_block(), &CALIBRATION, true);
        assert!(data.new_data());
        assert!(data.gas_valid());
        assert!(data.heater_stable());
        assert_eq!(data.gas_index, 0);
        assert_eq!((data.idac, data.res_heat, data.gas_wait), (0x30, 107, 0x59));
        assert!((data.temperature - 25.254).abs() < 0.001);
        assert!((data.pressure - 102694.2).abs() < 0.5);
        assert!((data.humidity - 51.674).abs() < 0.005);
        // 1e6 * (262144 >> 5) / ((600 - 512) * 3 + 4096)
        assert!((data.gas_resistance - 1878899.1).abs() < 1.0);
    }

    #[test]
    fn test_gas_resistance_low_variant() {
        let data = Data::parse(&FIELD, &heater_block(), &CALIBRATION, false);
        assert!((data.gas_resistance - 232818.2).abs() < 1.0);
        assert!(data.gas_valid());
    }

    #[test]
    fn test_humidity_is_clamped() {
        assert_eq!(CALIBRATION.compensate_humidity(0, 129301.375), 0.0);
        assert_eq!(CALIBRATION.compensate_humidity(65535, 129301.375), 100.0);
    }

    #[test]
    fn test_heater_resistance() {
        assert_eq!(CALIBRATION.heater_resistance(300, 25), 107);
        assert_eq!(CALIBRATION.heater_resistance(350, 25), 120);
        assert_eq!(CALIBRATION.heater_resistance(150, 25), 69);
        assert_eq!(
            CALIBRATION.heater_resistance(500, 25),
            CALIBRATION.heater_resistance(400, 25)
        );
    }

    #[test]
    fn test_gas_wait() {
        let wait = GasWait::from_duration(100);
        assert_eq!(wait, GasWait(0x59));
        assert_eq!(wait.factor(), GasWaitFactor::X4);
        assert_eq!(wait.duration(), 100);

        let wait = GasWait::from_duration(1000);
        assert_eq!(wait, GasWait(0xbe));
        assert_eq!(wait.step(), 62);
        assert_eq!(wait.duration(), 992);

        assert_eq!(GasWait::from_duration(63), GasWait(0x3f));
        assert_eq!(GasWait::from_duration(5000), GasWait::MAX);
        assert_eq!(GasWait::MAX.duration(), 4032);
        // 140 ms is 293 steps of 477 µs, 18 × 16
        assert_eq!(GasWait::from_shared_duration(140), GasWait(0x92));
        assert_eq!(GasWait::from_shared_duration(2000), GasWait::MAX);
    }

    #[test]
    fn test_measurement_duration() {
        let tph = TphSetting::default();
        assert_eq!(tph.measurement_duration(Mode::Forced), 42590);
        assert_eq!(tph.measurement_duration(Mode::Parallel), 41590);
    }

    #[test]
    fn test_begin_starts_forced_mode() {
        let mut sensor = bme688(device(), Config::default());
        sensor.begin().unwrap();
        assert_eq!(sensor.calibration(), &CALIBRATION);
        assert!(sensor.gas_high());
        assert!(sensor.in_periodic());
        assert!(sensor.waiting());
        // 42590 µs conversion plus 100 ms heating
        assert_eq!(sensor.interval(), 143);

        let (bus, _) = sensor.release();
        assert_eq!(bus.written_to(registers::SOFT_RESET), [0xb6]);
        assert_eq!(bus.written_to(registers::CTRL_HUM), [0x05]);
        assert_eq!(bus.written_to(registers::CONFIG), [0x00]);
        // odr none, then one gas conversion with run_gas high
        assert_eq!(bus.written_to(registers::CTRL_GAS1), [0x80, 0xa0]);
        assert_eq!(bus.written_to(registers::CTRL_GAS0), [0x00]);
        assert_eq!(bus.written_to(registers::RES_HEAT0), [107]);
        assert_eq!(bus.written_to(registers::GAS_WAIT0), [0x59]);
        // osrs_t x2, osrs_p x1, then forced
        assert_eq!(bus.written_to(registers::CTRL_MEAS), [0x44, 0x45]);
    }

    #[test]
    fn test_begin_rejects_other_chip() {
        let mut bus = device();
        bus.set(registers::CHIP_ID, &[0x60]);
        let mut sensor = bme688(bus, Config::default());
        assert_eq!(sensor.begin(), Err(Error::UnsupportedDevice));
    }

    #[test]
    fn test_update_waits_one_interval() {
        let mut sensor = bme688(device(), Config::default());
        sensor.begin().unwrap();

        assert_eq!(sensor.update(1000, false), Ok(false));
        assert_eq!(sensor.update(1142, true), Ok(false));
        assert!(sensor.waiting());
        assert_eq!(sensor.update(1143, false), Ok(false));
        assert!(!sensor.waiting());

        assert_eq!(sensor.update(1143, false), Ok(true));
        assert_eq!(sensor.update(1200, false), Ok(false));
        assert_eq!(sensor.update(1286, false), Ok(true));
        assert_eq!(sensor.available(), 2);
        assert!((sensor.latest().unwrap().temperature - 25.254).abs() < 0.001);

        let (bus, _) = sensor.release();
        // started once, then triggered again after each read
        assert_eq!(bus.written_to(registers::CTRL_MEAS), [0x44, 0x45, 0x45, 0x45]);
    }

    #[test]
    fn test_waiting_near_clock_limit() {
        let mut sensor = bme688(device(), Config::default());
        sensor.begin().unwrap();
        assert_eq!(sensor.update(u64::MAX - 1, false), Ok(false));
        assert!(sensor.waiting());
        assert_eq!(sensor.update(u64::MAX, false), Ok(false));
        assert!(!sensor.waiting());
    }

    #[test]
    fn test_update_without_new_data() {
        let mut bus = device();
        bus.set(registers::FIELD0, &[0x00]);
        let mut sensor = bme688(bus, Config::default());
        sensor.begin().unwrap();
        sensor.update(0, false).unwrap();
        sensor.update(143, false).unwrap();
        assert_eq!(sensor.update(143, false), Ok(false));
        assert!(sensor.empty());
    }

    #[test]
    fn test_parallel_fields_sorted() {
        let mut bus = device();
        let mut field = FIELD;
        for (i, meas_index) in [(0u8, 0u8), (1, 254), (2, 255)] {
            field[0] = 0x80 | i;
            field[1] = meas_index;
            bus.set(registers::FIELD0 + i * FIELD_LEN as u8, &field);
        }
        let mut sensor = bme688(bus, idle());
        sensor.begin().unwrap();

        let fields = sensor.read_measurement(Mode::Parallel).unwrap();
        let order: std::vec::Vec<_> = fields.iter().map(|d| (d.meas_index, d.gas_index)).collect();
        assert_eq!(order, [(254, 1), (255, 2), (0, 0)]);

        let (mut bus, _) = sensor.release();
        bus.set(registers::FIELD0 + FIELD_LEN as u8, &[0x01]);
        let mut sensor = bme688(bus, idle());
        assert_eq!(sensor.read_measurement(Mode::Parallel).unwrap().len(), 2);
    }

    #[test]
    fn test_meas_index_order_is_total() {
        let field = |meas_index| Data {
            meas_index,
            ..Default::default()
        };
        let indices = |fields: &[Data]| -> std::vec::Vec<u8> {
            fields.iter().map(|d| d.meas_index).collect()
        };

        let mut fields = [field(7), field(5), field(6)];
        sort_by_meas_index(&mut fields);
        assert_eq!(indices(&fields), [5, 6, 7]);

        let mut fields = [field(0), field(255), field(254)];
        sort_by_meas_index(&mut fields);
        assert_eq!(indices(&fields), [254, 255, 0]);

        // spread over more than half the range, result must not depend on slot order
        let mut a = [field(0), field(100), field(200)];
        let mut b = [field(200), field(0), field(100)];
        let mut c = [field(100), field(200), field(0)];
        sort_by_meas_index(&mut a);
        sort_by_meas_index(&mut b);
        sort_by_meas_index(&mut c);
        assert_eq!(indices(&a), [100, 200, 0]);
        assert_eq!(a, b);
        assert_eq!(a, c);

        let mut single = [field(42)];
        sort_by_meas_index(&mut single);
        assert_eq!(indices(&single), [42]);
    }

    #[test]
    fn test_single_shot() {
        let mut sensor = bme688(device(), idle());
        sensor.begin().unwrap();
        assert_eq!(sensor.read_mode(), Ok(Mode::Sleep));

        let data = sensor.measure_single_shot().unwrap();
        assert!((data.pressure - 102694.2).abs() < 0.5);
        let (_, delay) = sensor.release();
        // reset, then 143 ms plus margin
        assert_eq!(delay.elapsed_ms(), 10 + 153);
    }

    #[test]
    fn test_single_shot_times_out() {
        let mut bus = device();
        bus.set(registers::FIELD0, &[0x00]);
        let mut sensor = bme688(bus, idle());
        sensor.begin().unwrap();
        assert_eq!(sensor.measure_single_shot(), Err(Error::Timeout));
    }

    #[test]
    fn test_rejected_while_periodic() {
        let mut sensor = bme688(device(), Config::default());
        sensor.begin().unwrap();
        assert_eq!(sensor.measure_single_shot(), Err(Error::PeriodicRunning));
        assert_eq!(
            sensor.start_periodic_measurement(Mode::Forced),
            Err(Error::PeriodicRunning)
        );
        assert_eq!(sensor.self_test(), Err(Error::PeriodicRunning));

        sensor.stop_periodic_measurement().unwrap();
        assert!(!sensor.in_periodic());
        assert_eq!(sensor.read_mode(), Ok(Mode::Sleep));
        assert_eq!(
            sensor.start_periodic_measurement(Mode::Sleep),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn test_write_mode_stops_running_conversion() {
        let mut bus = RegisterBus::new(ADDR);
        bus.set(registers::CTRL_MEAS, &[0x47]);
        let mut sensor = bme688(bus, idle());
        assert_eq!(sensor.read_mode(), Ok(Mode::Sequential));
        sensor.write_mode(Mode::Parallel).unwrap();
        assert_eq!(sensor.mode(), Mode::Parallel);
        let (bus, delay) = sensor.release();
        assert_eq!(bus.written_to(registers::CTRL_MEAS), [0x44, 0x46]);
        assert_eq!(delay.elapsed_ms(), 10);
    }

    #[test]
    fn test_sequential_heater_profile() {
        let mut sensor = bme688(device(), idle());
        sensor.begin().unwrap();

        let mut conf = HeaterConf::default();
        conf.profile_len = 3;
        conf.temperature_profile[..3].copy_from_slice(&[150, 300, 350]);
        conf.duration_profile[..3].copy_from_slice(&[100, 1000, 63]);
        sensor.write_heater_setting(Mode::Sequential, &conf).unwrap();

        let setting = sensor.read_heater_setting().unwrap();
        assert!(setting.enable);
        assert_eq!(setting.profile_len, 3);
        assert_eq!(setting.res_heat[..3], [69, 107, 120]);
        assert_eq!(
            setting.gas_wait[..3],
            [GasWait(0x59), GasWait(0xbe), GasWait(0x3f)]
        );

        // 42590 µs conversion plus the first step
        sensor.start_periodic_measurement(Mode::Sequential).unwrap();
        assert_eq!(sensor.interval(), 143);
    }

    #[test]
    fn test_parallel_heater_profile() {
        let mut sensor = bme688(device(), idle());
        sensor.begin().unwrap();

        let mut conf = HeaterConf::default();
        conf.profile_len = 2;
        conf.temperature_profile[..2].copy_from_slice(&[300, 350]);
        conf.duration_profile[..2].copy_from_slice(&[5, 10]);
        conf.shared_duration = 140;
        sensor.write_heater_setting(Mode::Parallel, &conf).unwrap();

        let setting = sensor.read_heater_setting().unwrap();
        assert_eq!(setting.shared_wait, GasWait(0x92));
        assert_eq!(setting.gas_wait[..2], [GasWait(5), GasWait(10)]);

        // 41590 µs conversion, 15 ms of profiles and 140 ms shared
        sensor.start_periodic_measurement(Mode::Parallel).unwrap();
        assert_eq!(sensor.interval(), 197);
    }

    #[test]
    fn test_heater_disabled() {
        let config = Config {
            heater_enable: false,
            ..idle()
        };
        let mut sensor = bme688(device(), config);
        sensor.begin().unwrap();
        let setting = sensor.read_heater_setting().unwrap();
        assert!(!setting.enable);
        let (bus, _) = sensor.release();
        assert_eq!(bus.written_to(registers::CTRL_GAS0), [registers::HEATER_OFF]);
    }

    #[test]
    fn test_heater_setting_rejects_too_many_profiles() {
        let mut sensor = bme688(device(), idle());
        let conf = HeaterConf {
            profile_len: 11,
            ..Default::default()
        };
        assert_eq!(
            sensor.write_heater_setting(Mode::Sequential, &conf),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            sensor.write_heater_setting(Mode::Sleep, &HeaterConf::default()),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn test_tph_setting() {
        let mut sensor = bme688(device(), idle());
        sensor.begin().unwrap();
        assert_eq!(sensor.read_tph_setting(), Ok(TphSetting::default()));

        let setting = TphSetting {
            oversampling_temperature: Oversampling::X8,
            oversampling_pressure: Oversampling::X4,
            oversampling_humidity: Oversampling::None,
            filter: Filter::Coeff15,
            odr: Odr::Ms250,
        };
        sensor.write_tph_setting(&setting).unwrap();
        assert_eq!(sensor.read_tph_setting(), Ok(setting));
        assert_eq!(sensor.tph_setting(), &setting);

        sensor.write_odr(Odr::None).unwrap();
        assert_eq!(sensor.read_odr(), Ok(Odr::None));
        sensor.write_odr(Odr::Ms20).unwrap();
        assert_eq!(sensor.read_odr(), Ok(Odr::Ms20));
        sensor.write_filter(Filter::Coeff127).unwrap();
        assert_eq!(sensor.read_filter(), Ok(Filter::Coeff127));
        // odr bits are untouched by the filter
        assert_eq!(sensor.read_odr(), Ok(Odr::Ms20));
    }

    #[test]
    fn test_oversampling() {
        let mut sensor = bme688(device(), idle());
        sensor.begin().unwrap();
        sensor
            .write_oversampling(Oversampling::X1, Oversampling::X16, Oversampling::X4)
            .unwrap();
        assert_eq!(sensor.read_oversampling_temperature(), Ok(Oversampling::X1));
        assert_eq!(sensor.read_oversampling_pressure(), Ok(Oversampling::X16));
        assert_eq!(sensor.read_oversampling_humidity(), Ok(Oversampling::X4));

        sensor.write_mode(Mode::Sequential).unwrap();
        sensor.write_oversampling_pressure(Oversampling::None).unwrap();
        assert_eq!(sensor.read_mode(), Ok(Mode::Sleep));
        assert_eq!(sensor.read_oversampling_pressure(), Ok(Oversampling::None));
        sensor.write_oversampling_temperature(Oversampling::X8).unwrap();
        sensor.write_oversampling_humidity(Oversampling::X2).unwrap();
        assert_eq!(sensor.read_oversampling_temperature(), Ok(Oversampling::X8));
        assert_eq!(sensor.read_oversampling_humidity(), Ok(Oversampling::X2));
        // 6 and 7 read back as x16
        let (mut bus, delay) = sensor.release();
        bus.set(registers::CTRL_HUM, &[0x07]);
        let mut sensor: Bme688<_, _, 4> = Bme688::new(bus, delay, idle());
        assert_eq!(sensor.read_oversampling_humidity(), Ok(Oversampling::X16));
    }

    #[test]
    fn test_unique_id() {
        let mut bus = device();
        bus.set(registers::UNIQUE_ID, &[0x12, 0x34, 0xd6, 0x78]);
        let mut sensor = bme688(bus, idle());
        assert_eq!(sensor.read_unique_id(), Ok(0x5678_3412));
    }

    #[test]
    fn test_self_test_without_heater_current() {
        let mut bus = device();
        bus.set(registers::IDAC_HEAT0, &[0x00]);
        let mut sensor = bme688(bus, idle());
        sensor.begin().unwrap();
        assert_eq!(sensor.self_test(), Ok(false));
        // settings are restored
        assert_eq!(sensor.read_tph_setting(), Ok(TphSetting::default()));
        assert_eq!(sensor.heater_conf(), &HeaterConf::default());
        let setting = sensor.read_heater_setting().unwrap();
        assert_eq!(setting.res_heat[0], 107);
        assert_eq!(setting.gas_wait[0], GasWait(0x59));
    }

    #[test]
    fn test_self_test_runs_all_measurements() {
        let mut sensor = bme688(device(), idle());
        sensor.begin().unwrap();
        // constant resistance gives a ratio of 5
        assert_eq!(sensor.self_test(), Ok(false));
        let (_, delay) = sensor.release();
        assert_eq!(delay.elapsed_ms(), 10 + 1000 + 6 * 2000);
    }

    #[test]
    fn test_self_test_analysis() {
        let hot = Data {
            status: registers::NEW_DATA | registers::GAS_VALID,
            temperature: 24.0,
            pressure: 101000.0,
            humidity: 45.0,
            gas_resistance: 30000.0,
            ..Default::default()
        };
        let cool = Data {
            gas_resistance: 10000.0,
            ..hot
        };
        let data = [hot, cool, hot, cool, hot, cool];
        // 5 * (10k + 10k) / (2 * 30k) < 6
        assert!(!self_test_passed(&data));

        let data = [cool, hot, cool, hot, cool, hot];
        // 5 * (30k + 30k) / (2 * 10k) = 15
        assert!(self_test_passed(&data));

        let mut broken = data;
        broken[2].status = registers::NEW_DATA;
        assert!(!self_test_passed(&broken));
        broken = data;
        broken[0].humidity = 95.0;
        assert!(!self_test_passed(&broken));
    }
}
