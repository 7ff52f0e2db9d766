pub const CALIBRATION: u8 = 0xa0;
pub const CHIP_ID: u8 = 0xd1;
pub const RESET: u8 = 0xe0;
pub const IIR_FILTER: u8 = 0xf1;
pub const STATUS: u8 = 0xf3;
pub const CTRL_MEAS: u8 = 0xf4;
pub const IO_SETUP: u8 = 0xf5;
/// Pressure 0xf7..0xf9 then temperature 0xfa..0xfc, big endian.
pub const DATA: u8 = 0xf7;

pub const CHIP_IDENTIFIER: u8 = 0x5c;
pub const RESET_VALUE: u8 = 0xe6;

pub const STATUS_MEASURE: u8 = 0x08;
pub const STATUS_OTP_UPDATE: u8 = 0x01;

pub const CALIBRATION_LEN: usize = 25;

// Milliseconds
pub const RESET_DURATION: u32 = 10;
pub const MEASUREMENT_TIMEOUT: u32 = 1000;
