pub const TRIMMING: u8 = 0x88;
pub const CHIP_ID: u8 = 0xd0;
pub const SOFT_RESET: u8 = 0xe0;
pub const STATUS: u8 = 0xf3;
pub const CTRL_MEAS: u8 = 0xf4;
pub const CONFIG: u8 = 0xf5;
/// press_msb..temp_xlsb, must be read in one burst.
pub const DATA: u8 = 0xf7;

pub const CHIP_IDENTIFIER: u8 = 0x58;
pub const RESET_VALUE: u8 = 0xb6;

pub const STATUS_IM_UPDATE: u8 = 0x01;
pub const STATUS_MEASURING: u8 = 0x08;

pub const TRIMMING_LEN: usize = 24;

// Milliseconds
pub const SOFT_RESET_TIMEOUT: u32 = 100;
pub const MODE_CHANGE_TIMEOUT: u32 = 1000;
pub const SINGLE_SHOT_TIMEOUT: u32 = 2000;
