use crate::sensirion::Cmd;

// Single shot, clock stretching enabled / disabled
pub const SINGLE_SHOT_ENABLE_STRETCH_HIGH: Cmd = [0x2c, 0x06];
pub const SINGLE_SHOT_ENABLE_STRETCH_MEDIUM: Cmd = [0x2c, 0x0d];
pub const SINGLE_SHOT_ENABLE_STRETCH_LOW: Cmd = [0x2c, 0x10];
pub const SINGLE_SHOT_DISABLE_STRETCH_HIGH: Cmd = [0x24, 0x00];
pub const SINGLE_SHOT_DISABLE_STRETCH_MEDIUM: Cmd = [0x24, 0x0b];
pub const SINGLE_SHOT_DISABLE_STRETCH_LOW: Cmd = [0x24, 0x16];

// Periodic, indexed by [mps][repeatability]
pub static START_PERIODIC: [[Cmd; 3]; 5] = [
    [[0x20, 0x32], [0x20, 0x24], [0x20, 0x2f]],
    [[0x21, 0x30], [0x21, 0x26], [0x21, 0x2d]],
    [[0x22, 0x36], [0x22, 0x20], [0x22, 0x2b]],
    [[0x23, 0x34], [0x23, 0x22], [0x23, 0x29]],
    [[0x27, 0x37], [0x27, 0x21], [0x27, 0x2a]],
];

pub const STOP_PERIODIC_MEASUREMENT: Cmd = [0x30, 0x93];
pub const ACCELERATED_RESPONSE_TIME: Cmd = [0x2b, 0x32];
pub const READ_MEASUREMENT: Cmd = [0xe0, 0x00];

pub const SOFT_RESET: Cmd = [0x30, 0xa2];

pub const START_HEATER: Cmd = [0x30, 0x6d];
pub const STOP_HEATER: Cmd = [0x30, 0x66];

pub const READ_STATUS: Cmd = [0xf3, 0x2d];
pub const CLEAR_STATUS: Cmd = [0x30, 0x41];

pub const GET_SERIAL_NUMBER_ENABLE_STRETCH: Cmd = [0x37, 0x80];
pub const GET_SERIAL_NUMBER_DISABLE_STRETCH: Cmd = [0x36, 0x82];

// Minimal waiting time before the sensor accepts another command
pub const COMMAND_DURATION: u32 = 1;
pub const START_PERIODIC_DURATION: u32 = 16;
pub const SOFT_RESET_DURATION: u32 = 2;
pub const GENERAL_RESET_TIMEOUT: u32 = 10;
