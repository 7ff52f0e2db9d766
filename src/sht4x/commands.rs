// SHT4x commands are a single byte.

// Indexed by [precision][heater]. With the heater the measurement itself is
// always high precision; the precision row selects the heater power.
pub static MEASURE: [[u8; 3]; 3] = [
    // High: 200 mW 1 s, 200 mW 0.1 s, no heater
    [0x39, 0x32, 0xfd],
    // Medium: 110 mW
    [0x2f, 0x24, 0xf6],
    // Low: 20 mW
    [0x1e, 0x15, 0xe0],
];

// Milliseconds until the result can be read, same layout as MEASURE
pub static MEASURE_DURATION: [[u32; 3]; 3] = [
    [1100, 110, 9],
    [1100, 110, 5],
    [1100, 110, 2],
];

pub const GET_SERIAL_NUMBER: u8 = 0x89;
pub const SOFT_RESET: u8 = 0x94;

pub const COMMAND_DURATION: u32 = 1;
