/// First of three 17 byte field blocks, 0x1d / 0x2e / 0x3f.
pub const FIELD0: u8 = 0x1d;
pub const FIELD_LEN: usize = 17;
pub const FIELD_COUNT: usize = 3;

pub const IDAC_HEAT0: u8 = 0x50;
pub const RES_HEAT0: u8 = 0x5a;
pub const GAS_WAIT0: u8 = 0x64;
pub const GAS_WAIT_SHARED: u8 = 0x6e;
pub const CTRL_GAS0: u8 = 0x70;
pub const CTRL_GAS1: u8 = 0x71;
pub const CTRL_HUM: u8 = 0x72;
pub const CTRL_MEAS: u8 = 0x74;
pub const CONFIG: u8 = 0x75;
pub const UNIQUE_ID: u8 = 0x83;
pub const CHIP_ID: u8 = 0xd0;
pub const SOFT_RESET: u8 = 0xe0;
pub const VARIANT_ID: u8 = 0xf0;

pub const COEFF0: u8 = 0x8a;
pub const COEFF0_LEN: usize = 23;
pub const COEFF1: u8 = 0xe1;
pub const COEFF1_LEN: usize = 14;
pub const COEFF2: u8 = 0x00;
pub const COEFF2_LEN: usize = 5;

pub const CHIP_IDENTIFIER: u8 = 0x61;
pub const VARIANT_GAS_LOW: u8 = 0x00;
pub const VARIANT_GAS_HIGH: u8 = 0x01;
pub const RESET_VALUE: u8 = 0xb6;

// Field status
pub const NEW_DATA: u8 = 0x80;
pub const GAS_INDEX: u8 = 0x0f;
pub const GAS_VALID: u8 = 0x20;
pub const HEAT_STABLE: u8 = 0x10;

// ctrl_gas_0 / ctrl_gas_1
pub const HEATER_OFF: u8 = 0x08;
pub const NB_CONV: u8 = 0x0f;
pub const RUN_GAS: u8 = 0x30;
pub const RUN_GAS_LOW: u8 = 0x01;
pub const RUN_GAS_HIGH: u8 = 0x02;
/// odr bit 3, set means no standby between sequential cycles
pub const ODR3: u8 = 0x80;

pub const MAX_PROFILES: usize = 10;

// Milliseconds
pub const RESET_DURATION: u32 = 10;
pub const POLL_PERIOD: u32 = 10;
pub const MODE_CHANGE_RETRIES: u32 = 100;
pub const SINGLE_SHOT_MARGIN: u32 = 10;
pub const SINGLE_SHOT_RETRIES: u32 = 10;

// Self test
pub const SELF_TEST_HIGH_TEMP: u16 = 350;
pub const SELF_TEST_LOW_TEMP: u16 = 150;
pub const SELF_TEST_FIRST_DURATION: u16 = 1000;
pub const SELF_TEST_DURATION: u16 = 2000;
pub const SELF_TEST_MEASUREMENTS: usize = 6;
