use crate::sensirion::Cmd;

pub const IAQ_INIT: Cmd = [0x20, 0x03];
pub const MEASURE_IAQ: Cmd = [0x20, 0x08];
pub const GET_IAQ_BASELINE: Cmd = [0x20, 0x15];
pub const SET_IAQ_BASELINE: Cmd = [0x20, 0x1e];
pub const SET_ABSOLUTE_HUMIDITY: Cmd = [0x20, 0x61];
pub const MEASURE_TEST: Cmd = [0x20, 0x32];
pub const GET_FEATURE_SET: Cmd = [0x20, 0x2f];
pub const MEASURE_RAW: Cmd = [0x20, 0x50];
pub const GET_TVOC_INCEPTIVE_BASELINE: Cmd = [0x20, 0xb3];
pub const SET_TVOC_INCEPTIVE_BASELINE: Cmd = [0x20, 0x77];
pub const GET_SERIAL_ID: Cmd = [0x36, 0x82];

// Maximum execution times in milliseconds
pub const IAQ_INIT_DURATION: u32 = 10;
pub const MEASURE_IAQ_DURATION: u32 = 12;
pub const GET_IAQ_BASELINE_DURATION: u32 = 10;
pub const SET_IAQ_BASELINE_DURATION: u32 = 10;
pub const SET_ABSOLUTE_HUMIDITY_DURATION: u32 = 10;
pub const MEASURE_TEST_DURATION: u32 = 220;
pub const GET_FEATURE_SET_DURATION: u32 = 10;
pub const MEASURE_RAW_DURATION: u32 = 25;
pub const GET_TVOC_INCEPTIVE_BASELINE_DURATION: u32 = 10;
pub const SET_TVOC_INCEPTIVE_BASELINE_DURATION: u32 = 10;
pub const GET_SERIAL_ID_DURATION: u32 = 10;
pub const GENERAL_RESET_DURATION: u32 = 10;
