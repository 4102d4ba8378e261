pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INPUT_ERROR: i32 = 2;
pub const CONNECTION_ERROR: i32 = 3;
/// Sources disagree on a chain-wide parameter such as the sample rate
pub const FATAL_INCONSISTENCY: i32 = 4;
