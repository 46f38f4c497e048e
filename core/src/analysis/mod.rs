pub mod calibration;
pub mod filter;
pub mod peaks;
pub mod ppg;
