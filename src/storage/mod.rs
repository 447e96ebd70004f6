//! Persistence of finished job artifacts.

pub mod outputs;

pub use outputs::{OutputError, OutputWriter, FINAL_A_FILE, FINAL_B_FILE, RESULT_FILE};
