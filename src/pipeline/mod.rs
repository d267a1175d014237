pub mod parse;
pub mod process;
pub mod resample;
