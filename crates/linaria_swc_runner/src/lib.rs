pub use runner::*;

mod runner;
pub mod test_utils;
