pub mod diff_engine;

pub use diff_engine::{compute_diff, log_diff_result};
