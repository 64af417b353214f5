pub mod retention;

pub use retention::{RetentionSweeper, SweepReport, SweepStatus};
