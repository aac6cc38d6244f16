pub mod calculator;
pub mod scheduler;

pub use calculator::{next_run, run_instant_on};
pub use scheduler::{NewSchedule, OutreachScheduler};
