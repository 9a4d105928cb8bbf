pub mod watch;
pub mod control;
pub mod status;
pub mod progress;
