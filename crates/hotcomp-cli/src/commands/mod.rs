//! Command implementations

pub mod clean;
pub mod load;
pub mod watch;
