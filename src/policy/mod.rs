//! Socket tuning applied from the `setsockopt` interception point
//!
//! Both policies issue their extra options through the original
//! `setsockopt`, never through the intercepted one.

mod multipath;
mod nodelay;
mod tracker;

pub use multipath::{MULTIPATH_CONFIG, MultipathEntry, MultipathPolicy, OptionValue};
pub use nodelay::{NO_DELAY_KEY, NoDelayOnce};
pub use tracker::{Claim, SocketTracker};
