//! Inter-task signals
//!
//! The control loop runs alone in the main task. The join task only
//! services association requests.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Ask the join task to (re)join the configured network
pub static JOIN_REQUEST: Signal<CriticalSectionRawMutex, ()> = Signal::new();
