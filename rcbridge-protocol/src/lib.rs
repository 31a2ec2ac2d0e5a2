//! RC Bridge wire formats
//!
//! This crate defines every byte-level format the bridge speaks. None of it
//! touches hardware, so all of it is tested on the host.
//!
//! # Formats
//!
//! Serial line protocol (115200 8N1), one command per line:
//! ```text
//! S:<float>\n                      steering, -1.0 .. 1.0
//! T:<float>\n                      throttle,  0.0 .. 1.0
//! RC:<0-255>,<0-255>,<0-255>\n     steer, throttle, brake (legacy)
//! ```
//!
//! Pub/sub topics, payload is a decimal string:
//! ```text
//! <prefix>/steering        float
//! <prefix>/throttle        float
//! <prefix>/steering_trim   integer microseconds
//! ```
//!
//! Diagnostic report stream:
//! ```text
//! DIAG:START
//! TEST:<name>:<PASS|FAIL|WARN|INFO>:<detail>
//! DIAG:END
//! ```
//!
//! Both command grammars decode into the same [`Command`] type so the
//! actuator side never needs to know which transport a value came from.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod command;
pub mod line;
pub mod mqtt;
pub mod report;
pub mod topic;

pub use command::{Channel, Command, CommandBatch};
pub use mqtt::{MqttError, Packet};
pub use line::{parse_line, LineBuffer, LineError, MAX_LINE_LEN};
pub use report::{DiagStatus, DiagnosticEntry, ReportError, ReportLine, ReportSummary, Verdict};
pub use topic::{parse_permissive_f32, parse_permissive_i32, TopicKind, TopicMap};
