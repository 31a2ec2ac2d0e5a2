//! Diagnostic self-test
//!
//! A fixed, ordered suite that exercises the wiring and writes a
//! `DIAG:START` .. `DIAG:END` report to the serial port. It drives the
//! actuators directly and never runs alongside the control loop.

pub mod rig;
pub mod runner;

pub use rig::{AnalogProbe, DiagnosticRig, LoopbackProbe};
pub use runner::{DiagnosticReport, DiagnosticRunner, MAX_ENTRIES};
