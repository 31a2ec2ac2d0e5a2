//! Logging macros
//!
//! With the `defmt` feature the macros forward to `defmt`. Without it they
//! still type-check their arguments but compile to nothing, which keeps host
//! tests quiet.
//!
//! Stick to `{}` and `{:?}` placeholders so both expansions accept the
//! format string.

#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { ::defmt::info!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{ let _ = ::core::format_args!($($arg)*); }};
}

#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { ::defmt::warn!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{ let _ = ::core::format_args!($($arg)*); }};
}

#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { ::defmt::debug!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{ let _ = ::core::format_args!($($arg)*); }};
}

#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => { ::defmt::trace!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {{ let _ = ::core::format_args!($($arg)*); }};
}
