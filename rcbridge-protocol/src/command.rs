//! Canonical command type shared by every transport

use heapless::{String, Vec};

/// Longest raw tag/topic kept in [`Command::Unknown`]
pub const MAX_RAW_LEN: usize = 16;

/// Most commands a single line or message can carry (`RC:` carries three)
pub const MAX_BATCH: usize = 3;

/// Commands decoded from one line or message
pub type CommandBatch = Vec<Command, MAX_BATCH>;

/// Logical control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    Steering,
    Throttle,
    Brake,
    SteeringTrim,
}

/// A decoded control command
///
/// Values are passed through as received; range handling belongs to the
/// actuator mapper, which clamps rather than rejects.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Normalized steering, -1.0 (full left) .. 1.0 (full right)
    Steer(f32),
    /// Normalized throttle, 0.0 .. 1.0
    Throttle(f32),
    /// Normalized brake, 0.0 .. 1.0
    Brake(f32),
    /// Steering trim in microseconds
    TrimAdjust(i16),
    /// Message on a channel this bridge does not drive
    Unknown(String<MAX_RAW_LEN>),
}

impl Command {
    /// Get the channel this command targets
    pub fn channel(&self) -> Option<Channel> {
        match self {
            Command::Steer(_) => Some(Channel::Steering),
            Command::Throttle(_) => Some(Channel::Throttle),
            Command::Brake(_) => Some(Channel::Brake),
            Command::TrimAdjust(_) => Some(Channel::SteeringTrim),
            Command::Unknown(_) => None,
        }
    }

    /// Build an `Unknown` command, truncating the raw text to fit
    pub fn unknown(raw: &str) -> Self {
        Command::Unknown(truncate(raw))
    }
}

/// Copy as many whole characters of `s` as fit into a heapless string
pub fn truncate<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels() {
        assert_eq!(Command::Steer(0.0).channel(), Some(Channel::Steering));
        assert_eq!(Command::TrimAdjust(5).channel(), Some(Channel::SteeringTrim));
        assert_eq!(Command::unknown("f1/gear").channel(), None);
    }

    #[test]
    fn test_unknown_truncates() {
        let cmd = Command::unknown("a/very/long/topic/name/indeed");
        match cmd {
            Command::Unknown(raw) => assert_eq!(raw.len(), MAX_RAW_LEN),
            _ => panic!("expected Unknown"),
        }
    }
}
