//! Pub/sub topic decoding
//!
//! Payloads are decimal text. Decoding here is deliberately lenient: the
//! longest numeric prefix is used and anything unparseable becomes zero,
//! matching how the host tools have always published values.

use core::fmt::Write;

use heapless::String;

use crate::command::Command;

/// Longest topic string built or matched here
pub const MAX_TOPIC_LEN: usize = 64;

/// Longest accepted topic prefix
pub const MAX_PREFIX_LEN: usize = 32;

/// Topic leaf names the bridge subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TopicKind {
    Steering,
    Throttle,
    SteeringTrim,
}

impl TopicKind {
    pub const ALL: [TopicKind; 3] = [
        TopicKind::Steering,
        TopicKind::Throttle,
        TopicKind::SteeringTrim,
    ];

    pub fn leaf(self) -> &'static str {
        match self {
            TopicKind::Steering => "steering",
            TopicKind::Throttle => "throttle",
            TopicKind::SteeringTrim => "steering_trim",
        }
    }

    fn from_leaf(leaf: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.leaf() == leaf)
    }
}

/// Maps between topic names and commands for one prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMap {
    prefix: String<MAX_PREFIX_LEN>,
}

impl TopicMap {
    /// Create a topic map, truncating an overlong prefix
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: crate::command::truncate(prefix.trim_end_matches('/')),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full topic name for `kind`, e.g. `f1/steering`
    pub fn topic(&self, kind: TopicKind) -> String<MAX_TOPIC_LEN> {
        let mut topic = String::new();
        // Prefix and leaf together always fit
        let _ = write!(topic, "{}/{}", self.prefix, kind.leaf());
        topic
    }

    /// Identify which control topic a name refers to
    ///
    /// Only the last path segment is compared, so a message published under
    /// a different prefix still lands on the right channel.
    pub fn classify(&self, topic: &str) -> Option<TopicKind> {
        let leaf = topic.rsplit('/').next().unwrap_or(topic);
        TopicKind::from_leaf(leaf)
    }

    /// Decode one message into a command
    pub fn decode(&self, topic: &str, payload: &[u8]) -> Command {
        match self.classify(topic) {
            Some(TopicKind::Steering) => Command::Steer(parse_permissive_f32(payload)),
            Some(TopicKind::Throttle) => Command::Throttle(parse_permissive_f32(payload)),
            Some(TopicKind::SteeringTrim) => {
                let trim = parse_permissive_i32(payload);
                Command::TrimAdjust(trim.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
            }
            None => Command::unknown(topic),
        }
    }
}

/// Parse the longest leading float in `payload`, or 0.0
pub fn parse_permissive_f32(payload: &[u8]) -> f32 {
    let text = skip_ws(payload);
    let len = float_prefix_len(text);
    if len == 0 {
        return 0.0;
    }
    core::str::from_utf8(&text[..len])
        .ok()
        .and_then(|s| s.parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Parse the longest leading integer in `payload`, or 0
///
/// Saturates at the `i32` limits.
pub fn parse_permissive_i32(payload: &[u8]) -> i32 {
    let text = skip_ws(payload);
    let (negative, digits) = match text.first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let mut value: i32 = 0;
    for &b in digits.iter().take_while(|b| b.is_ascii_digit()) {
        let digit = (b - b'0') as i32;
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    value
}

fn skip_ws(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// Length of `[+-]?digits[.digits][(e|E)[+-]?digits]` at the start of `text`
fn float_prefix_len(text: &[u8]) -> usize {
    let count_digits = |from: usize| {
        text[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let mut pos = 0;
    if matches!(text.first(), Some(b'+') | Some(b'-')) {
        pos = 1;
    }

    let int_digits = count_digits(pos);
    pos += int_digits;

    let mut frac_digits = 0;
    if text.get(pos) == Some(&b'.') {
        frac_digits = count_digits(pos + 1);
        if int_digits > 0 || frac_digits > 0 {
            pos += 1 + frac_digits;
        }
    }

    if int_digits == 0 && frac_digits == 0 {
        return 0;
    }

    if matches!(text.get(pos), Some(b'e') | Some(b'E')) {
        let mut exp = pos + 1;
        if matches!(text.get(exp), Some(b'+') | Some(b'-')) {
            exp += 1;
        }
        let exp_digits = count_digits(exp);
        if exp_digits > 0 {
            pos = exp + exp_digits;
        }
    }

    pos
}
