//! Minimal MQTT 3.1.1 packet codec
//!
//! Only the subset a subscribe-only client needs:
//! - encode: CONNECT, SUBSCRIBE (QoS 0), PUBACK, PINGREQ, DISCONNECT
//! - decode: CONNACK, PUBLISH (QoS 0/1), SUBACK, PINGRESP
//!
//! Fixed header:
//! - byte 0: packet type (high nibble) and flags (low nibble)
//! - 1-4 bytes: remaining length, 7 bits per byte, LSB group first

pub const CONNECT: u8 = 1;
pub const CONNACK: u8 = 2;
pub const PUBLISH: u8 = 3;
pub const PUBACK: u8 = 4;
pub const SUBSCRIBE: u8 = 8;
pub const SUBACK: u8 = 9;
pub const PINGREQ: u8 = 12;
pub const PINGRESP: u8 = 13;
pub const DISCONNECT: u8 = 14;

const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4;
const CLEAN_SESSION: u8 = 0x02;

/// Largest value the remaining-length field can carry
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// SUBACK return code for a rejected subscription
pub const SUBACK_FAILURE: u8 = 0x80;

/// Errors from encoding or decoding packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError {
    /// Output buffer too small
    BufferTooSmall,
    /// Remaining length exceeds four bytes
    LengthOverflow,
    /// Packet body does not match its type
    Malformed,
    /// String field longer than 65535 bytes
    StringTooLong,
}

/// A decoded inbound packet, borrowing from the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    ConnAck {
        session_present: bool,
        return_code: u8,
    },
    Publish {
        topic: &'a str,
        payload: &'a [u8],
        packet_id: Option<u16>,
    },
    SubAck {
        packet_id: u16,
        return_code: u8,
    },
    PingResp,
    /// Valid framing, type this client does not handle
    Other { packet_type: u8 },
}

/// Encode a remaining-length value, returning bytes written
pub fn encode_remaining_length(mut len: usize, out: &mut [u8]) -> Result<usize, MqttError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(MqttError::LengthOverflow);
    }
    let mut pos = 0;
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        *out.get_mut(pos).ok_or(MqttError::BufferTooSmall)? = byte;
        pos += 1;
        if len == 0 {
            return Ok(pos);
        }
    }
}

/// Decode a remaining-length field
///
/// Returns `Ok(None)` if more bytes are needed, otherwise the value and the
/// number of bytes it occupied.
pub fn decode_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>, MqttError> {
    let mut value = 0usize;
    for (i, &byte) in buf.iter().enumerate() {
        if i == 4 {
            return Err(MqttError::LengthOverflow);
        }
        value |= ((byte & 0x7F) as usize) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if buf.len() >= 4 {
        return Err(MqttError::LengthOverflow);
    }
    Ok(None)
}

/// Sequential writer over a caller-provided buffer
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, data: &[u8]) -> Result<(), MqttError> {
        let end = self.pos + data.len();
        self.buf
            .get_mut(self.pos..end)
            .ok_or(MqttError::BufferTooSmall)?
            .copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    fn u8(&mut self, v: u8) -> Result<(), MqttError> {
        self.bytes(&[v])
    }

    fn u16(&mut self, v: u16) -> Result<(), MqttError> {
        self.bytes(&v.to_be_bytes())
    }

    fn string(&mut self, s: &[u8]) -> Result<(), MqttError> {
        let len = u16::try_from(s.len()).map_err(|_| MqttError::StringTooLong)?;
        self.u16(len)?;
        self.bytes(s)
    }

    fn header(&mut self, first: u8, remaining: usize) -> Result<(), MqttError> {
        self.u8(first)?;
        let mut len = [0u8; 4];
        let n = encode_remaining_length(remaining, &mut len)?;
        self.bytes(&len[..n])
    }
}

/// Encode CONNECT with a clean session and no credentials
pub fn encode_connect(buf: &mut [u8], client_id: &str, keep_alive_s: u16) -> Result<usize, MqttError> {
    let remaining = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2 + 2 + client_id.len();
    let mut w = Writer::new(buf);
    w.header(CONNECT << 4, remaining)?;
    w.string(PROTOCOL_NAME)?;
    w.u8(PROTOCOL_LEVEL)?;
    w.u8(CLEAN_SESSION)?;
    w.u16(keep_alive_s)?;
    w.string(client_id.as_bytes())?;
    Ok(w.pos)
}

/// Encode SUBSCRIBE for a single topic at QoS 0
pub fn encode_subscribe(buf: &mut [u8], packet_id: u16, topic: &str) -> Result<usize, MqttError> {
    let remaining = 2 + 2 + topic.len() + 1;
    let mut w = Writer::new(buf);
    // SUBSCRIBE flags are fixed at 0b0010
    w.header((SUBSCRIBE << 4) | 0x02, remaining)?;
    w.u16(packet_id)?;
    w.string(topic.as_bytes())?;
    w.u8(0)?;
    Ok(w.pos)
}

pub fn encode_puback(buf: &mut [u8], packet_id: u16) -> Result<usize, MqttError> {
    let mut w = Writer::new(buf);
    w.header(PUBACK << 4, 2)?;
    w.u16(packet_id)?;
    Ok(w.pos)
}

pub fn encode_pingreq(buf: &mut [u8]) -> Result<usize, MqttError> {
    let mut w = Writer::new(buf);
    w.header(PINGREQ << 4, 0)?;
    Ok(w.pos)
}

pub fn encode_disconnect(buf: &mut [u8]) -> Result<usize, MqttError> {
    let mut w = Writer::new(buf);
    w.header(DISCONNECT << 4, 0)?;
    Ok(w.pos)
}

/// Decode one packet from the front of `buf`
///
/// Returns `Ok(None)` while the packet is incomplete, otherwise the packet
/// and the total number of bytes it consumed.
pub fn decode_packet(buf: &[u8]) -> Result<Option<(Packet<'_>, usize)>, MqttError> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    let Some((remaining, len_bytes)) = decode_remaining_length(&buf[1..])? else {
        return Ok(None);
    };
    let total = 1 + len_bytes + remaining;
    if buf.len() < total {
        return Ok(None);
    }
    let body = &buf[1 + len_bytes..total];

    let packet = match first >> 4 {
        CONNACK => {
            if body.len() != 2 {
                return Err(MqttError::Malformed);
            }
            Packet::ConnAck {
                session_present: body[0] & 0x01 != 0,
                return_code: body[1],
            }
        }
        PUBLISH => decode_publish(first, body)?,
        SUBACK => {
            if body.len() < 3 {
                return Err(MqttError::Malformed);
            }
            Packet::SubAck {
                packet_id: u16::from_be_bytes([body[0], body[1]]),
                return_code: body[2],
            }
        }
        PINGRESP => Packet::PingResp,
        packet_type => Packet::Other { packet_type },
    };
    Ok(Some((packet, total)))
}

fn decode_publish(first: u8, body: &[u8]) -> Result<Packet<'_>, MqttError> {
    let qos = (first >> 1) & 0x03;
    if body.len() < 2 {
        return Err(MqttError::Malformed);
    }
    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
    let topic_end = 2 + topic_len;
    let topic = body.get(2..topic_end).ok_or(MqttError::Malformed)?;
    let topic = core::str::from_utf8(topic).map_err(|_| MqttError::Malformed)?;

    let (packet_id, payload_start) = if qos > 0 {
        let id = body.get(topic_end..topic_end + 2).ok_or(MqttError::Malformed)?;
        (Some(u16::from_be_bytes([id[0], id[1]])), topic_end + 2)
    } else {
        (None, topic_end)
    };

    Ok(Packet::Publish {
        topic,
        payload: &body[payload_start..],
        packet_id,
    })
}
