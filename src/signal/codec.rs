//! Wire encodings for signal values.
//!
//! JSON text frames look like `{"type":"signal_value","signal":<name>,"value":<json>}`.
//! Binary frames start with a one byte message tag followed by a big-endian
//! `u16` name length and the UTF-8 name; the payload after that depends on the tag.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SIGNAL_VALUE_TYPE: &str = "signal_value";

/// One outbound websocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WireMessage {
    pub fn len(&self) -> usize {
        match self {
            WireMessage::Text(text) => text.len(),
            WireMessage::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tag byte at the start of every binary frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BinaryMessageType {
    /// `u16` rows, `u16` cols, then rows*cols RGB triples.
    PixelMatrix = 0x01,
    /// `u64` millisecond timestamp, `u32` count, then `i32` samples.
    TimestampedIntVector = 0x02,
}

impl BinaryMessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(BinaryMessageType::PixelMatrix),
            0x02 => Some(BinaryMessageType::TimestampedIntVector),
            _ => None,
        }
    }
}

/// Turns a named value into a wire frame.
pub type Encoder<T> = Arc<dyn Fn(&str, &T) -> serde_json::Result<WireMessage> + Send + Sync>;

/// Build the JSON text for a `signal_value` notification.
pub fn signal_value_json(signal: &str, value: &serde_json::Value) -> String {
    json!({
        "type": SIGNAL_VALUE_TYPE,
        "signal": signal,
        "value": value,
    })
    .to_string()
}

/// Plain JSON encoding of any serializable value.
pub fn json_encoder<T: Serialize + 'static>() -> Encoder<T> {
    Arc::new(|name: &str, value: &T| {
        let value = serde_json::to_value(value)?;
        Ok(WireMessage::Text(signal_value_json(name, &value)))
    })
}

/// JSON encoding that pairs each element with a fixed label, e.g. band center names.
pub fn labeled_json_encoder(labels: Vec<String>) -> Encoder<Vec<f32>> {
    Arc::new(move |name: &str, values: &Vec<f32>| {
        let value = json!({
            "labels": labels,
            "values": values,
        });
        Ok(WireMessage::Text(signal_value_json(name, &value)))
    })
}

/// Binary timestamped integer-vector encoding used for raw sample signals.
pub fn int_vector_encoder() -> Encoder<Vec<i32>> {
    Arc::new(|name: &str, samples: &Vec<i32>| {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let count = u32::try_from(samples.len()).unwrap_or(u32::MAX);

        let mut bytes = Vec::with_capacity(3 + name.len() + 12 + samples.len() * 4);
        write_binary_header(&mut bytes, BinaryMessageType::TimestampedIntVector, name);
        bytes.extend_from_slice(&timestamp_ms.to_be_bytes());
        bytes.extend_from_slice(&count.to_be_bytes());
        for sample in samples.iter().take(count as usize) {
            bytes.extend_from_slice(&sample.to_be_bytes());
        }
        Ok(WireMessage::Binary(bytes))
    })
}

/// Write the tag and length-prefixed name that open every binary frame.
pub fn write_binary_header(buf: &mut Vec<u8>, tag: BinaryMessageType, name: &str) {
    let name = truncate_name(name);
    buf.push(tag as u8);
    buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
    buf.extend_from_slice(name.as_bytes());
}

/// Split a binary frame into its tag, signal name and payload.
pub fn decode_binary_header(bytes: &[u8]) -> Option<(BinaryMessageType, &str, &[u8])> {
    let (&tag, rest) = bytes.split_first()?;
    let tag = BinaryMessageType::from_byte(tag)?;
    if rest.len() < 2 {
        return None;
    }
    let name_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
    let rest = &rest[2..];
    if rest.len() < name_len {
        return None;
    }
    let name = std::str::from_utf8(&rest[..name_len]).ok()?;
    Some((tag, name, &rest[name_len..]))
}

fn truncate_name(name: &str) -> &str {
    let max = u16::MAX as usize;
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_encoder_shape() {
        let encoder = json_encoder::<f32>();
        let message = encoder("Min db", &30.0).unwrap();
        let WireMessage::Text(text) = message else {
            panic!("expected text frame");
        };
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["type"], "signal_value");
        assert_eq!(parsed["signal"], "Min db");
        assert_eq!(parsed["value"], 30.0);
    }

    #[test]
    fn test_labeled_encoder_pairs_labels_with_values() {
        let encoder = labeled_json_encoder(vec!["16 Hz".into(), "20 Hz".into()]);
        let WireMessage::Text(text) = encoder("Bands", &vec![0.25, 0.5]).unwrap() else {
            panic!("expected text frame");
        };
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["value"]["labels"][1], "20 Hz");
        assert_eq!(parsed["value"]["values"][0], 0.25);
    }

    #[test]
    fn test_int_vector_layout() {
        let encoder = int_vector_encoder();
        let WireMessage::Binary(bytes) = encoder("Mic", &vec![1, -2, 0x0102_0304]).unwrap() else {
            panic!("expected binary frame");
        };
        let (tag, name, payload) = decode_binary_header(&bytes).unwrap();
        assert_eq!(tag, BinaryMessageType::TimestampedIntVector);
        assert_eq!(name, "Mic");
        assert_eq!(payload.len(), 8 + 4 + 3 * 4);

        let count = u32::from_be_bytes([payload[8], payload[9], payload[10], payload[11]]);
        assert_eq!(count, 3);
        assert_eq!(&payload[12..16], &1i32.to_be_bytes());
        assert_eq!(&payload[16..20], &(-2i32).to_be_bytes());
        assert_eq!(&payload[20..24], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_header_is_big_endian_length_prefixed() {
        let mut bytes = Vec::new();
        write_binary_header(&mut bytes, BinaryMessageType::PixelMatrix, "Pixel Grid");
        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..3], &[0x00, 10]);
        assert_eq!(&bytes[3..], b"Pixel Grid");
    }

    #[test]
    fn test_decode_rejects_truncated_frames() {
        assert!(decode_binary_header(&[]).is_none());
        assert!(decode_binary_header(&[0x01, 0x00]).is_none());
        assert!(decode_binary_header(&[0x01, 0x00, 0x05, b'a']).is_none());
        assert!(decode_binary_header(&[0x7f, 0x00, 0x00]).is_none());
    }
}
