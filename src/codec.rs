//! Length-prefixed JSON framing used for every far-tier value: a 4-byte big-endian length
//! followed by that many bytes of UTF-8 JSON. A short read, a length mismatch, or a JSON parse
//! failure are all reported as `StoreError::Decode` rather than silently defaulted.

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

const LEN_PREFIX_BYTES: usize = 4;

pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let json = serde_json::to_vec(value).map_err(|e| StoreError::Decode(e.to_string()))?;
    let mut buf = BytesMut::with_capacity(LEN_PREFIX_BYTES + json.len());
    buf.put_u32(u32::try_from(json.len()).map_err(|_| {
        StoreError::Decode("value too large to frame (exceeds u32::MAX bytes)".to_string())
    })?);
    buf.put_slice(&json);
    Ok(buf.to_vec())
}

pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    if bytes.len() < LEN_PREFIX_BYTES {
        return Err(StoreError::Decode(format!(
            "frame shorter than the {LEN_PREFIX_BYTES}-byte length prefix"
        )));
    }
    let mut cursor = bytes;
    let len = cursor.get_u32() as usize;
    if cursor.len() != len {
        return Err(StoreError::Decode(format!(
            "length prefix says {len} bytes but {} remain",
            cursor.len()
        )));
    }
    serde_json::from_slice(cursor).map_err(|e| StoreError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn round_trips_a_value() {
        let value = Sample {
            a: 7,
            b: "hello".to_string(),
        };
        let frame = encode_frame(&value).unwrap();
        let decoded: Sample = decode_frame(&frame).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn rejects_truncated_frames() {
        let value = Sample {
            a: 1,
            b: "x".to_string(),
        };
        let mut frame = encode_frame(&value).unwrap();
        frame.truncate(frame.len() - 1);
        assert!(decode_frame::<Sample>(&frame).is_err());
    }

    #[test]
    fn rejects_frames_without_a_full_length_prefix() {
        assert!(decode_frame::<Sample>(&[0, 1]).is_err());
    }
}
