//! Binary wire format for audio frames.
//!
//! Each transport message is a fixed 32-byte header followed by raw PCM16
//! bytes. The header is little-endian and padded so future fields can be
//! added without breaking existing decoders:
//!
//! ```text
//! offset  0  seq           u32
//! offset  4  t0            f64
//! offset 12  sample_rate   u32
//! offset 16  channel_count u8
//! offset 17  frame_count   u32
//! offset 21  rms           f32
//! offset 25  padding       [u8; 7] (zero)
//! offset 32  PCM16 payload, frame_count samples
//! ```
//!
//! The layout is transport- and host-independent; `decode(encode(f)) == f`
//! byte-for-byte for any valid frame.

use crate::audio::frame::AudioFrame;
use crate::error::{InterscribeError, Result};

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 32;

/// Encodes a frame into a wire message.
pub fn encode(frame: &AudioFrame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + frame.samples.len() * 2);
    buf.extend_from_slice(&frame.seq.to_le_bytes());
    buf.extend_from_slice(&frame.t0.to_le_bytes());
    buf.extend_from_slice(&frame.sample_rate.to_le_bytes());
    buf.push(frame.channel_count);
    buf.extend_from_slice(&(frame.samples.len() as u32).to_le_bytes());
    buf.extend_from_slice(&frame.rms.to_le_bytes());
    buf.resize(HEADER_LEN, 0);

    for sample in &frame.samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }
    buf
}

/// Decodes a wire message into a frame.
///
/// Rejects messages shorter than the header and messages whose payload length
/// disagrees with the header's `frame_count`.
pub fn decode(bytes: &[u8]) -> Result<AudioFrame> {
    if bytes.len() < HEADER_LEN {
        return Err(InterscribeError::MalformedFrame {
            message: format!("message of {} bytes is shorter than the header", bytes.len()),
        });
    }

    let seq = u32::from_le_bytes(read_array(bytes, 0));
    let t0 = f64::from_le_bytes(read_array(bytes, 4));
    let sample_rate = u32::from_le_bytes(read_array(bytes, 12));
    let channel_count = bytes[16];
    let frame_count = u32::from_le_bytes(read_array(bytes, 17));
    let rms = f32::from_le_bytes(read_array(bytes, 21));

    if sample_rate == 0 {
        return Err(InterscribeError::MalformedFrame {
            message: "sample_rate is zero".to_string(),
        });
    }

    let payload = &bytes[HEADER_LEN..];
    if payload.len() != frame_count as usize * 2 {
        return Err(InterscribeError::MalformedFrame {
            message: format!(
                "payload of {} bytes does not match frame_count {}",
                payload.len(),
                frame_count
            ),
        });
    }

    let samples = payload
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok(AudioFrame {
        seq,
        t0,
        sample_rate,
        channel_count,
        samples,
        rms,
    })
}

fn read_array<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> AudioFrame {
        AudioFrame::new(42, 8.4, 16000, (0..3200).map(|i| (i % 251) as i16).collect())
    }

    #[test]
    fn test_roundtrip_is_exact() {
        let frame = sample_frame();
        let decoded = decode(&encode(&frame)).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_roundtrip_bytes_are_identical() {
        let frame = sample_frame();
        let encoded = encode(&frame);
        let reencoded = encode(&decode(&encoded).unwrap());
        assert_eq!(encoded, reencoded);
    }

    #[test]
    fn test_roundtrip_short_final_frame() {
        let frame = AudioFrame::new(7, 1.4, 16000, vec![-3000i16; 777]);
        assert_eq!(decode(&encode(&frame)).unwrap(), frame);
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        let frame = AudioFrame::new(0, 0.0, 16000, Vec::new());
        let encoded = encode(&frame);
        assert_eq!(encoded.len(), HEADER_LEN);
        assert_eq!(decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn test_header_is_32_bytes_little_endian() {
        let frame = AudioFrame::new(0x01020304, 0.0, 16000, vec![0i16; 1]);
        let encoded = encode(&frame);

        assert_eq!(&encoded[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&encoded[12..16], &16000u32.to_le_bytes());
        assert_eq!(encoded[16], 1);
        assert_eq!(&encoded[17..21], &1u32.to_le_bytes());
        // Padding must stay zero for forward compatibility
        assert_eq!(&encoded[25..32], &[0u8; 7]);
        assert_eq!(encoded.len(), HEADER_LEN + 2);
    }

    #[test]
    fn test_decode_rejects_truncated_header() {
        let err = decode(&[0u8; 20]).unwrap_err();
        assert!(err.to_string().contains("shorter than the header"));
    }

    #[test]
    fn test_decode_rejects_payload_length_mismatch() {
        let frame = AudioFrame::new(1, 0.0, 16000, vec![5i16; 100]);
        let mut encoded = encode(&frame);
        encoded.truncate(encoded.len() - 2);

        let err = decode(&encoded).unwrap_err();
        assert!(err.to_string().contains("does not match frame_count"));
    }

    #[test]
    fn test_decode_rejects_odd_payload() {
        let frame = AudioFrame::new(1, 0.0, 16000, vec![5i16; 4]);
        let mut encoded = encode(&frame);
        encoded.push(0xff);

        assert!(decode(&encoded).is_err());
    }

    #[test]
    fn test_decode_rejects_zero_sample_rate() {
        let mut encoded = encode(&AudioFrame::new(1, 0.0, 16000, vec![0i16; 2]));
        encoded[12..16].copy_from_slice(&0u32.to_le_bytes());
        assert!(decode(&encoded).is_err());
    }
}
