//! Raw PCM16 chunk decoder.

use anyhow::Result;

use super::stream_decoder::StreamDecoder;

/// Full-scale divisor for signed 16-bit samples.
const I16_FULL_SCALE: f32 = 32768.0;

/// Decodes little-endian signed 16-bit mono PCM into `f32` samples.
#[derive(Debug, Default, Clone)]
pub struct Pcm16Decoder;

impl Pcm16Decoder {
    pub fn new() -> Self {
        Self
    }
}

impl StreamDecoder for Pcm16Decoder {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>> {
        let chunks = data.chunks_exact(2);
        let remainder = chunks.remainder();

        let samples: Vec<f32> = chunks
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / I16_FULL_SCALE)
            .collect();

        if !remainder.is_empty() {
            // A dangling byte cannot form a sample; skip it and keep the rest.
            log::warn!(
                "PCM payload has odd length {} bytes, skipping trailing byte",
                data.len()
            );
        }

        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_full_scale_values() {
        let mut dec = Pcm16Decoder::new();
        let out = dec.decode(&encode(&[0, i16::MIN, i16::MAX, -16384])).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], -1.0);
        assert!((out[2] - 32767.0 / 32768.0).abs() < f32::EPSILON);
        assert_eq!(out[3], -0.5);
    }

    #[test]
    fn odd_trailing_byte_is_skipped_not_fatal() {
        let mut dec = Pcm16Decoder::new();
        let mut bytes = encode(&[1000, -1000]);
        bytes.push(0x7f);
        let out = dec.decode(&bytes).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], -1000.0 / 32768.0);
    }

    #[test]
    fn split_payloads_decode_like_the_concatenation() {
        let raw: Vec<i16> = (0..257).map(|i| (i * 97 - 12000) as i16).collect();
        let bytes = encode(&raw);

        let mut whole = Pcm16Decoder::new();
        let expected = whole.decode(&bytes).unwrap();

        let mut pieces = Pcm16Decoder::new();
        let mut got = Vec::new();
        for chunk in bytes.chunks(38) {
            got.extend(pieces.decode(chunk).unwrap());
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn empty_payload_yields_nothing() {
        let mut dec = Pcm16Decoder::new();
        assert!(dec.decode(&[]).unwrap().is_empty());
    }
}
