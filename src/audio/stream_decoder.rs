//! Generic stream decoder trait for the playback path.

use anyhow::Result;

/// A trait for stream decoders that turn one network payload into mono
/// floating-point samples ready to be split into sample blocks.
///
/// Each call is independent: implementations must not carry partial samples
/// from one payload into the next.
pub trait StreamDecoder: Send {
    /// Decode one payload into normalized samples in `[-1, 1]`.
    fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>>;
}

/// Factory function: create a decoder for the configured stream format.
pub fn create_decoder(format: &str) -> Result<Box<dyn StreamDecoder>> {
    match format {
        "pcm16" | "pcm_s16le" => Ok(Box::new(super::pcm_decoder::Pcm16Decoder::new())),
        other => anyhow::bail!("Unsupported stream format: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_knows_pcm16_only() {
        let mut dec = create_decoder("pcm16").unwrap();
        assert_eq!(dec.decode(&[0x00, 0x40]).unwrap(), vec![0.5]);
        assert!(create_decoder("opus").is_err());
    }
}
