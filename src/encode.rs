use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("empty segment")]
    EmptySegment,
    #[error("wav encoding failed: {0}")]
    Wav(#[from] hound::Error),
}

/// In-memory WAV container ready for upload. Mono 16-bit PCM at the source
/// sample rate.
#[derive(Debug, Clone)]
pub struct EncodedClip {
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl EncodedClip {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Serializes float samples into a mono 16-bit PCM WAV byte buffer. Samples
/// are scaled to the i16 range and clamped, so out-of-range input cannot wrap
/// around. Deterministic: identical samples produce byte-identical output.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<EncodedClip, EncodeError> {
    if samples.is_empty() {
        return Err(EncodeError::EmptySegment);
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }

    Ok(EncodedClip {
        bytes: cursor.into_inner(),
        sample_rate,
        channels: 1,
        bits_per_sample: 16,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_wav_round_trip() {
        let samples: Vec<f32> = (0..1600)
            .map(|i| (i as f32 / 1600.0 * std::f32::consts::TAU).sin() * 0.5)
            .collect();
        let clip = encode_wav(&samples, 16000).unwrap();

        let reader = hound::WavReader::new(Cursor::new(clip.bytes.clone())).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len() as usize, samples.len());
    }

    #[test]
    fn test_out_of_range_samples_clamp() {
        let clip = encode_wav(&[2.0, -2.0, 0.0], 16000).unwrap();
        let reader = hound::WavReader::new(Cursor::new(clip.bytes)).unwrap();
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![i16::MAX, -i16::MAX, 0]);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let samples = vec![0.1, -0.3, 0.7, 0.0];
        let a = encode_wav(&samples, 22050).unwrap();
        let b = encode_wav(&samples, 22050).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_empty_segment_rejected() {
        assert!(matches!(
            encode_wav(&[], 16000),
            Err(EncodeError::EmptySegment)
        ));
    }
}
