//! WAV encoding for the remote transcription wire contract.
//!
//! Produces the 44-byte RIFF/WAVE/fmt/data layout the server expects:
//! little-endian 16-bit PCM, 16 kHz, mono, with float samples clipped to
//! [-1, 1] and scaled by 32767.

use std::io::Cursor;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};

use super::EXPECTED_SAMPLE_RATE;

/// Encode f32 PCM as an in-memory 16 kHz mono 16-bit WAV file.
pub fn encode_wav_16k_mono(samples: &[f32]) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: EXPECTED_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer =
            WavWriter::new(&mut cursor, spec).context("failed to create wav writer")?;
        for &sample in samples {
            let clipped = sample.clamp(-1.0, 1.0);
            writer
                .write_sample((clipped * 32767.0) as i16)
                .context("failed to write wav sample")?;
        }
        writer.finalize().context("failed to finalize wav")?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn header_is_riff_wave_pcm() {
        let bytes = encode_wav_16k_mono(&[0.0; 16]).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        // Subchunk1Size = 16, AudioFormat = 1 (PCM), 1 channel.
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes(bytes[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(bytes[22..24].try_into().unwrap()), 1);
        assert_eq!(
            u32::from_le_bytes(bytes[24..28].try_into().unwrap()),
            EXPECTED_SAMPLE_RATE
        );
    }

    #[test]
    fn round_trip_matches_scaled_samples() {
        let samples = [0.0f32, 0.5, -0.5, 1.0, -1.0, 0.123];
        let bytes = encode_wav_16k_mono(&samples).unwrap();

        let reader = WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, EXPECTED_SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);

        let decoded: Vec<i16> = reader.into_samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(decoded.len(), samples.len());
        for (decoded, original) in decoded.iter().zip(samples.iter()) {
            let expected = (original.clamp(-1.0, 1.0) * 32767.0) as i16;
            assert!(
                (*decoded as i32 - expected as i32).abs() <= 1,
                "decoded {decoded}, expected {expected}"
            );
        }
    }

    #[test]
    fn out_of_range_samples_are_clipped() {
        let bytes = encode_wav_16k_mono(&[2.0f32, -3.0]).unwrap();
        let reader = WavReader::new(Cursor::new(bytes)).unwrap();
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(decoded, vec![32767, -32767]);
    }

    #[test]
    fn empty_input_produces_header_only() {
        let bytes = encode_wav_16k_mono(&[]).unwrap();
        assert_eq!(bytes.len(), 44);
    }
}
