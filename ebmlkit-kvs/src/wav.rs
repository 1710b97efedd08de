// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

//! The `wav` module wraps raw PCM in a RIFF/WAVE container.

use std::fs;
use std::path::Path;

use ebmlkit::Document;
use ebmlkit_core::errors::Result;

use crate::fragment::track_bytes;

/// PCM stream parameters for the WAVE format chunk.
#[derive(Copy, Clone, Debug)]
pub struct WavSpec {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavSpec {
    /// The telephony audio default: 8 kHz, mono, 16-bit little-endian.
    pub const TELEPHONY: WavSpec =
        WavSpec { channels: 1, sample_rate: 8000, bits_per_sample: 16 };
}

/// Wraps raw little-endian PCM in a WAV container.
pub fn wav_bytes(spec: &WavSpec, pcm: &[u8]) -> Vec<u8> {
    let block_align = spec.channels * (spec.bits_per_sample / 8);
    let byte_rate = spec.sample_rate * u32::from(block_align);
    let data_len = pcm.len() as u32;

    let mut file = Vec::with_capacity(44 + pcm.len());
    file.extend_from_slice(b"RIFF");
    file.extend_from_slice(&(36 + data_len).to_le_bytes());
    file.extend_from_slice(b"WAVE");

    // Format chunk: plain PCM, no extension data.
    file.extend_from_slice(b"fmt ");
    file.extend_from_slice(&16u32.to_le_bytes());
    file.extend_from_slice(&1u16.to_le_bytes());
    file.extend_from_slice(&spec.channels.to_le_bytes());
    file.extend_from_slice(&spec.sample_rate.to_le_bytes());
    file.extend_from_slice(&byte_rate.to_le_bytes());
    file.extend_from_slice(&block_align.to_le_bytes());
    file.extend_from_slice(&spec.bits_per_sample.to_le_bytes());

    file.extend_from_slice(b"data");
    file.extend_from_slice(&data_len.to_le_bytes());
    file.extend_from_slice(pcm);
    file
}

/// Extracts the named track's PCM from a fragment DOM and saves it as a WAV
/// file at the telephony default format.
pub fn save_track_as_wav<P: AsRef<Path>>(
    doc: &Document,
    track_number: u64,
    path: P,
) -> Result<()> {
    let pcm = track_bytes(doc, track_number)?;
    fs::write(path, wav_bytes(&WavSpec::TELEPHONY, &pcm))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{wav_bytes, WavSpec};

    #[test]
    fn header_layout() {
        let pcm: Vec<u8> = vec![0x01, 0x02, 0x03, 0x04];
        let file = wav_bytes(&WavSpec::TELEPHONY, &pcm);

        assert_eq!(&file[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(file[4..8].try_into().unwrap()), 36 + 4);
        assert_eq!(&file[8..12], b"WAVE");
        assert_eq!(&file[12..16], b"fmt ");
        // PCM format tag, mono, 8 kHz.
        assert_eq!(u16::from_le_bytes(file[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(file[22..24].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(file[24..28].try_into().unwrap()), 8000);
        // Byte rate = 8000 * 2, block align = 2, 16 bits.
        assert_eq!(u32::from_le_bytes(file[28..32].try_into().unwrap()), 16000);
        assert_eq!(u16::from_le_bytes(file[32..34].try_into().unwrap()), 2);
        assert_eq!(u16::from_le_bytes(file[34..36].try_into().unwrap()), 16);
        assert_eq!(&file[36..40], b"data");
        assert_eq!(&file[44..], &pcm[..]);
    }
}
