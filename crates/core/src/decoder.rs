// SPDX-License-Identifier: Apache-2.0

//! Audio asset decoding: PCM unpack and the DLC decoder seam
//!
//! PCM elements carry big-endian signed words that unpack directly to
//! floats. DLC is a lossless codec whose internals live behind the
//! [`DlcDecoder`] trait; the renderer invokes it once per referenced
//! audio data ID per frame. Either path fills a float buffer of exactly
//! the frame's sample count, in [-1, 1].

use crate::frame::{AudioDataDlc, AudioDataPcm, BitDepth, FrameRate, SampleRate};

/// Errors surfaced by asset decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetDecodeError {
    #[error("element frame rate does not match the frame being rendered")]
    FrameRateMismatch,
    #[error("element sample rate {element:?} cannot produce output at {output:?}")]
    SampleRateMismatch {
        element: SampleRate,
        output: SampleRate,
    },
    #[error("element holds {have} samples, frame needs {need}")]
    ShortAsset { have: usize, need: usize },
    #[error("malformed DLC payload: {0}")]
    MalformedDlc(String),
    #[error("no DLC decoder configured")]
    DlcUnavailable,
}

/// Decoder for DLC coded audio elements.
///
/// The 96 kHz case is rate-scalable: when `output_rate` is 48 kHz and the
/// element is 96 kHz, the decoder emits the half-rate samples. `out` is
/// sized to the output frame sample count and must be filled completely.
pub trait DlcDecoder: Send + Sync {
    fn decode(
        &self,
        element: &AudioDataDlc,
        output_rate: SampleRate,
        out: &mut [f32],
    ) -> Result<(), AssetDecodeError>;
}

/// Placeholder decoder for hosts that carry PCM-only content. Any DLC
/// element fails with [`AssetDecodeError::DlcUnavailable`].
pub struct NoDlcDecoder;

impl DlcDecoder for NoDlcDecoder {
    fn decode(
        &self,
        _element: &AudioDataDlc,
        _output_rate: SampleRate,
        _out: &mut [f32],
    ) -> Result<(), AssetDecodeError> {
        Err(AssetDecodeError::DlcUnavailable)
    }
}

/// Scale factors mapping signed integer words onto [-1, 1].
fn pcm_scale(bit_depth: BitDepth) -> f32 {
    match bit_depth {
        BitDepth::Bits16 => 1.0 / 32768.0,
        BitDepth::Bits24 => 1.0 / 8_388_608.0,
    }
}

/// Unpack a PCM element into `out`.
///
/// The element's frame rate must match the frame being rendered. A
/// 96 kHz element unpacked at a 48 kHz output rate emits every other
/// sample; the converse combination is rejected.
pub fn unpack_pcm(
    element: &AudioDataPcm,
    frame_rate: FrameRate,
    output_rate: SampleRate,
    out: &mut [f32],
) -> Result<(), AssetDecodeError> {
    if element.frame_rate != frame_rate {
        return Err(AssetDecodeError::FrameRateMismatch);
    }

    let decimate = match (element.sample_rate, output_rate) {
        (SampleRate::Hz96000, SampleRate::Hz48000) => 2,
        (a, b) if a == b => 1,
        (element, output) => {
            return Err(AssetDecodeError::SampleRateMismatch { element, output })
        }
    };

    let available = element.sample_count() / decimate;
    if available < out.len() {
        return Err(AssetDecodeError::ShortAsset {
            have: available,
            need: out.len(),
        });
    }

    let bytes = element.bit_depth.bytes_per_sample();
    let stride = bytes * decimate;
    let scale = pcm_scale(element.bit_depth);

    match element.bit_depth {
        BitDepth::Bits16 => {
            for (sample, word) in out.iter_mut().zip(element.data.chunks(stride)) {
                let raw = i16::from_be_bytes([word[0], word[1]]);
                *sample = raw as f32 * scale;
            }
        }
        BitDepth::Bits24 => {
            for (sample, word) in out.iter_mut().zip(element.data.chunks(stride)) {
                // Sign extend the 24-bit word through the top byte.
                let raw = i32::from_be_bytes([word[0], word[1], word[2], 0]) >> 8;
                *sample = raw as f32 * scale;
            }
        }
    }

    Ok(())
}

/// Pack float samples into a PCM element payload. The inverse of
/// [`unpack_pcm`], used by hosts and tests to author assets.
pub fn pack_pcm_samples(samples: &[f32], bit_depth: BitDepth) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * bit_depth.bytes_per_sample());
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        match bit_depth {
            BitDepth::Bits16 => {
                let raw = (clamped * 32767.0).round() as i16;
                data.extend_from_slice(&raw.to_be_bytes());
            }
            BitDepth::Bits24 => {
                let raw = (clamped * 8_388_607.0).round() as i32;
                data.extend_from_slice(&raw.to_be_bytes()[1..4]);
            }
        }
    }
    data
}
