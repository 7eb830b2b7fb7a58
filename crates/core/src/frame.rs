// SPDX-License-Identifier: Apache-2.0

//! Parsed IAB frame model and frame timing
//!
//! The renderer consumes frames that a bitstream parser has already
//! unpacked. Frame sub-elements are modeled as one tagged sum type and
//! the renderer branches on the tag; element kinds it does not render
//! (authoring tool info, user data) are carried but skipped.

use std::collections::HashMap;

use crate::tables::{ChannelId, UseCase};
use crate::transform::CubePosition;

/// Frame rates supported by ST 2098-2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameRate {
    Fps24,
    Fps23_976,
    Fps25,
    Fps30,
    Fps48,
    Fps50,
    Fps60,
    Fps96,
    Fps100,
    Fps120,
}

/// Audio sample rates supported by ST 2098-2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleRate {
    Hz48000,
    Hz96000,
}

impl SampleRate {
    pub fn hz(self) -> u32 {
        match self {
            SampleRate::Hz48000 => 48_000,
            SampleRate::Hz96000 => 96_000,
        }
    }
}

/// PCM word sizes for packed audio data elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BitDepth {
    Bits16,
    Bits24,
}

impl BitDepth {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            BitDepth::Bits16 => 2,
            BitDepth::Bits24 => 3,
        }
    }
}

impl FrameRate {
    pub const ALL: [FrameRate; 10] = [
        FrameRate::Fps24,
        FrameRate::Fps23_976,
        FrameRate::Fps25,
        FrameRate::Fps30,
        FrameRate::Fps48,
        FrameRate::Fps50,
        FrameRate::Fps60,
        FrameRate::Fps96,
        FrameRate::Fps100,
        FrameRate::Fps120,
    ];

    pub fn is_fractional(self) -> bool {
        self == FrameRate::Fps23_976
    }

    /// Number of object pan sub-blocks per frame at this frame rate.
    pub fn num_sub_blocks(self) -> usize {
        match self {
            FrameRate::Fps24 | FrameRate::Fps23_976 | FrameRate::Fps25 | FrameRate::Fps30 => 8,
            FrameRate::Fps48 | FrameRate::Fps50 | FrameRate::Fps60 => 4,
            FrameRate::Fps96 | FrameRate::Fps100 | FrameRate::Fps120 => 2,
        }
    }

    /// Number of samples per frame for this frame rate and sample rate.
    pub fn samples_per_frame(self, sample_rate: SampleRate) -> usize {
        let at_48k = match self {
            FrameRate::Fps24 => 2000,
            FrameRate::Fps23_976 => 2002,
            FrameRate::Fps25 => 1920,
            FrameRate::Fps30 => 1600,
            FrameRate::Fps48 => 1000,
            FrameRate::Fps50 => 960,
            FrameRate::Fps60 => 800,
            FrameRate::Fps96 => 500,
            FrameRate::Fps100 => 480,
            FrameRate::Fps120 => 400,
        };
        match sample_rate {
            SampleRate::Hz48000 => at_48k,
            SampleRate::Hz96000 => at_48k * 2,
        }
    }
}

/// Sub-block sample counts for the 23.976 fps fractional frame rate.
///
/// Samples do not divide evenly into sub-blocks at this rate; the extra
/// samples land on fixed slots so every frame uses the same layout.
const SUB_BLOCK_SIZES_23_976_48K: [usize; 8] = [251, 250, 250, 250, 251, 250, 250, 250];
const SUB_BLOCK_SIZES_23_976_96K: [usize; 8] = [501, 500, 501, 500, 501, 500, 501, 500];

/// Per-frame timing derived from the frame header: sample counts and
/// sub-block boundaries. Sub-block sample counts always sum to the frame
/// sample count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTiming {
    pub frame_rate: FrameRate,
    pub sample_rate: SampleRate,
    pub samples_per_frame: usize,
    pub num_sub_blocks: usize,
    /// Sample count of each sub-block; entries past `num_sub_blocks` are 0.
    pub sub_block_samples: [usize; 8],
    /// Start offset of each sub-block in the frame sample buffer.
    pub sub_block_offsets: [usize; 8],
}

impl FrameTiming {
    pub fn new(frame_rate: FrameRate, sample_rate: SampleRate) -> FrameTiming {
        let samples_per_frame = frame_rate.samples_per_frame(sample_rate);
        let num_sub_blocks = frame_rate.num_sub_blocks();

        let mut sub_block_samples = [0usize; 8];
        if frame_rate.is_fractional() {
            sub_block_samples = match sample_rate {
                SampleRate::Hz48000 => SUB_BLOCK_SIZES_23_976_48K,
                SampleRate::Hz96000 => SUB_BLOCK_SIZES_23_976_96K,
            };
        } else {
            let per_block = samples_per_frame / num_sub_blocks;
            for slot in sub_block_samples.iter_mut().take(num_sub_blocks) {
                *slot = per_block;
            }
        }

        let mut sub_block_offsets = [0usize; 8];
        let mut offset = 0;
        for i in 0..num_sub_blocks {
            sub_block_offsets[i] = offset;
            offset += sub_block_samples[i];
        }

        FrameTiming {
            frame_rate,
            sample_rate,
            samples_per_frame,
            num_sub_blocks,
            sub_block_samples,
            sub_block_offsets,
        }
    }
}

/// Maximum samples per frame over all supported rate combinations
/// (23.976 fps at 96 kHz).
pub const MAX_FRAME_SAMPLE_COUNT: usize = 4004;

/// Identifier of an audio data element within a frame.
pub type AudioDataId = u32;

/// Identifier of a bed, object or remap element.
pub type MetaId = u32;

/// A prefix-coded gain: unity and silence are signaled without a coded
/// value, everything else carries an in-stream quantized gain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GainPrefix {
    Unity,
    Silence,
    Coded(f32),
}

impl GainPrefix {
    pub fn value(self) -> f32 {
        match self {
            GainPrefix::Unity => 1.0,
            GainPrefix::Silence => 0.0,
            GainPrefix::Coded(g) => g,
        }
    }

    pub fn is_binary(self) -> bool {
        matches!(self, GainPrefix::Unity | GainPrefix::Silence)
    }
}

impl Default for GainPrefix {
    fn default() -> Self {
        GainPrefix::Unity
    }
}

/// Object snap parameters.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ObjectSnap {
    pub activated: bool,
    /// Per-axis tolerance in IAB cube units.
    pub tolerance: f32,
}

/// Extended-source parameters, both in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ObjectSpread {
    pub aperture: f32,
    pub divergence: f32,
}

/// Zone-9 gain set carried by an object sub-block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObjectZoneGain9 {
    pub object_zone_control: bool,
    pub gains: [GainPrefix; 9],
}

impl Default for ObjectZoneGain9 {
    fn default() -> Self {
        Self {
            object_zone_control: false,
            gains: [GainPrefix::Unity; 9],
        }
    }
}

/// One temporal slice of an object's pan metadata.
///
/// When `exists` is false every other field is ignored and the values of
/// the previous sub-block in the same frame carry forward. The first
/// sub-block of a frame must have `exists` set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObjectSubBlock {
    pub exists: bool,
    pub position: CubePosition,
    pub gain: GainPrefix,
    pub snap: ObjectSnap,
    pub spread: ObjectSpread,
    pub zone_gains: ObjectZoneGain9,
    pub decorrelate: bool,
}

impl Default for ObjectSubBlock {
    fn default() -> Self {
        Self {
            exists: true,
            position: CubePosition::new(0.5, 0.0, 0.0),
            gain: GainPrefix::Unity,
            snap: ObjectSnap::default(),
            spread: ObjectSpread::default(),
            zone_gains: ObjectZoneGain9::default(),
            decorrelate: false,
        }
    }
}

impl ObjectSubBlock {
    /// A sub-block that inherits everything from its predecessor.
    pub fn carried_forward() -> Self {
        Self {
            exists: false,
            ..Self::default()
        }
    }
}

/// An object definition element.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectDefinition {
    pub meta_id: MetaId,
    pub audio_data_id: AudioDataId,
    pub conditional: bool,
    /// Present only when `conditional` is set.
    pub use_case: Option<UseCase>,
    pub sub_blocks: Vec<ObjectSubBlock>,
    /// Nested object definitions and zone-19 definitions.
    pub sub_elements: Vec<FrameElement>,
}

impl ObjectDefinition {
    pub fn new(meta_id: MetaId, audio_data_id: AudioDataId) -> Self {
        Self {
            meta_id,
            audio_data_id,
            conditional: false,
            use_case: None,
            sub_blocks: Vec::new(),
            sub_elements: Vec::new(),
        }
    }
}

/// One channel of a bed, linked to its audio asset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BedChannel {
    pub channel_id: ChannelId,
    pub audio_data_id: AudioDataId,
    pub gain: GainPrefix,
}

impl BedChannel {
    pub fn new(channel_id: ChannelId, audio_data_id: AudioDataId) -> Self {
        Self {
            channel_id,
            audio_data_id,
            gain: GainPrefix::Unity,
        }
    }
}

/// A bed definition element. May nest further beds and bed remaps as
/// sub-elements; a matching remap replaces the parent bed for rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct BedDefinition {
    pub meta_id: MetaId,
    pub conditional: bool,
    pub use_case: Option<UseCase>,
    pub channels: Vec<BedChannel>,
    pub sub_elements: Vec<FrameElement>,
}

impl BedDefinition {
    pub fn new(meta_id: MetaId, channels: Vec<BedChannel>) -> Self {
        Self {
            meta_id,
            conditional: false,
            use_case: None,
            channels,
            sub_elements: Vec::new(),
        }
    }
}

/// One temporal slice of a remap's coefficients: a D x S matrix with one
/// row per destination channel and one column per source channel.
#[derive(Clone, Debug, PartialEq)]
pub struct RemapSubBlock {
    pub exists: bool,
    pub coefficients: Vec<Vec<f32>>,
}

/// A bed remap element. Activated when its use case matches the target;
/// replaces (not augments) the parent bed.
#[derive(Clone, Debug, PartialEq)]
pub struct BedRemap {
    pub meta_id: MetaId,
    pub use_case: UseCase,
    pub destination_channels: Vec<ChannelId>,
    pub source_channels: Vec<ChannelId>,
    pub sub_blocks: Vec<RemapSubBlock>,
}

/// One temporal slice of a zone-19 definition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Zone19SubBlock {
    pub exists: bool,
    pub gains: [GainPrefix; 19],
}

/// A zone-19 definition carried as an object sub-element. Retained in
/// the element tree; rendering consumes the sub-blocks' zone-9 gains
/// only.
#[derive(Clone, Debug, PartialEq)]
pub struct Zone19Definition {
    pub meta_id: MetaId,
    pub sub_blocks: Vec<Zone19SubBlock>,
}

/// A DLC coded audio asset. The coded payload is opaque to the renderer
/// and handed to the configured DLC decoder.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioDataDlc {
    pub audio_data_id: AudioDataId,
    pub frame_rate: FrameRate,
    pub sample_rate: SampleRate,
    pub data: Vec<u8>,
}

/// A packed PCM audio asset: big-endian signed words at the element's
/// bit depth, one word per sample.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioDataPcm {
    pub audio_data_id: AudioDataId,
    pub frame_rate: FrameRate,
    pub sample_rate: SampleRate,
    pub bit_depth: BitDepth,
    pub data: Vec<u8>,
}

impl AudioDataPcm {
    pub fn sample_count(&self) -> usize {
        self.data.len() / self.bit_depth.bytes_per_sample()
    }
}

/// A frame sub-element. Kinds the renderer does not process are retained
/// so a frame survives a parse/render roundtrip intact.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameElement {
    Bed(BedDefinition),
    Object(ObjectDefinition),
    BedRemap(BedRemap),
    Zone19(Zone19Definition),
    AudioDlc(AudioDataDlc),
    AudioPcm(AudioDataPcm),
    AuthoringToolInfo(String),
    UserData { user_id: [u8; 16], data: Vec<u8> },
}

/// A parsed IAB frame.
#[derive(Clone, Debug, PartialEq)]
pub struct IabFrame {
    pub frame_rate: FrameRate,
    pub sample_rate: SampleRate,
    pub bit_depth: BitDepth,
    pub elements: Vec<FrameElement>,
}

impl IabFrame {
    pub fn new(frame_rate: FrameRate, sample_rate: SampleRate) -> Self {
        Self {
            frame_rate,
            sample_rate,
            bit_depth: BitDepth::Bits24,
            elements: Vec::new(),
        }
    }

    pub fn timing(&self) -> FrameTiming {
        FrameTiming::new(self.frame_rate, self.sample_rate)
    }

    /// MaxRendered per the ST 2098-2 definition: the worst-case count of
    /// simultaneously rendered objects and bed channels across root
    /// elements. Only one use case can be active at a time, so
    /// conditional root elements contribute the maximum over their use
    /// cases. A nested bed one level down may carry more channels than
    /// its parent; the larger count is taken.
    pub fn max_rendered(&self) -> u32 {
        let mut count: u32 = 0;
        let mut conditional_counts: HashMap<UseCase, u32> = HashMap::new();

        for element in &self.elements {
            match element {
                FrameElement::Object(object) => {
                    let use_case = object.use_case.unwrap_or(UseCase::NoUseCase);
                    if !object.conditional || use_case == UseCase::Always {
                        count += 1;
                    } else {
                        *conditional_counts.entry(use_case).or_insert(0) += 1;
                    }
                }
                FrameElement::Bed(bed) => {
                    let mut channels = bed.channels.len() as u32;
                    for sub in &bed.sub_elements {
                        if let FrameElement::Bed(nested) = sub {
                            channels = channels.max(nested.channels.len() as u32);
                        }
                    }
                    let use_case = bed.use_case.unwrap_or(UseCase::NoUseCase);
                    if !bed.conditional || use_case == UseCase::Always {
                        count += channels;
                    } else {
                        *conditional_counts.entry(use_case).or_insert(0) += channels;
                    }
                }
                _ => {}
            }
        }

        count + conditional_counts.values().copied().max().unwrap_or(0)
    }
}
