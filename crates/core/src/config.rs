// SPDX-License-Identifier: Apache-2.0

//! Renderer configuration: target speakers, render patches and flags
//!
//! A configuration is immutable once built. It lists every speaker of the
//! target layout (physical speakers own an output buffer slot, virtual
//! speakers do not), the VBAP render patches tessellating the sphere, the
//! target soundfield, and the rendering flags the renderers consult.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geometry::{Matrix3, Vector3};
use crate::tables::{ChannelId, UseCase};
use crate::transform::{sphere_to_cube, CubePosition};

/// Default decorrelation tail-off, in frames. Long enough to drain the
/// all-pass delay lines at every supported rate.
pub const DEFAULT_DECORR_TAILOFF_FRAMES: u32 = 2;

/// One speaker of the target layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderSpeaker {
    pub name: String,
    /// Channel number in the configuration; -1 for virtual speakers.
    pub channel: i32,
    /// Slot in the renderer output buffer block; `None` for virtual
    /// speakers, whose gains are discarded at output fold-down.
    pub output_index: Option<usize>,
    /// Speaker URI, present for speakers addressable as bed channels.
    pub uri: Option<String>,
    /// Unit position on the VBAP sphere.
    pub position: Vector3,
    /// Position projected into the IAB unit cube.
    pub iab_position: CubePosition,
    /// Whether the speaker takes part in VBAP panning (LFE does not).
    pub vbap: bool,
}

impl RenderSpeaker {
    /// A physical speaker at a nominal bed-channel position.
    pub fn physical(channel: i32, id: ChannelId) -> Self {
        let position = id.vbap_position().normalized();
        Self {
            name: id.name().to_string(),
            channel,
            output_index: None,
            uri: Some(id.uri().to_string()),
            position,
            iab_position: sphere_to_cube(&position),
            vbap: !id.is_lfe(),
        }
    }

    /// A physical speaker at an arbitrary position, without a URI.
    pub fn physical_at(name: &str, channel: i32, position: Vector3) -> Self {
        let position = position.normalized();
        Self {
            name: name.to_string(),
            channel,
            output_index: None,
            uri: None,
            position,
            iab_position: sphere_to_cube(&position),
            vbap: true,
        }
    }

    /// A virtual VBAP speaker. Gains panned here are dropped on output.
    pub fn virtual_at(name: &str, position: Vector3) -> Self {
        let position = position.normalized();
        Self {
            name: name.to_string(),
            channel: -1,
            output_index: None,
            uri: None,
            position,
            iab_position: sphere_to_cube(&position),
            vbap: true,
        }
    }

    pub fn is_physical(&self) -> bool {
        self.channel >= 0
    }
}

/// A render patch: three speakers spanning one spherical triangle, with
/// the matrix of their unit positions and its inverse for the gain solve.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPatch {
    pub s1: usize,
    pub s2: usize,
    pub s3: usize,
    pub basis: Matrix3,
    pub inverse: Matrix3,
}

impl RenderPatch {
    /// Build a patch over three speaker indices. Fails when the speaker
    /// basis is singular (speakers coplanar with the listener).
    pub fn new(
        s1: usize,
        s2: usize,
        s3: usize,
        speakers: &[RenderSpeaker],
    ) -> Result<Self, ConfigError> {
        for index in [s1, s2, s3] {
            if index >= speakers.len() {
                return Err(ConfigError::PatchSpeakerOutOfRange(index));
            }
        }
        let basis = Matrix3::from_rows(
            speakers[s1].position,
            speakers[s2].position,
            speakers[s3].position,
        );
        let inverse = basis.inverse().ok_or(ConfigError::InvalidPatch(s1, s2, s3))?;
        Ok(Self {
            s1,
            s2,
            s3,
            basis,
            inverse,
        })
    }

    pub fn speaker_indices(&self) -> [usize; 3] {
        [self.s1, self.s2, self.s3]
    }
}

/// Immutable renderer configuration consumed at construction.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    speakers: Vec<RenderSpeaker>,
    patches: Vec<RenderPatch>,
    target_soundfield: String,
    target_use_case: UseCase,
    num_output_channels: usize,
    smoothing: bool,
    iab_decorrelation: bool,
    decorr_tailoff_frames: u32,
    name_to_output_index: HashMap<String, usize>,
    uri_to_output_index: HashMap<String, usize>,
    channel_to_output_index: HashMap<i32, usize>,
    uri_to_speaker_index: HashMap<String, usize>,
}

impl RendererConfig {
    /// Build a configuration from a speaker list, patch set and target
    /// soundfield. Output indices are assigned to physical speakers in
    /// list order; any `output_index` already present is overwritten.
    pub fn new(
        mut speakers: Vec<RenderSpeaker>,
        patches: Vec<RenderPatch>,
        target_soundfield: &str,
    ) -> Result<Self, ConfigError> {
        if speakers.is_empty() {
            return Err(ConfigError::EmptySpeakerList);
        }
        if patches.is_empty() {
            return Err(ConfigError::NoRenderPatches);
        }
        let target_use_case = UseCase::from_soundfield(target_soundfield)
            .ok_or_else(|| ConfigError::UnknownSoundfield(target_soundfield.to_string()))?;

        for patch in &patches {
            for index in patch.speaker_indices() {
                if index >= speakers.len() {
                    return Err(ConfigError::PatchSpeakerOutOfRange(index));
                }
            }
        }

        let mut next_output = 0usize;
        for speaker in speakers.iter_mut() {
            if speaker.is_physical() {
                speaker.output_index = Some(next_output);
                next_output += 1;
            } else {
                speaker.output_index = None;
            }
        }
        if next_output == 0 {
            return Err(ConfigError::EmptySpeakerList);
        }

        let mut name_to_output_index = HashMap::new();
        let mut uri_to_output_index = HashMap::new();
        let mut channel_to_output_index = HashMap::new();
        let mut uri_to_speaker_index = HashMap::new();
        for (index, speaker) in speakers.iter().enumerate() {
            if let Some(uri) = &speaker.uri {
                uri_to_speaker_index.insert(uri.clone(), index);
            }
            if let Some(out) = speaker.output_index {
                name_to_output_index.insert(speaker.name.clone(), out);
                channel_to_output_index.insert(speaker.channel, out);
                if let Some(uri) = &speaker.uri {
                    uri_to_output_index.insert(uri.clone(), out);
                }
            }
        }

        Ok(Self {
            speakers,
            patches,
            target_soundfield: target_soundfield.to_string(),
            target_use_case,
            num_output_channels: next_output,
            smoothing: true,
            iab_decorrelation: true,
            decorr_tailoff_frames: DEFAULT_DECORR_TAILOFF_FRAMES,
            name_to_output_index,
            uri_to_output_index,
            channel_to_output_index,
            uri_to_speaker_index,
        })
    }

    /// Build a configuration for a standard soundfield, with speakers at
    /// their nominal positions and an automatically derived patch set.
    pub fn for_soundfield(soundfield: &str) -> anyhow::Result<Self> {
        let use_case = UseCase::from_soundfield(soundfield)
            .ok_or_else(|| anyhow::anyhow!("unknown soundfield: {soundfield}"))?;
        let mut speakers = preset_speakers(use_case);
        // Layouts without height speakers need a virtual zenith speaker to
        // close the upper hemisphere for panning.
        if !speakers.iter().any(|s| s.vbap && s.position.z > 0.05) {
            speakers.push(RenderSpeaker::virtual_at(
                "TSV",
                Vector3::new(0.0, 0.0, 1.0),
            ));
        }
        let patches = build_render_patches(&speakers)?;
        Ok(Self::new(speakers, patches, soundfield)?)
    }

    pub fn with_smoothing(mut self, enabled: bool) -> Self {
        self.smoothing = enabled;
        self
    }

    pub fn with_iab_decorrelation(mut self, enabled: bool) -> Self {
        self.iab_decorrelation = enabled;
        self
    }

    pub fn with_decorr_tailoff_frames(mut self, frames: u32) -> Self {
        self.decorr_tailoff_frames = frames;
        self
    }

    /// All speakers, physical and virtual, in configuration order.
    pub fn all_speakers(&self) -> &[RenderSpeaker] {
        &self.speakers
    }

    /// Physical speakers only.
    pub fn physical_speakers(&self) -> impl Iterator<Item = &RenderSpeaker> {
        self.speakers.iter().filter(|s| s.is_physical())
    }

    pub fn render_patches(&self) -> &[RenderPatch] {
        &self.patches
    }

    pub fn target_soundfield(&self) -> &str {
        &self.target_soundfield
    }

    pub fn target_use_case(&self) -> UseCase {
        self.target_use_case
    }

    /// Number of renderer output channels (= physical speaker count).
    pub fn channel_count(&self) -> usize {
        self.num_output_channels
    }

    /// Total speaker count including virtual speakers; the length of the
    /// VBAP gain vector.
    pub fn total_speaker_count(&self) -> usize {
        self.speakers.len()
    }

    pub fn is_vbap_speaker(&self, name: &str) -> bool {
        self.speakers
            .iter()
            .any(|s| s.name == name && s.vbap)
    }

    pub fn smoothing_enabled(&self) -> bool {
        self.smoothing
    }

    pub fn iab_decorrelation_enabled(&self) -> bool {
        self.iab_decorrelation
    }

    pub fn decorr_tailoff_frames(&self) -> u32 {
        self.decorr_tailoff_frames
    }

    pub fn output_index_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_output_index.get(name).copied()
    }

    /// Output slot of the physical speaker carrying this URI, if any.
    pub fn output_index_by_uri(&self, uri: &str) -> Option<usize> {
        self.uri_to_output_index.get(uri).copied()
    }

    pub fn output_index_by_channel(&self, channel: i32) -> Option<usize> {
        self.channel_to_output_index.get(&channel).copied()
    }

    /// Speaker-list index (into `all_speakers`) for a URI, including
    /// virtual speakers.
    pub fn speaker_index_by_uri(&self, uri: &str) -> Option<usize> {
        self.uri_to_speaker_index.get(uri).copied()
    }

    /// Collapse a total-speaker gain vector into an output-channel gain
    /// vector, discarding virtual speaker gains.
    pub fn fold_to_outputs(&self, speaker_gains: &[f32], output_gains: &mut [f32]) {
        debug_assert_eq!(speaker_gains.len(), self.speakers.len());
        for gain in output_gains.iter_mut() {
            *gain = 0.0;
        }
        for (speaker, gain) in self.speakers.iter().zip(speaker_gains) {
            if let Some(out) = speaker.output_index {
                output_gains[out] = *gain;
            }
        }
    }
}

/// Speakers of the standard target layouts, at nominal positions.
fn preset_speakers(use_case: UseCase) -> Vec<RenderSpeaker> {
    use ChannelId::*;
    let ids: Vec<ChannelId> = match use_case {
        UseCase::Surround5_1 => vec![Left, Center, Right, LeftSurround, RightSurround, Lfe],
        UseCase::Surround7_1Ds => vec![
            Left,
            Center,
            Right,
            LeftSideSurround,
            RightSideSurround,
            LeftRearSurround,
            RightRearSurround,
            Lfe,
        ],
        UseCase::Surround7_1Sds => vec![
            Left,
            LeftCenter,
            Center,
            RightCenter,
            Right,
            LeftSurround,
            RightSurround,
            Lfe,
        ],
        UseCase::Surround9_1Oh => vec![
            Left,
            Center,
            Right,
            LeftSideSurround,
            RightSideSurround,
            LeftRearSurround,
            RightRearSurround,
            LeftTopSurround,
            RightTopSurround,
            Lfe,
        ],
        UseCase::Surround11_1Ht => vec![
            Left,
            Center,
            Right,
            LeftSideSurround,
            RightSideSurround,
            LeftRearSurround,
            RightRearSurround,
            LeftHeight,
            RightHeight,
            LeftTopSurround,
            RightTopSurround,
            Lfe,
        ],
        UseCase::Surround13_1Ht => vec![
            Left,
            LeftCenter,
            Center,
            RightCenter,
            Right,
            LeftSideSurround,
            RightSideSurround,
            LeftRearSurround,
            RightRearSurround,
            LeftHeight,
            RightHeight,
            LeftTopSurround,
            RightTopSurround,
            Lfe,
        ],
        UseCase::Itu2_0A => vec![Left, Right],
        UseCase::Itu5_1_4D => vec![
            Left,
            Center,
            Right,
            LeftSurround,
            RightSurround,
            LeftTopFront,
            RightTopFront,
            LeftTopBack,
            RightTopBack,
            Lfe,
        ],
        UseCase::Itu7_1_4J => vec![
            Left,
            Center,
            Right,
            LeftSideSurround,
            RightSideSurround,
            LeftRearSurround,
            RightRearSurround,
            LeftTopFront,
            RightTopFront,
            LeftTopBack,
            RightTopBack,
            Lfe,
        ],
        UseCase::Always | UseCase::NoUseCase => Vec::new(),
    };

    ids.into_iter()
        .enumerate()
        .map(|(channel, id)| RenderSpeaker::physical(channel as i32, id))
        .collect()
}

/// Derive a render patch set from the VBAP speakers of a layout.
///
/// Every speaker triple with a non-singular basis and sufficient spanned
/// area becomes a candidate; a candidate is kept only when no other VBAP
/// speaker falls inside or on its spherical triangle. The surviving set
/// tessellates the covered sphere without interior speakers, so a source
/// on a speaker direction always solves through a patch having that
/// speaker as a vertex.
pub fn build_render_patches(speakers: &[RenderSpeaker]) -> anyhow::Result<Vec<RenderPatch>> {
    let vbap_indices: Vec<usize> = speakers
        .iter()
        .enumerate()
        .filter(|(_, s)| s.vbap)
        .map(|(i, _)| i)
        .collect();

    if vbap_indices.len() < 3 {
        anyhow::bail!(
            "need at least 3 VBAP speakers to build render patches, have {}",
            vbap_indices.len()
        );
    }

    let mut patches = Vec::new();
    for (a, &i) in vbap_indices.iter().enumerate() {
        for (b, &j) in vbap_indices.iter().enumerate().skip(a + 1) {
            for &k in vbap_indices.iter().skip(b + 1) {
                let patch = match RenderPatch::new(i, j, k, speakers) {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                // Triangle must span a reasonable area.
                let v1 = speakers[j].position.sub(&speakers[i].position);
                let v2 = speakers[k].position.sub(&speakers[i].position);
                if v1.cross(&v2).norm() < 0.1 {
                    continue;
                }

                let mut contains_other = false;
                for &m in &vbap_indices {
                    if m == i || m == j || m == k {
                        continue;
                    }
                    let g = patch.inverse.mul_vec(&speakers[m].position);
                    if g.x >= -1e-4 && g.y >= -1e-4 && g.z >= -1e-4 {
                        contains_other = true;
                        break;
                    }
                }
                if !contains_other {
                    patches.push(patch);
                }
            }
        }
    }

    if patches.is_empty() {
        anyhow::bail!("speaker layout produced no usable render patches");
    }
    Ok(patches)
}
