// SPDX-License-Identifier: Apache-2.0

//! Single-threaded IAB frame renderer
//!
//! Per frame: derive timing from the frame header, zero the outputs,
//! decode referenced audio assets once each, then walk the frame
//! sub-elements in order, routing beds (directly or as objects), bed
//! remaps and objects through VBAP, zone control and gain smoothing into
//! the output channels. Frames are independent in duration; gain history
//! and decorrelator state carry across frames.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RendererConfig;
use crate::decoder::{unpack_pcm, DlcDecoder, NoDlcDecoder};
use crate::decorr::{Decorrelator, IabDecorrelation};
use crate::error::{RenderError, RenderWarning};
use crate::frame::{
    AudioDataDlc, AudioDataId, AudioDataPcm, BedChannel, BedDefinition, BedRemap, FrameElement,
    FrameTiming, IabFrame, ObjectDefinition, ObjectSubBlock, SampleRate, MAX_FRAME_SAMPLE_COUNT,
};
use crate::gains::{ChannelGainsProcessor, EntityId};
use crate::interior::{expand_source, VirtualSource};
use crate::tables::UseCase;
use crate::vbap::VbapPanner;
use crate::zones::ObjectZone9;

/// Bed definitions may nest further bed definitions; deeper structures
/// are treated as malformed.
pub const MAX_BED_NESTING_DEPTH: usize = 4;

/// References to the audio data elements of the frame being rendered,
/// keyed by audio data ID.
pub(crate) enum AssetRef<'a> {
    Dlc(&'a AudioDataDlc),
    Pcm(&'a AudioDataPcm),
}

pub(crate) type AssetMap<'a> = HashMap<AudioDataId, AssetRef<'a>>;

/// Collect the frame's audio elements by ID.
pub(crate) fn collect_assets(frame: &IabFrame) -> AssetMap<'_> {
    let mut assets = AssetMap::new();
    for element in &frame.elements {
        match element {
            FrameElement::AudioDlc(dlc) => {
                assets.insert(dlc.audio_data_id, AssetRef::Dlc(dlc));
            }
            FrameElement::AudioPcm(pcm) => {
                assets.insert(pcm.audio_data_id, AssetRef::Pcm(pcm));
            }
            _ => {}
        }
    }
    assets
}

/// An element is activated when unconditional, tagged `Always`, or tagged
/// with the target use case.
pub(crate) fn is_activated(
    conditional: bool,
    use_case: Option<UseCase>,
    target: UseCase,
) -> bool {
    !conditional || use_case == Some(UseCase::Always) || use_case == Some(target)
}

/// Warnings produced while computing one sub-block's gain vector.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SubBlockGainFlags {
    pub out_of_gamut: bool,
    pub zone_unmatched: bool,
    pub zone_dropped_sources: u32,
}

/// Compute the per-output-channel gain vector for one resolved object
/// sub-block: snap, or extent expansion plus VBAP, then zone-9
/// reshaping. Shared between the single- and multi-threaded renderers.
pub(crate) fn compute_sub_block_gains(
    config: &RendererConfig,
    vbap: &mut VbapPanner,
    zone9: &ObjectZone9,
    resolved: &ObjectSubBlock,
    output_gains: &mut [f32],
) -> SubBlockGainFlags {
    let mut flags = SubBlockGainFlags::default();
    let gain = resolved.gain.value();

    if gain == 0.0 {
        output_gains.fill(0.0);
    } else if let Some(snapped) = find_snap_speaker(config, resolved) {
        output_gains.fill(0.0);
        output_gains[snapped] = gain;
    } else {
        let sources = expand_source(
            &resolved.position,
            resolved.spread.aperture,
            resolved.spread.divergence,
        );
        let result = vbap.pan(
            &resolved.position,
            resolved.spread.aperture,
            resolved.spread.divergence,
            &sources,
            gain,
        );
        flags.out_of_gamut = result.out_of_gamut;
        config.fold_to_outputs(&result.speaker_gains, output_gains);
    }

    if resolved.zone_gains.object_zone_control {
        let outcome = zone9.process_zone_gains(&resolved.zone_gains, output_gains);
        flags.zone_unmatched = outcome.unmatched;
        flags.zone_dropped_sources = outcome.dropped_sources;
    }
    flags
}

/// Find the output channel of the nearest snap-eligible speaker, if any
/// falls within the sub-block's tolerance on every axis. Ties go to the
/// lowest output index.
pub(crate) fn find_snap_speaker(
    config: &RendererConfig,
    sub_block: &ObjectSubBlock,
) -> Option<usize> {
    if !sub_block.snap.activated || sub_block.snap.tolerance <= 0.0 {
        return None;
    }
    let tolerance = sub_block.snap.tolerance;

    let mut best: Option<(usize, f32)> = None;
    for speaker in config.physical_speakers() {
        if !speaker.vbap {
            continue;
        }
        let output = match speaker.output_index {
            Some(index) => index,
            None => continue,
        };
        let distance = sub_block.position.chebyshev_distance(&speaker.iab_position);
        if distance <= tolerance {
            match best {
                Some((_, best_distance)) if best_distance <= distance => {}
                _ => best = Some((output, distance)),
            }
        }
    }
    best.map(|(output, _)| output)
}

/// Single-threaded ST 2098-2 renderer.
pub struct IabRenderer {
    config: Arc<RendererConfig>,
    dlc_decoder: Arc<dyn DlcDecoder>,
    vbap: VbapPanner,
    zone9: ObjectZone9,
    gains: ChannelGainsProcessor,
    decorr: Box<dyn Decorrelator>,

    num_output_channels: usize,
    target_use_case: UseCase,
    smoothing_enabled: bool,
    decorr_enabled: bool,
    render_96k_to_48k: bool,

    // Working memory, allocated at construction and reused per frame.
    frame_buffers: Vec<Vec<f32>>,
    decorr_buffers: Vec<Vec<f32>>,
    asset_buffers: Vec<Vec<f32>>,
    asset_slots: HashMap<AudioDataId, usize>,
    output_gains: Vec<f32>,
    remap_gains: Vec<f32>,

    decorr_tail_frames: u32,
    decorr_in_reset: bool,
    has_decorr_objects: bool,

    warnings: HashMap<RenderWarning, u64>,
    poisoned: bool,
}

impl IabRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self::with_dlc_decoder(config, Arc::new(NoDlcDecoder))
    }

    pub fn with_dlc_decoder(config: RendererConfig, dlc_decoder: Arc<dyn DlcDecoder>) -> Self {
        let channels = config.channel_count();
        let config = Arc::new(config);
        let vbap = VbapPanner::new(&config);
        let zone9 = ObjectZone9::new(&config);
        let decorr = Box::new(IabDecorrelation::new(&config));

        Self {
            num_output_channels: channels,
            target_use_case: config.target_use_case(),
            smoothing_enabled: config.smoothing_enabled(),
            decorr_enabled: config.iab_decorrelation_enabled(),
            render_96k_to_48k: false,
            vbap,
            zone9,
            gains: ChannelGainsProcessor::new(),
            decorr,
            dlc_decoder,
            frame_buffers: vec![vec![0.0; MAX_FRAME_SAMPLE_COUNT]; channels],
            decorr_buffers: vec![vec![0.0; MAX_FRAME_SAMPLE_COUNT]; channels],
            asset_buffers: Vec::new(),
            asset_slots: HashMap::new(),
            output_gains: vec![0.0; channels],
            remap_gains: vec![0.0; channels],
            decorr_tail_frames: 0,
            decorr_in_reset: true,
            has_decorr_objects: false,
            warnings: HashMap::new(),
            poisoned: false,
            config,
        }
    }

    /// Number of output channels filled by every rendered frame.
    pub fn output_channel_count(&self) -> usize {
        self.num_output_channels
    }

    /// Maximum samples a frame can produce over all supported frame
    /// rate / sample rate combinations.
    pub fn max_output_sample_count(&self) -> usize {
        MAX_FRAME_SAMPLE_COUNT
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Render 96 kHz frames to 48 kHz output (half-rate decode).
    pub fn set_render_96k_to_48k(&mut self, enabled: bool) {
        self.render_96k_to_48k = enabled;
    }

    /// Non-fatal warning counts accumulated since construction or the
    /// last reset.
    pub fn warnings(&self) -> &HashMap<RenderWarning, u64> {
        &self.warnings
    }

    /// Clear all cross-frame state: gain history, decorrelator delay
    /// lines, warnings, and the poisoned flag. Rendering the same frame
    /// sequence after a reset reproduces identical output.
    pub fn reset(&mut self) {
        self.gains.reset();
        self.decorr.reset();
        self.decorr_in_reset = true;
        self.decorr_tail_frames = 0;
        self.warnings.clear();
        self.poisoned = false;
    }

    /// Render one frame into the caller's output buffers.
    ///
    /// `outputs` must hold at least [`Self::output_channel_count`]
    /// buffers of at least the frame's sample count. Buffers are zeroed
    /// first, then rendered entities accumulate into them. Returns the
    /// number of samples rendered per channel. Any error leaves the
    /// instance unusable until [`Self::reset`].
    pub fn render_frame(
        &mut self,
        frame: &IabFrame,
        outputs: &mut [&mut [f32]],
    ) -> Result<usize, RenderError> {
        match self.render_frame_inner(frame, outputs) {
            Ok(samples) => Ok(samples),
            Err(err) => {
                self.poisoned = true;
                Err(err)
            }
        }
    }

    fn render_frame_inner(
        &mut self,
        frame: &IabFrame,
        outputs: &mut [&mut [f32]],
    ) -> Result<usize, RenderError> {
        if self.poisoned {
            return Err(RenderError::InstancePoisoned);
        }

        let timing = self.frame_timing(frame);
        let samples = timing.samples_per_frame;

        if outputs.len() < self.num_output_channels {
            return Err(RenderError::ChannelCountTooSmall {
                given: outputs.len(),
                needed: self.num_output_channels,
            });
        }
        for buffer in outputs[..self.num_output_channels].iter() {
            if buffer.len() < samples {
                return Err(RenderError::SampleBufferTooSmall {
                    given: buffer.len(),
                    needed: samples,
                });
            }
        }

        // DLC is not defined at fractional frame rates.
        if frame.frame_rate.is_fractional()
            && frame
                .elements
                .iter()
                .any(|e| matches!(e, FrameElement::AudioDlc(_)))
        {
            return Err(RenderError::DlcAtFractionalRate);
        }

        for buffer in self.frame_buffers.iter_mut() {
            buffer[..samples].fill(0.0);
        }
        if self.decorr_enabled {
            for buffer in self.decorr_buffers.iter_mut() {
                buffer[..samples].fill(0.0);
            }
        }
        self.asset_slots.clear();
        self.vbap.reset_cache();
        self.has_decorr_objects = false;

        let assets = collect_assets(frame);

        for element in &frame.elements {
            match element {
                FrameElement::Bed(bed) => {
                    if is_activated(bed.conditional, bed.use_case, self.target_use_case) {
                        self.render_bed(bed, 0, &assets, &timing)?;
                    }
                }
                FrameElement::Object(object) => {
                    if is_activated(object.conditional, object.use_case, self.target_use_case) {
                        self.render_object(object, &assets, &timing)?;
                    }
                }
                _ => {}
            }
        }

        self.run_decorrelation(samples);
        self.gains.end_frame();

        for (buffer, out) in self.frame_buffers.iter().zip(outputs.iter_mut()) {
            out[..samples].copy_from_slice(&buffer[..samples]);
        }

        Ok(samples)
    }

    /// Frame timing, honoring the 96k-to-48k rendering mode.
    fn frame_timing(&self, frame: &IabFrame) -> FrameTiming {
        let sample_rate = if frame.sample_rate == SampleRate::Hz96000 && self.render_96k_to_48k {
            SampleRate::Hz48000
        } else {
            frame.sample_rate
        };
        FrameTiming::new(frame.frame_rate, sample_rate)
    }

    fn record_warning(&mut self, warning: RenderWarning) {
        let count = self.warnings.entry(warning).or_insert(0);
        *count += 1;
        if *count == 1 {
            tracing::warn!(?warning, "render warning");
        } else {
            tracing::debug!(?warning, count, "render warning repeated");
        }
    }

    /// Decode the asset with this ID into a working buffer, once per
    /// frame, and return its buffer slot.
    fn ensure_asset(
        &mut self,
        id: AudioDataId,
        assets: &AssetMap<'_>,
        timing: &FrameTiming,
    ) -> Result<usize, RenderError> {
        if let Some(&slot) = self.asset_slots.get(&id) {
            return Ok(slot);
        }

        let asset = assets.get(&id).ok_or(RenderError::MissingAsset(id))?;
        let slot = self.asset_slots.len();
        if slot >= self.asset_buffers.len() {
            self.asset_buffers.push(vec![0.0; MAX_FRAME_SAMPLE_COUNT]);
        }

        let out = &mut self.asset_buffers[slot][..timing.samples_per_frame];
        match asset {
            AssetRef::Pcm(pcm) => {
                unpack_pcm(pcm, timing.frame_rate, timing.sample_rate, out).map_err(|e| {
                    RenderError::DecodeError {
                        id,
                        reason: e.to_string(),
                    }
                })?;
            }
            AssetRef::Dlc(dlc) => {
                if dlc.frame_rate != timing.frame_rate {
                    return Err(RenderError::DecodeError {
                        id,
                        reason: "element frame rate does not match the frame being rendered"
                            .to_string(),
                    });
                }
                self.dlc_decoder
                    .decode(dlc, timing.sample_rate, out)
                    .map_err(|e| RenderError::DecodeError {
                        id,
                        reason: e.to_string(),
                    })?;
            }
        }

        self.asset_slots.insert(id, slot);
        Ok(slot)
    }

    fn render_bed(
        &mut self,
        bed: &BedDefinition,
        depth: usize,
        assets: &AssetMap<'_>,
        timing: &FrameTiming,
    ) -> Result<(), RenderError> {
        if depth > MAX_BED_NESTING_DEPTH {
            return Err(RenderError::MalformedElement("bed nesting too deep"));
        }
        if bed.channels.is_empty() {
            return Err(RenderError::MalformedElement("bed has no channels"));
        }
        for (i, a) in bed.channels.iter().enumerate() {
            if bed.channels[..i].iter().any(|b| b.channel_id == a.channel_id) {
                return Err(RenderError::MalformedElement("duplicate channel in bed"));
            }
        }

        // An activated remap replaces the parent bed.
        for element in &bed.sub_elements {
            if let FrameElement::BedRemap(remap) = element {
                if remap.use_case == self.target_use_case || remap.use_case == UseCase::Always {
                    tracing::debug!(bed = bed.meta_id, remap = remap.meta_id, "remap active");
                    return self.render_bed_remap(remap, bed, assets, timing);
                }
            }
        }

        // A conditional nested bed matching the target replaces the
        // parent as well.
        for element in &bed.sub_elements {
            if let FrameElement::Bed(nested) = element {
                if nested.conditional
                    && is_activated(nested.conditional, nested.use_case, self.target_use_case)
                {
                    tracing::debug!(bed = bed.meta_id, nested = nested.meta_id, "nested bed");
                    return self.render_bed(nested, depth + 1, assets, timing);
                }
            }
        }

        for channel in &bed.channels {
            self.render_bed_channel(bed.meta_id, channel, assets, timing)?;
        }
        Ok(())
    }

    fn render_bed_channel(
        &mut self,
        bed_meta_id: u32,
        channel: &BedChannel,
        assets: &AssetMap<'_>,
        timing: &FrameTiming,
    ) -> Result<(), RenderError> {
        let slot = self.ensure_asset(channel.audio_data_id, assets, timing)?;
        let entity = EntityId::bed_channel(bed_meta_id, channel.channel_id.code());
        let gain = channel.gain.value();

        if let Some(output) = self.config.output_index_by_uri(channel.channel_id.uri()) {
            // Direct routing to the like-named physical speaker.
            self.output_gains.fill(0.0);
            self.output_gains[output] = gain;
        } else {
            // No physical speaker for this channel: render as a point
            // object at the channel's nominal position.
            let direction = channel.channel_id.vbap_position();
            let cube = channel.channel_id.iab_position();
            let sources = [VirtualSource {
                direction,
                weight: 1.0,
            }];
            let result = self.vbap.pan(&cube, 0.0, 0.0, &sources, gain);
            if result.out_of_gamut {
                self.record_warning(RenderWarning::VbapFallback);
            }
            self.config
                .fold_to_outputs(&result.speaker_gains, &mut self.output_gains);
        }

        self.gains.apply_channel_gains(
            entity,
            &self.output_gains,
            &self.asset_buffers[slot][..timing.samples_per_frame],
            &mut self.frame_buffers,
            0,
            false,
            self.smoothing_enabled,
        );
        Ok(())
    }

    fn render_object(
        &mut self,
        object: &ObjectDefinition,
        assets: &AssetMap<'_>,
        timing: &FrameTiming,
    ) -> Result<(), RenderError> {
        if object.sub_blocks.is_empty() {
            return Err(RenderError::MalformedElement("object has no sub-blocks"));
        }
        if object.sub_blocks.len() != timing.num_sub_blocks {
            return Err(RenderError::MalformedElement(
                "object sub-block count does not match frame rate",
            ));
        }
        if !object.sub_blocks[0].exists {
            return Err(RenderError::MalformedElement(
                "first sub-block of frame carries no pan info",
            ));
        }

        let slot = self.ensure_asset(object.audio_data_id, assets, timing)?;
        let entity = EntityId::object(object.meta_id);

        let mut resolved = object.sub_blocks[0];
        for (index, sub_block) in object.sub_blocks.iter().enumerate() {
            if sub_block.exists {
                resolved = *sub_block;
            }

            let flags = compute_sub_block_gains(
                &self.config,
                &mut self.vbap,
                &self.zone9,
                &resolved,
                &mut self.output_gains,
            );
            if flags.out_of_gamut {
                self.record_warning(RenderWarning::VbapFallback);
            }
            if flags.zone_unmatched {
                self.record_warning(RenderWarning::ZonePatternUnmatched);
            }
            for _ in 0..flags.zone_dropped_sources {
                self.record_warning(RenderWarning::ZoneSourceDropped);
            }

            let offset = timing.sub_block_offsets[index];
            let length = timing.sub_block_samples[index];
            let use_decorr = self.decorr_enabled && resolved.decorrelate;
            if use_decorr {
                self.has_decorr_objects = true;
            }

            let buffers = if use_decorr {
                &mut self.decorr_buffers
            } else {
                &mut self.frame_buffers
            };
            self.gains.apply_channel_gains(
                entity,
                &self.output_gains,
                &self.asset_buffers[slot][offset..offset + length],
                buffers,
                offset,
                false,
                self.smoothing_enabled,
            );
        }
        Ok(())
    }

    fn render_bed_remap(
        &mut self,
        remap: &BedRemap,
        parent: &BedDefinition,
        assets: &AssetMap<'_>,
        timing: &FrameTiming,
    ) -> Result<(), RenderError> {
        let destinations = remap.destination_channels.len();
        let sources = remap.source_channels.len();
        if destinations == 0 || sources == 0 {
            return Err(RenderError::MalformedElement("remap with empty channel set"));
        }
        if remap.sub_blocks.is_empty() {
            return Err(RenderError::MalformedElement("remap has no sub-blocks"));
        }
        if remap.sub_blocks.len() != timing.num_sub_blocks {
            return Err(RenderError::MalformedElement(
                "remap sub-block count does not match frame rate",
            ));
        }
        if !remap.sub_blocks[0].exists {
            return Err(RenderError::MalformedElement(
                "first remap sub-block carries no coefficients",
            ));
        }

        // Resolve each remap source to the parent bed channel feeding it.
        let mut source_slots = Vec::with_capacity(sources);
        for source_id in &remap.source_channels {
            let channel = parent
                .channels
                .iter()
                .find(|c| c.channel_id == *source_id)
                .ok_or(RenderError::MalformedElement(
                    "remap source missing from parent bed",
                ))?;
            source_slots.push(self.ensure_asset(channel.audio_data_id, assets, timing)?);
        }

        let mut coefficients = &remap.sub_blocks[0].coefficients;
        for (index, sub_block) in remap.sub_blocks.iter().enumerate() {
            if sub_block.exists {
                coefficients = &sub_block.coefficients;
            }
            if coefficients.len() != destinations
                || coefficients.iter().any(|row| row.len() != sources)
            {
                return Err(RenderError::MalformedElement(
                    "remap coefficient matrix dimensions mismatch",
                ));
            }

            let offset = timing.sub_block_offsets[index];
            let length = timing.sub_block_samples[index];

            for (source_index, &slot) in source_slots.iter().enumerate() {
                // Pseudo-source vector for this source: every destination
                // channel's gain vector scaled by its matrix coefficient.
                self.remap_gains.fill(0.0);
                for (dest_index, dest_id) in remap.destination_channels.iter().enumerate() {
                    let coefficient = coefficients[dest_index][source_index];
                    if coefficient == 0.0 {
                        continue;
                    }
                    if let Some(output) = self.config.output_index_by_uri(dest_id.uri()) {
                        self.remap_gains[output] += coefficient;
                    } else {
                        let direction = dest_id.vbap_position();
                        let cube = dest_id.iab_position();
                        let virtual_sources = [VirtualSource {
                            direction,
                            weight: 1.0,
                        }];
                        let result = self.vbap.pan(&cube, 0.0, 0.0, &virtual_sources, 1.0);
                        if result.out_of_gamut {
                            self.record_warning(RenderWarning::VbapFallback);
                        }
                        self.config
                            .fold_to_outputs(&result.speaker_gains, &mut self.output_gains);
                        for (accumulated, gain) in
                            self.remap_gains.iter_mut().zip(self.output_gains.iter())
                        {
                            *accumulated += coefficient * gain;
                        }
                    }
                }

                let entity = EntityId::remap_channel(remap.meta_id, source_index);
                self.gains.apply_channel_gains(
                    entity,
                    &self.remap_gains,
                    &self.asset_buffers[slot][offset..offset + length],
                    &mut self.frame_buffers,
                    offset,
                    false,
                    self.smoothing_enabled,
                );
            }
        }
        Ok(())
    }

    /// Decorrelation post-step with tail-off hysteresis: any frame with a
    /// decorrelated object arms the counter; after the last such frame
    /// the filter bank keeps draining for the configured number of
    /// frames, then resets.
    fn run_decorrelation(&mut self, samples: usize) {
        if !self.decorr_enabled {
            return;
        }
        if self.has_decorr_objects {
            self.decorr_tail_frames = self.config.decorr_tailoff_frames().max(1);
        }

        if self.decorr_tail_frames > 0 {
            self.decorr
                .decorrelate_outputs(&mut self.decorr_buffers, samples);
            for (main, processed) in self.frame_buffers.iter_mut().zip(&self.decorr_buffers) {
                for (out, sample) in main[..samples].iter_mut().zip(&processed[..samples]) {
                    *out += sample;
                }
            }
            self.decorr_in_reset = false;
            if !self.has_decorr_objects {
                self.decorr_tail_frames -= 1;
            }
        } else if !self.decorr_in_reset {
            self.decorr.reset();
            self.decorr_in_reset = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{BitDepth, FrameRate, ObjectSubBlock};
    use crate::tables::ChannelId;

    fn render(
        renderer: &mut IabRenderer,
        frame: &IabFrame,
    ) -> Result<(Vec<Vec<f32>>, usize), RenderError> {
        let channels = renderer.output_channel_count();
        let mut buffers = vec![vec![0.0f32; renderer.max_output_sample_count()]; channels];
        let mut refs: Vec<&mut [f32]> = buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
        let samples = renderer.render_frame(frame, &mut refs)?;
        Ok((buffers, samples))
    }

    fn pcm_asset(id: u32, value: f32, samples: usize) -> FrameElement {
        FrameElement::AudioPcm(AudioDataPcm {
            audio_data_id: id,
            frame_rate: FrameRate::Fps24,
            sample_rate: SampleRate::Hz48000,
            bit_depth: BitDepth::Bits24,
            data: crate::decoder::pack_pcm_samples(&vec![value; samples], BitDepth::Bits24),
        })
    }

    fn renderer_for(soundfield: &str) -> IabRenderer {
        let config = RendererConfig::for_soundfield(soundfield)
            .unwrap()
            .with_smoothing(false);
        IabRenderer::new(config)
    }

    #[test]
    fn test_empty_frame_renders_silence() {
        let mut renderer = renderer_for("5.1");
        let frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
        let (buffers, samples) = render(&mut renderer, &frame).unwrap();
        assert_eq!(samples, 2000);
        for buffer in &buffers {
            assert!(buffer[..2000].iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_bad_channel_count_is_fatal() {
        let mut renderer = renderer_for("5.1");
        let frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
        let mut short = vec![vec![0.0f32; 4004]; 2];
        let mut refs: Vec<&mut [f32]> = short.iter_mut().map(|b| b.as_mut_slice()).collect();
        assert!(matches!(
            renderer.render_frame(&frame, &mut refs),
            Err(RenderError::ChannelCountTooSmall { given: 2, needed: 6 })
        ));
        // Instance is poisoned afterwards.
        assert!(matches!(
            render(&mut renderer, &frame),
            Err(RenderError::InstancePoisoned)
        ));
        renderer.reset();
        assert!(render(&mut renderer, &frame).is_ok());
    }

    #[test]
    fn test_small_sample_buffer_is_fatal() {
        let mut renderer = renderer_for("5.1");
        let frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
        let mut short = vec![vec![0.0f32; 100]; 6];
        let mut refs: Vec<&mut [f32]> = short.iter_mut().map(|b| b.as_mut_slice()).collect();
        assert!(matches!(
            renderer.render_frame(&frame, &mut refs),
            Err(RenderError::SampleBufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_missing_asset_is_fatal() {
        let mut renderer = renderer_for("5.1");
        let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
        let mut object = ObjectDefinition::new(1, 99);
        object.sub_blocks = vec![ObjectSubBlock::default(); 8];
        frame.elements.push(FrameElement::Object(object));
        assert!(matches!(
            render(&mut renderer, &frame),
            Err(RenderError::MissingAsset(99))
        ));
    }

    #[test]
    fn test_bed_with_no_channels_is_fatal() {
        let mut renderer = renderer_for("5.1");
        let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
        frame
            .elements
            .push(FrameElement::Bed(BedDefinition::new(1, Vec::new())));
        assert!(matches!(
            render(&mut renderer, &frame),
            Err(RenderError::MalformedElement("bed has no channels"))
        ));
    }

    #[test]
    fn test_duplicate_bed_channel_is_fatal() {
        let mut renderer = renderer_for("5.1");
        let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
        frame.elements.push(pcm_asset(1, 0.1, 2000));
        let channels = vec![
            BedChannel::new(ChannelId::Left, 1),
            BedChannel::new(ChannelId::Left, 1),
        ];
        frame
            .elements
            .push(FrameElement::Bed(BedDefinition::new(1, channels)));
        assert!(matches!(
            render(&mut renderer, &frame),
            Err(RenderError::MalformedElement("duplicate channel in bed"))
        ));
    }

    #[test]
    fn test_first_subblock_must_exist() {
        let mut renderer = renderer_for("5.1");
        let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
        frame.elements.push(pcm_asset(1, 0.1, 2000));
        let mut object = ObjectDefinition::new(1, 1);
        object.sub_blocks = vec![ObjectSubBlock::carried_forward(); 8];
        frame.elements.push(FrameElement::Object(object));
        assert!(matches!(
            render(&mut renderer, &frame),
            Err(RenderError::MalformedElement(
                "first sub-block of frame carries no pan info"
            ))
        ));
    }

    #[test]
    fn test_dlc_at_fractional_rate_rejected() {
        let mut renderer = renderer_for("5.1");
        let mut frame = IabFrame::new(FrameRate::Fps23_976, SampleRate::Hz48000);
        frame.elements.push(FrameElement::AudioDlc(AudioDataDlc {
            audio_data_id: 1,
            frame_rate: FrameRate::Fps23_976,
            sample_rate: SampleRate::Hz48000,
            data: vec![0u8; 64],
        }));
        assert_eq!(
            render(&mut renderer, &frame).unwrap_err(),
            RenderError::DlcAtFractionalRate
        );
    }

    #[test]
    fn test_conditional_object_skipped_on_mismatch() {
        let mut renderer = renderer_for("5.1");
        let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
        frame.elements.push(pcm_asset(1, 1.0, 2000));
        let mut object = ObjectDefinition::new(1, 1);
        object.conditional = true;
        object.use_case = Some(UseCase::Surround7_1Ds);
        object.sub_blocks = vec![ObjectSubBlock::default(); 8];
        frame.elements.push(FrameElement::Object(object));

        let (buffers, _) = render(&mut renderer, &frame).unwrap();
        for buffer in &buffers {
            assert!(buffer[..2000].iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_conditional_always_renders() {
        let mut renderer = renderer_for("5.1");
        let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
        frame.elements.push(pcm_asset(1, 1.0, 2000));
        let mut object = ObjectDefinition::new(1, 1);
        object.conditional = true;
        object.use_case = Some(UseCase::Always);
        object.sub_blocks = vec![ObjectSubBlock::default(); 8];
        frame.elements.push(FrameElement::Object(object));

        let (buffers, _) = render(&mut renderer, &frame).unwrap();
        let total: f32 = buffers.iter().flat_map(|b| b[..2000].iter()).sum();
        assert!(total > 0.0);
    }

    #[test]
    fn test_96k_frame_renders_96k_samples() {
        let mut renderer = renderer_for("5.1");
        let frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz96000);
        let (_, samples) = render(&mut renderer, &frame).unwrap();
        assert_eq!(samples, 4000);

        renderer.set_render_96k_to_48k(true);
        let (_, samples) = render(&mut renderer, &frame).unwrap();
        assert_eq!(samples, 2000);
    }

    #[test]
    fn test_sub_block_count_mismatch_rejected() {
        let mut renderer = renderer_for("5.1");
        let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
        frame.elements.push(pcm_asset(1, 0.1, 2000));
        let mut object = ObjectDefinition::new(1, 1);
        // 24 fps frames carry 8 sub-blocks, not 4.
        object.sub_blocks = vec![ObjectSubBlock::default(); 4];
        frame.elements.push(FrameElement::Object(object));
        assert!(matches!(
            render(&mut renderer, &frame),
            Err(RenderError::MalformedElement(
                "object sub-block count does not match frame rate"
            ))
        ));
    }
}
