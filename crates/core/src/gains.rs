// SPDX-License-Identifier: Apache-2.0

//! Channel gain application with cross-frame smoothing
//!
//! Gains ramp linearly from the entity's end-of-previous-frame gains to
//! the current targets over the segment's sample count, so frame and
//! sub-block boundaries stay free of zipper artifacts. History is keyed
//! by entity ID and survives exactly as long as the entity keeps being
//! rendered; entries untouched during a frame are dropped at the frame
//! boundary.

use std::collections::HashMap;

/// Identifies a smoothed entity across frames: an object, a bed channel,
/// or a remap source channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityId(u64);

impl EntityId {
    const BED_CHANNEL_TAG: u64 = 1 << 62;
    const REMAP_CHANNEL_TAG: u64 = 1 << 63;

    pub fn object(meta_id: u32) -> Self {
        Self(meta_id as u64)
    }

    /// Surrogate for a bed channel: parent bed meta ID plus channel code.
    pub fn bed_channel(bed_meta_id: u32, channel_code: u32) -> Self {
        Self(Self::BED_CHANNEL_TAG | ((bed_meta_id as u64) << 16) | channel_code as u64)
    }

    /// Surrogate for one source channel of a bed remap.
    pub fn remap_channel(remap_meta_id: u32, source_index: usize) -> Self {
        Self(Self::REMAP_CHANNEL_TAG | ((remap_meta_id as u64) << 16) | source_index as u64)
    }
}

/// Per-entity gain vectors left by the previous frame's smoothing.
pub type GainHistory = HashMap<EntityId, Vec<f32>>;

/// Apply one channel's gain segment: linear ramp from `start` to
/// `target` over the segment when smoothing, uniform `target` otherwise.
/// `initialize` overwrites instead of accumulating.
pub(crate) fn apply_segment(
    segment: &mut [f32],
    input: &[f32],
    start: f32,
    target: f32,
    initialize: bool,
    smooth: bool,
) {
    debug_assert_eq!(segment.len(), input.len());
    if smooth && (start - target).abs() > f32::EPSILON {
        let step = (target - start) / input.len() as f32;
        let mut gain = start;
        for (out, sample) in segment.iter_mut().zip(input) {
            gain += step;
            if initialize {
                *out = sample * gain;
            } else {
                *out += sample * gain;
            }
        }
    } else {
        // Identical endpoints reduce to uniform application.
        for (out, sample) in segment.iter_mut().zip(input) {
            if initialize {
                *out = sample * target;
            } else {
                *out += sample * target;
            }
        }
    }
}

/// Applies per-channel gains to mono samples, accumulating into output
/// buffers, with optional linear smoothing from the entity's history.
pub struct ChannelGainsProcessor {
    history: GainHistory,
    touched: HashMap<EntityId, bool>,
}

impl Default for ChannelGainsProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelGainsProcessor {
    pub fn new() -> Self {
        Self {
            history: HashMap::new(),
            touched: HashMap::new(),
        }
    }

    /// Start gains for an entity: the previous frame's end gains, or
    /// zeros for an entity appearing for the first time.
    pub fn start_gains(&self, entity: EntityId, channels: usize) -> Vec<f32> {
        self.history
            .get(&entity)
            .cloned()
            .unwrap_or_else(|| vec![0.0; channels])
    }

    /// Apply `target_gains` to `input` over all output channels,
    /// writing the segment starting at `offset` in each channel buffer.
    ///
    /// With smoothing, channel `c` at sample `k` of `n` receives
    /// `input[k] * (start[c] + (target[c] - start[c]) * (k+1)/n)`;
    /// without, the target gain applies uniformly. `initialize` selects
    /// overwrite instead of accumulate for the first write into a
    /// segment. The target gains become the entity's history for the
    /// next segment.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_channel_gains(
        &mut self,
        entity: EntityId,
        target_gains: &[f32],
        input: &[f32],
        outputs: &mut [Vec<f32>],
        offset: usize,
        initialize: bool,
        smooth: bool,
    ) {
        debug_assert_eq!(target_gains.len(), outputs.len());
        let start_gains = self.start_gains(entity, target_gains.len());

        let n = input.len();
        for (channel, output) in outputs.iter_mut().enumerate() {
            apply_segment(
                &mut output[offset..offset + n],
                input,
                start_gains[channel],
                target_gains[channel],
                initialize,
                smooth,
            );
        }

        self.set_history(entity, target_gains);
    }

    /// Record end gains for an entity without applying audio. Used when a
    /// segment renders silence but the entity stays live.
    pub fn set_history(&mut self, entity: EntityId, end_gains: &[f32]) {
        match self.history.get_mut(&entity) {
            Some(slot) => {
                slot.clear();
                slot.extend_from_slice(end_gains);
            }
            None => {
                self.history.insert(entity, end_gains.to_vec());
            }
        }
        self.touched.insert(entity, true);
    }

    /// Drop history for entities absent from the frame just rendered and
    /// reset touch tracking for the next frame.
    pub fn end_frame(&mut self) {
        let touched = &self.touched;
        self.history.retain(|entity, _| touched.contains_key(entity));
        self.touched.clear();
    }

    /// Forget all history, as on renderer reset.
    pub fn reset(&mut self) {
        self.history.clear();
        self.touched.clear();
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(
        proc_: &mut ChannelGainsProcessor,
        entity: EntityId,
        targets: &[f32],
        input: &[f32],
        buffers: &mut [Vec<f32>],
        smooth: bool,
    ) {
        proc_.apply_channel_gains(entity, targets, input, buffers, 0, false, smooth);
    }

    #[test]
    fn test_uniform_application() {
        let mut proc_ = ChannelGainsProcessor::new();
        let input = vec![1.0f32; 8];
        let mut buffers = vec![vec![0.0f32; 8]; 2];
        apply(
            &mut proc_,
            EntityId::object(1),
            &[0.5, 0.0],
            &input,
            &mut buffers,
            false,
        );
        assert!(buffers[0].iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert!(buffers[1].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_ramp_from_zero() {
        let mut proc_ = ChannelGainsProcessor::new();
        let input = vec![1.0f32; 4];
        let mut buffers = vec![vec![0.0f32; 4]];
        apply(
            &mut proc_,
            EntityId::object(1),
            &[1.0],
            &input,
            &mut buffers,
            true,
        );
        // (k+1)/n for k = 0..4
        let expected = [0.25, 0.5, 0.75, 1.0];
        for (got, want) in buffers[0].iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{got} vs {want}");
        }
    }

    #[test]
    fn test_ramp_continuous_across_segments() {
        let mut proc_ = ChannelGainsProcessor::new();
        let entity = EntityId::object(7);
        let input = vec![1.0f32; 10];
        let mut buffers = vec![vec![0.0f32; 10]];
        apply(&mut proc_, entity, &[0.8], &input, &mut buffers, true);
        assert!((buffers[0][9] - 0.8).abs() < 1e-6);

        // Next segment starts exactly at the previous target.
        let start = proc_.start_gains(entity, 1);
        assert!((start[0] - 0.8).abs() < 1e-6);

        let mut next = vec![vec![0.0f32; 10]];
        apply(&mut proc_, entity, &[0.8], &input, &mut next, true);
        // Equal endpoints: numerically identical to uniform application.
        assert!(next[0].iter().all(|&s| (s - 0.8).abs() < 1e-6));
    }

    #[test]
    fn test_zero_input_zero_output() {
        let mut proc_ = ChannelGainsProcessor::new();
        let input = vec![0.0f32; 16];
        let mut buffers = vec![vec![0.0f32; 16]];
        apply(
            &mut proc_,
            EntityId::object(1),
            &[1.0],
            &input,
            &mut buffers,
            true,
        );
        assert!(buffers[0].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_accumulate_vs_initialize() {
        let mut proc_ = ChannelGainsProcessor::new();
        let input = vec![1.0f32; 4];
        let mut buffer = vec![vec![1.0f32; 4]];

        proc_.apply_channel_gains(EntityId::object(1), &[0.5], &input, &mut buffer, 0, false, false);
        assert!(buffer[0].iter().all(|&s| (s - 1.5).abs() < 1e-6));

        proc_.apply_channel_gains(EntityId::object(1), &[0.5], &input, &mut buffer, 0, true, false);
        assert!(buffer[0].iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_history_garbage_collection() {
        let mut proc_ = ChannelGainsProcessor::new();
        proc_.set_history(EntityId::object(1), &[1.0]);
        proc_.set_history(EntityId::object(2), &[1.0]);
        proc_.end_frame();
        assert_eq!(proc_.history_len(), 2);

        // Only entity 1 appears in the next frame.
        proc_.set_history(EntityId::object(1), &[0.5]);
        proc_.end_frame();
        assert_eq!(proc_.history_len(), 1);
        assert_eq!(proc_.start_gains(EntityId::object(2), 1), vec![0.0]);
        assert_eq!(proc_.start_gains(EntityId::object(1), 1), vec![0.5]);
    }

    #[test]
    fn test_entity_id_kinds_disjoint() {
        let object = EntityId::object(5);
        let bed = EntityId::bed_channel(5, 0);
        let remap = EntityId::remap_channel(5, 0);
        assert_ne!(object, bed);
        assert_ne!(object, remap);
        assert_ne!(bed, remap);
    }
}
