// SPDX-License-Identifier: Apache-2.0

//! Vector Base Amplitude Panning over the configuration's render patches
//!
//! For each virtual source the panner solves g = M^-1 * p against every
//! patch basis, keeps the patch where all three gains are non-negative
//! (within epsilon), power-normalizes and scatters into the full
//! speaker-gain vector. Extended sources accumulate per-speaker squared
//! gains over their virtual sources so the total power equals the object
//! gain squared.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{RenderPatch, RendererConfig};
use crate::geometry::Vector3;
use crate::interior::VirtualSource;
use crate::transform::CubePosition;

/// Tolerance for the non-negativity test of a patch solve.
const GAIN_EPSILON: f32 = 1e-5;

/// Bound on cached gain vectors per frame.
const MAX_CACHE_ENTRIES: usize = 4096;

/// Result of panning one source set: gains over all config speakers
/// (including virtual), plus whether the panner had to fall back to the
/// nearest patch for an out-of-gamut direction.
#[derive(Clone, Debug, PartialEq)]
pub struct PanResult {
    pub speaker_gains: Arc<Vec<f32>>,
    pub out_of_gamut: bool,
}

/// Cache key over quantized pan inputs. Positions and extent parameters
/// are 10-bit quantities in the bitstream, so quantizing to 1/1023 steps
/// never conflates distinct metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PanCacheKey {
    x: u16,
    y: u16,
    z: u16,
    aperture: u16,
    divergence: u16,
    gain: u16,
}

impl PanCacheKey {
    fn new(position: &CubePosition, aperture: f32, divergence: f32, gain: f32) -> Self {
        fn q(v: f32) -> u16 {
            (v.clamp(0.0, 1.0) * 1023.0).round() as u16
        }
        Self {
            x: q(position.x),
            y: q(position.y),
            z: q(position.z),
            aperture: q(aperture),
            divergence: q(divergence),
            // Object gains are bounded by unity in the stream's prefix code.
            gain: q(gain),
        }
    }
}

/// VBAP panner bound to one renderer configuration.
pub struct VbapPanner {
    patches: Vec<RenderPatch>,
    num_speakers: usize,
    cache: HashMap<PanCacheKey, PanResult>,
    // Scratch for squared-gain accumulation, reused across calls.
    power_scratch: Vec<f32>,
}

impl VbapPanner {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            patches: config.render_patches().to_vec(),
            num_speakers: config.total_speaker_count(),
            cache: HashMap::new(),
            power_scratch: vec![0.0; config.total_speaker_count()],
        }
    }

    pub fn num_speakers(&self) -> usize {
        self.num_speakers
    }

    /// Drop all cached results. Called at every frame boundary so the
    /// cache never outlives the metadata that produced it.
    pub fn reset_cache(&mut self) {
        self.cache.clear();
    }

    /// Look up a previously computed gain vector for identical pan
    /// metadata within the current frame.
    pub fn cached(
        &self,
        position: &CubePosition,
        aperture: f32,
        divergence: f32,
        object_gain: f32,
    ) -> Option<PanResult> {
        let key = PanCacheKey::new(position, aperture, divergence, object_gain);
        self.cache.get(&key).cloned()
    }

    /// Pan a set of weighted virtual sources at the given object gain and
    /// memoize the result under the source position's cache key.
    pub fn pan(
        &mut self,
        position: &CubePosition,
        aperture: f32,
        divergence: f32,
        sources: &[VirtualSource],
        object_gain: f32,
    ) -> PanResult {
        let key = PanCacheKey::new(position, aperture, divergence, object_gain);
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        let result = self.pan_uncached(sources, object_gain);
        if self.cache.len() < MAX_CACHE_ENTRIES {
            self.cache.insert(key, result.clone());
        }
        result
    }

    fn pan_uncached(&mut self, sources: &[VirtualSource], object_gain: f32) -> PanResult {
        for slot in self.power_scratch.iter_mut() {
            *slot = 0.0;
        }
        let mut out_of_gamut = false;

        for source in sources {
            let (patch_index, gains, fallback) = self.solve_source(&source.direction);
            out_of_gamut |= fallback;

            // Accumulate power so extended sources stay power-preserving.
            let indices = self.patches[patch_index].speaker_indices();
            for (slot, gain) in indices.iter().zip(gains.iter()) {
                self.power_scratch[*slot] += source.weight * gain * gain;
            }
        }

        let mut speaker_gains = vec![0.0f32; self.num_speakers];
        for (out, power) in speaker_gains.iter_mut().zip(self.power_scratch.iter()) {
            *out = power.sqrt() * object_gain;
        }

        PanResult {
            speaker_gains: Arc::new(speaker_gains),
            out_of_gamut,
        }
    }

    /// Solve one unit direction against the patch set. Returns the
    /// winning patch index, its unit-power gains, and whether the
    /// direction was outside every patch.
    fn solve_source(&self, direction: &Vector3) -> (usize, [f32; 3], bool) {
        let mut best: Option<(usize, [f32; 3], f32)> = None;

        for (index, patch) in self.patches.iter().enumerate() {
            let g = patch.inverse.mul_vec(direction);
            let gains = [g.x, g.y, g.z];
            // Negativity of the worst component; 0 when fully inside.
            let negativity = gains.iter().fold(0.0f32, |acc, &g| acc.max(-g));
            match &best {
                Some((_, _, best_neg)) if *best_neg <= negativity => {}
                _ => best = Some((index, gains, negativity)),
            }
        }

        // Config construction guarantees a non-empty patch list.
        let (index, mut gains, negativity) = best.expect("patch list is empty");
        let fallback = negativity > GAIN_EPSILON;
        for g in gains.iter_mut() {
            *g = g.max(0.0);
        }

        let power: f32 = gains.iter().map(|g| g * g).sum();
        if power > 0.0 {
            let norm = power.sqrt();
            for g in gains.iter_mut() {
                *g /= norm;
            }
        }

        (index, gains, fallback)
    }
}
