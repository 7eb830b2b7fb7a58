// SPDX-License-Identifier: Apache-2.0

//! Object decorrelation filter bank
//!
//! Rendered output flagged for decorrelation passes through a per-channel
//! two-level nested all-pass filter before being summed into the main
//! output. The filter internals are a fixed design; the renderer only
//! depends on the [`Decorrelator`] interface: per-channel in-place
//! processing with state that persists across frames until reset.

use crate::config::RendererConfig;

/// Maximum delay length in samples for the nested all-pass filters.
const NESTED_ALLPASS_LENGTH_MAX: usize = 155;

/// Outer-stage delay lengths, prime so channel pairs never share a
/// comb pattern. Cycled by output channel index.
const OUTER_DELAYS: [usize; 12] = [73, 97, 109, 127, 139, 151, 83, 101, 113, 131, 149, 89];
const INNER_DELAYS: [usize; 12] = [31, 37, 41, 43, 47, 53, 59, 61, 29, 23, 19, 17];

const OUTER_GAIN: f32 = 0.6;
const INNER_GAIN: f32 = 0.4;

/// Interface the frame renderers consume for the decorrelation
/// post-step.
pub trait Decorrelator: Send {
    /// Process `sample_count` samples of every channel in place. Channel
    /// order matches the renderer output configuration.
    fn decorrelate_outputs(&mut self, channels: &mut [Vec<f32>], sample_count: usize);

    /// Clear all delay-line state. Filter design is unaffected.
    fn reset(&mut self);
}

/// One all-pass stage, optionally nesting an inner stage inside its
/// delay path.
struct NestedAllpass {
    gain: f32,
    delay_length: usize,
    buffer: [f32; NESTED_ALLPASS_LENGTH_MAX],
    read_write: usize,
    inner: Option<Box<NestedAllpass>>,
}

impl NestedAllpass {
    fn new(gain: f32, delay_length: usize, inner: Option<Box<NestedAllpass>>) -> Self {
        debug_assert!(delay_length <= NESTED_ALLPASS_LENGTH_MAX);
        Self {
            gain,
            delay_length,
            buffer: [0.0; NESTED_ALLPASS_LENGTH_MAX],
            read_write: 0,
            inner,
        }
    }

    fn reset(&mut self) {
        self.buffer = [0.0; NESTED_ALLPASS_LENGTH_MAX];
        self.read_write = 0;
        if let Some(inner) = &mut self.inner {
            inner.reset();
        }
    }

    fn tick(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.read_write];
        let fed = match &mut self.inner {
            Some(inner) => inner.tick(delayed),
            None => delayed,
        };
        let output = fed - self.gain * input;
        self.buffer[self.read_write] = input + self.gain * output;
        self.read_write = (self.read_write + 1) % self.delay_length;
        output
    }

    fn process(&mut self, samples: &mut [f32]) {
        for sample in samples {
            *sample = self.tick(*sample);
        }
    }
}

/// Default decorrelator: one two-level nested all-pass per VBAP output
/// channel. Non-VBAP channels (LFE) pass through untouched.
pub struct IabDecorrelation {
    filters: Vec<Option<NestedAllpass>>,
}

impl IabDecorrelation {
    pub fn new(config: &RendererConfig) -> Self {
        let mut filters: Vec<Option<NestedAllpass>> = Vec::new();
        filters.resize_with(config.channel_count(), || None);

        for speaker in config.physical_speakers() {
            let output = match speaker.output_index {
                Some(index) => index,
                None => continue,
            };
            if !speaker.vbap {
                continue;
            }
            let pick = output % OUTER_DELAYS.len();
            let inner = NestedAllpass::new(INNER_GAIN, INNER_DELAYS[pick], None);
            filters[output] = Some(NestedAllpass::new(
                OUTER_GAIN,
                OUTER_DELAYS[pick],
                Some(Box::new(inner)),
            ));
        }

        Self { filters }
    }
}

impl Decorrelator for IabDecorrelation {
    fn decorrelate_outputs(&mut self, channels: &mut [Vec<f32>], sample_count: usize) {
        for (channel, filter) in channels.iter_mut().zip(self.filters.iter_mut()) {
            if let Some(filter) = filter {
                filter.process(&mut channel[..sample_count]);
            }
        }
    }

    fn reset(&mut self) {
        for filter in self.filters.iter_mut().flatten() {
            filter.reset();
        }
    }
}
