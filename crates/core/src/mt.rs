// SPDX-License-Identifier: Apache-2.0

//! Multi-threaded IAB frame renderer
//!
//! Same contract as the single-threaded renderer, with frame work spread
//! over a worker pool. Each frame runs in two phases: every referenced
//! audio asset is decoded first (workers drain the decode jobs, the main
//! thread waits on a completion counter), then one render job per
//! top-level bed or object goes out. Workers accumulate into the shared
//! output block under per-channel mutexes, and gain history sits behind
//! a single mutex, read at the start and written at the end of each
//! entity's render. Accumulation order into a channel is not
//! deterministic across workers; a pool size of one restores determinism.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crossbeam_channel::{Receiver, Sender};

use crate::config::RendererConfig;
use crate::decoder::{unpack_pcm, DlcDecoder, NoDlcDecoder};
use crate::decorr::{Decorrelator, IabDecorrelation};
use crate::error::{ConfigError, RenderError, RenderWarning};
use crate::frame::{
    AudioDataId, BedChannel, BedDefinition, BedRemap, FrameElement, FrameTiming, IabFrame,
    ObjectDefinition, SampleRate, MAX_FRAME_SAMPLE_COUNT,
};
use crate::gains::{apply_segment, EntityId};
use crate::interior::VirtualSource;
use crate::render::{
    collect_assets, compute_sub_block_gains, is_activated, AssetRef, SubBlockGainFlags,
    MAX_BED_NESTING_DEPTH,
};
use crate::tables::UseCase;
use crate::vbap::VbapPanner;
use crate::zones::ObjectZone9;

/// Supported worker pool sizes.
pub const MIN_THREAD_POOL_SIZE: u32 = 1;
pub const MAX_THREAD_POOL_SIZE: u32 = 8;

/// Lock helper that survives a poisoned mutex; a panicked worker must
/// not wedge the whole renderer.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One job in the per-frame queue.
enum RenderJob<'a> {
    Decode {
        seq: usize,
        slot: usize,
        asset: &'a AssetRef<'a>,
        id: AudioDataId,
    },
    Object {
        seq: usize,
        object: &'a ObjectDefinition,
    },
    Bed {
        seq: usize,
        bed: &'a BedDefinition,
    },
}

/// Completion tracking for one phase of the job queue.
struct DoneState {
    remaining: usize,
    /// First error in job insertion order.
    first_error: Option<(usize, RenderError)>,
}

/// Per-worker processing engines, replicated so workers never share
/// mutable panning or zone state.
struct WorkerEngine {
    vbap: VbapPanner,
    zone9: ObjectZone9,
    output_gains: Vec<f32>,
    remap_gains: Vec<f32>,
    prev_gains: Vec<f32>,
    sample_scratch: Vec<f32>,
}

impl WorkerEngine {
    fn new(config: &RendererConfig) -> Self {
        let channels = config.channel_count();
        Self {
            vbap: VbapPanner::new(config),
            zone9: ObjectZone9::new(config),
            output_gains: vec![0.0; channels],
            remap_gains: vec![0.0; channels],
            prev_gains: vec![0.0; channels],
            sample_scratch: vec![0.0; MAX_FRAME_SAMPLE_COUNT],
        }
    }
}

/// Cross-frame gain history shared by all workers.
#[derive(Default)]
struct SharedGainHistory {
    map: HashMap<EntityId, Vec<f32>>,
    touched: HashSet<EntityId>,
}

impl SharedGainHistory {
    fn start_gains(&self, entity: EntityId, channels: usize) -> Vec<f32> {
        self.map
            .get(&entity)
            .cloned()
            .unwrap_or_else(|| vec![0.0; channels])
    }

    fn store(&mut self, entity: EntityId, end_gains: &[f32]) {
        self.map.insert(entity, end_gains.to_vec());
        self.touched.insert(entity);
    }

    fn end_frame(&mut self) {
        let touched = std::mem::take(&mut self.touched);
        self.map.retain(|entity, _| touched.contains(entity));
    }

    fn reset(&mut self) {
        self.map.clear();
        self.touched.clear();
    }
}

/// Everything a worker needs for the frame being rendered.
struct FrameShared<'a> {
    config: &'a RendererConfig,
    dlc_decoder: &'a dyn DlcDecoder,
    timing: FrameTiming,
    target_use_case: UseCase,
    smoothing: bool,
    decorr_enabled: bool,

    asset_slots: &'a HashMap<AudioDataId, usize>,
    asset_buffers: &'a [Mutex<Vec<f32>>],
    outputs: &'a [Mutex<Vec<f32>>],
    decorr_outputs: &'a [Mutex<Vec<f32>>],
    history: &'a Mutex<SharedGainHistory>,
    warnings: &'a Mutex<HashMap<RenderWarning, u64>>,
    has_decorr_objects: &'a AtomicBool,
    done: &'a (Mutex<DoneState>, Condvar),
}

impl FrameShared<'_> {
    fn record_warning(&self, warning: RenderWarning) {
        let mut warnings = lock(self.warnings);
        let count = warnings.entry(warning).or_insert(0);
        *count += 1;
        if *count == 1 {
            tracing::warn!(?warning, "render warning");
        }
    }

    fn record_flags(&self, flags: &SubBlockGainFlags) {
        if flags.out_of_gamut {
            self.record_warning(RenderWarning::VbapFallback);
        }
        if flags.zone_unmatched {
            self.record_warning(RenderWarning::ZonePatternUnmatched);
        }
        for _ in 0..flags.zone_dropped_sources {
            self.record_warning(RenderWarning::ZoneSourceDropped);
        }
    }

    /// Accumulate one gain segment into the shared output block, taking
    /// only the per-channel mutex being written.
    fn accumulate(
        &self,
        to_decorr: bool,
        start_gains: &[f32],
        target_gains: &[f32],
        input: &[f32],
        offset: usize,
        smooth: bool,
    ) {
        let channel_locks = if to_decorr {
            self.decorr_outputs
        } else {
            self.outputs
        };
        for (channel, channel_lock) in channel_locks.iter().enumerate() {
            let mut buffer = lock(channel_lock);
            apply_segment(
                &mut buffer[offset..offset + input.len()],
                input,
                start_gains[channel],
                target_gains[channel],
                false,
                smooth,
            );
        }
    }

    /// Copy an asset's decoded samples into the worker's scratch buffer.
    fn load_asset(
        &self,
        id: AudioDataId,
        scratch: &mut [f32],
    ) -> Result<(), RenderError> {
        let slot = *self
            .asset_slots
            .get(&id)
            .ok_or(RenderError::MissingAsset(id))?;
        let samples = self.timing.samples_per_frame;
        let buffer = lock(&self.asset_buffers[slot]);
        scratch[..samples].copy_from_slice(&buffer[..samples]);
        Ok(())
    }
}

/// Multi-threaded ST 2098-2 renderer.
pub struct IabRendererMt {
    config: Arc<RendererConfig>,
    dlc_decoder: Arc<dyn DlcDecoder>,
    thread_pool_size: usize,
    engines: Vec<WorkerEngine>,

    num_output_channels: usize,
    target_use_case: UseCase,
    smoothing_enabled: bool,
    decorr_enabled: bool,
    render_96k_to_48k: bool,

    output_buffers: Vec<Mutex<Vec<f32>>>,
    decorr_buffers: Vec<Mutex<Vec<f32>>>,
    asset_buffers: Vec<Mutex<Vec<f32>>>,
    gain_history: Mutex<SharedGainHistory>,
    warnings: Mutex<HashMap<RenderWarning, u64>>,

    decorr: Box<dyn Decorrelator>,
    decorr_tail_frames: u32,
    decorr_in_reset: bool,

    poisoned: bool,
}

impl IabRendererMt {
    pub fn new(config: RendererConfig, thread_pool_size: u32) -> Result<Self, ConfigError> {
        Self::with_dlc_decoder(config, thread_pool_size, Arc::new(NoDlcDecoder))
    }

    pub fn with_dlc_decoder(
        config: RendererConfig,
        thread_pool_size: u32,
        dlc_decoder: Arc<dyn DlcDecoder>,
    ) -> Result<Self, ConfigError> {
        if !(MIN_THREAD_POOL_SIZE..=MAX_THREAD_POOL_SIZE).contains(&thread_pool_size) {
            return Err(ConfigError::BadThreadPoolSize(thread_pool_size));
        }
        // Never run more workers than the host offers cores.
        let workers = (thread_pool_size as usize).min(available_cores());

        let channels = config.channel_count();
        let config = Arc::new(config);
        let engines = (0..workers).map(|_| WorkerEngine::new(&config)).collect();
        let decorr = Box::new(IabDecorrelation::new(&config));

        let make_block = |count: usize| -> Vec<Mutex<Vec<f32>>> {
            (0..count)
                .map(|_| Mutex::new(vec![0.0; MAX_FRAME_SAMPLE_COUNT]))
                .collect()
        };

        Ok(Self {
            num_output_channels: channels,
            target_use_case: config.target_use_case(),
            smoothing_enabled: config.smoothing_enabled(),
            decorr_enabled: config.iab_decorrelation_enabled(),
            render_96k_to_48k: false,
            thread_pool_size: workers,
            engines,
            output_buffers: make_block(channels),
            decorr_buffers: make_block(channels),
            asset_buffers: Vec::new(),
            gain_history: Mutex::new(SharedGainHistory::default()),
            warnings: Mutex::new(HashMap::new()),
            decorr,
            decorr_tail_frames: 0,
            decorr_in_reset: true,
            poisoned: false,
            dlc_decoder,
            config,
        })
    }

    pub fn output_channel_count(&self) -> usize {
        self.num_output_channels
    }

    pub fn max_output_sample_count(&self) -> usize {
        MAX_FRAME_SAMPLE_COUNT
    }

    pub fn thread_pool_size(&self) -> usize {
        self.thread_pool_size
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn set_render_96k_to_48k(&mut self, enabled: bool) {
        self.render_96k_to_48k = enabled;
    }

    pub fn warnings(&self) -> HashMap<RenderWarning, u64> {
        lock(&self.warnings).clone()
    }

    pub fn reset(&mut self) {
        lock(&self.gain_history).reset();
        self.decorr.reset();
        self.decorr_in_reset = true;
        self.decorr_tail_frames = 0;
        lock(&self.warnings).clear();
        self.poisoned = false;
    }

    /// Render one frame into the caller's output buffers. Same contract
    /// as the single-threaded renderer.
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

        let sample_rate = if frame.sample_rate == SampleRate::Hz96000 && self.render_96k_to_48k {
            SampleRate::Hz48000
        } else {
            frame.sample_rate
        };
        let timing = FrameTiming::new(frame.frame_rate, sample_rate);
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
        if frame.frame_rate.is_fractional()
            && frame
                .elements
                .iter()
                .any(|e| matches!(e, FrameElement::AudioDlc(_)))
        {
            return Err(RenderError::DlcAtFractionalRate);
        }

        let assets = collect_assets(frame);

        // Assign one decode buffer slot per referenced audio data ID.
        let mut asset_slots: HashMap<AudioDataId, usize> = HashMap::new();
        for (&id, _) in assets.iter() {
            let slot = asset_slots.len();
            asset_slots.insert(id, slot);
        }
        while self.asset_buffers.len() < asset_slots.len() {
            self.asset_buffers
                .push(Mutex::new(vec![0.0; MAX_FRAME_SAMPLE_COUNT]));
        }

        for buffer in self.output_buffers.iter_mut() {
            buffer.get_mut().unwrap_or_else(|p| p.into_inner())[..samples].fill(0.0);
        }
        if self.decorr_enabled {
            for buffer in self.decorr_buffers.iter_mut() {
                buffer.get_mut().unwrap_or_else(|p| p.into_inner())[..samples].fill(0.0);
            }
        }
        for engine in self.engines.iter_mut() {
            engine.vbap.reset_cache();
        }

        let has_decorr_objects = AtomicBool::new(false);
        let done: (Mutex<DoneState>, Condvar) = (
            Mutex::new(DoneState {
                remaining: 0,
                first_error: None,
            }),
            Condvar::new(),
        );

        let shared = FrameShared {
            config: self.config.as_ref(),
            dlc_decoder: self.dlc_decoder.as_ref(),
            timing,
            target_use_case: self.target_use_case,
            smoothing: self.smoothing_enabled,
            decorr_enabled: self.decorr_enabled,
            asset_slots: &asset_slots,
            asset_buffers: &self.asset_buffers,
            outputs: &self.output_buffers,
            decorr_outputs: &self.decorr_buffers,
            history: &self.gain_history,
            warnings: &self.warnings,
            has_decorr_objects: &has_decorr_objects,
            done: &done,
        };

        let engines = &mut self.engines;
        let target_use_case = self.target_use_case;
        let (job_tx, job_rx): (Sender<RenderJob<'_>>, Receiver<RenderJob<'_>>) =
            crossbeam_channel::unbounded();

        std::thread::scope(|scope| {
            for engine in engines.iter_mut() {
                let rx = job_rx.clone();
                let shared = &shared;
                scope.spawn(move || worker_loop(engine, rx, shared));
            }
            drop(job_rx);

            let mut seq = 0usize;

            // Phase 1: decode every referenced asset.
            let decode_jobs: Vec<RenderJob<'_>> = assets
                .iter()
                .map(|(&id, asset)| {
                    let job = RenderJob::Decode {
                        seq,
                        slot: asset_slots[&id],
                        asset,
                        id,
                    };
                    seq += 1;
                    job
                })
                .collect();
            dispatch_jobs(&job_tx, decode_jobs, &done);
            wait_for_drain(&done);

            if lock(&done.0).first_error.is_none() {
                // Phase 2: one render job per activated top-level element.
                let mut render_jobs = Vec::new();
                for element in &frame.elements {
                    match element {
                        FrameElement::Bed(bed)
                            if is_activated(bed.conditional, bed.use_case, target_use_case) =>
                        {
                            render_jobs.push(RenderJob::Bed { seq, bed });
                            seq += 1;
                        }
                        FrameElement::Object(object)
                            if is_activated(
                                object.conditional,
                                object.use_case,
                                target_use_case,
                            ) =>
                        {
                            render_jobs.push(RenderJob::Object { seq, object });
                            seq += 1;
                        }
                        _ => {}
                    }
                }
                dispatch_jobs(&job_tx, render_jobs, &done);
                wait_for_drain(&done);
            }

            // Closing the channel sends every worker home.
            drop(job_tx);
        });

        if let Some((_, error)) = lock(&done.0).first_error.take() {
            return Err(error);
        }

        self.run_decorrelation(samples, has_decorr_objects.load(Ordering::Relaxed));
        lock(&self.gain_history).end_frame();

        for (buffer, out) in self.output_buffers.iter_mut().zip(outputs.iter_mut()) {
            let rendered = buffer.get_mut().unwrap_or_else(|p| p.into_inner());
            out[..samples].copy_from_slice(&rendered[..samples]);
        }

        Ok(samples)
    }

    fn run_decorrelation(&mut self, samples: usize, has_decorr_objects: bool) {
        if !self.decorr_enabled {
            return;
        }
        if has_decorr_objects {
            self.decorr_tail_frames = self.config.decorr_tailoff_frames().max(1);
        }

        if self.decorr_tail_frames > 0 {
            // Workers have drained; take the buffers without locking.
            let mut decorr_channels: Vec<Vec<f32>> = self
                .decorr_buffers
                .iter_mut()
                .map(|b| std::mem::take(b.get_mut().unwrap_or_else(|p| p.into_inner())))
                .collect();
            self.decorr.decorrelate_outputs(&mut decorr_channels, samples);
            for (main, processed) in self.output_buffers.iter_mut().zip(&decorr_channels) {
                let buffer = main.get_mut().unwrap_or_else(|p| p.into_inner());
                for (out, sample) in buffer[..samples].iter_mut().zip(&processed[..samples]) {
                    *out += sample;
                }
            }
            for (slot, channel) in self.decorr_buffers.iter_mut().zip(decorr_channels) {
                *slot.get_mut().unwrap_or_else(|p| p.into_inner()) = channel;
            }
            self.decorr_in_reset = false;
            if !has_decorr_objects {
                self.decorr_tail_frames -= 1;
            }
        } else if !self.decorr_in_reset {
            self.decorr.reset();
            self.decorr_in_reset = true;
        }
    }
}

/// Number of cores on the host, with a sane floor.
fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn dispatch_jobs<'a>(
    job_tx: &Sender<RenderJob<'a>>,
    jobs: Vec<RenderJob<'a>>,
    done: &(Mutex<DoneState>, Condvar),
) {
    lock(&done.0).remaining += jobs.len();
    for job in jobs {
        // Workers only disappear when the channel closes, which happens
        // after both phases; send cannot fail here.
        if job_tx.send(job).is_err() {
            lock(&done.0).remaining -= 1;
        }
    }
}

fn wait_for_drain(done: &(Mutex<DoneState>, Condvar)) {
    let (mutex, condvar) = done;
    let mut state = lock(mutex);
    while state.remaining > 0 {
        state = condvar
            .wait(state)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }
}

fn worker_loop(engine: &mut WorkerEngine, jobs: Receiver<RenderJob<'_>>, shared: &FrameShared<'_>) {
    while let Ok(job) = jobs.recv() {
        let (seq, result) = match job {
            RenderJob::Decode {
                seq,
                slot,
                asset,
                id,
            } => (seq, decode_asset_job(shared, slot, asset, id)),
            RenderJob::Object { seq, object } => (seq, render_object_job(engine, shared, object)),
            RenderJob::Bed { seq, bed } => (seq, render_bed_job(engine, shared, bed, 0)),
        };

        let (mutex, condvar) = shared.done;
        let mut state = lock(mutex);
        state.remaining -= 1;
        if let Err(error) = result {
            match &state.first_error {
                Some((first_seq, _)) if *first_seq <= seq => {}
                _ => state.first_error = Some((seq, error)),
            }
        }
        if state.remaining == 0 {
            condvar.notify_all();
        }
    }
}

fn decode_asset_job(
    shared: &FrameShared<'_>,
    slot: usize,
    asset: &AssetRef<'_>,
    id: AudioDataId,
) -> Result<(), RenderError> {
    let samples = shared.timing.samples_per_frame;
    let mut buffer = lock(&shared.asset_buffers[slot]);
    let out = &mut buffer[..samples];
    match asset {
        AssetRef::Pcm(pcm) => unpack_pcm(pcm, shared.timing.frame_rate, shared.timing.sample_rate, out)
            .map_err(|e| RenderError::DecodeError {
                id,
                reason: e.to_string(),
            }),
        AssetRef::Dlc(dlc) => {
            if dlc.frame_rate != shared.timing.frame_rate {
                return Err(RenderError::DecodeError {
                    id,
                    reason: "element frame rate does not match the frame being rendered"
                        .to_string(),
                });
            }
            shared
                .dlc_decoder
                .decode(dlc, shared.timing.sample_rate, out)
                .map_err(|e| RenderError::DecodeError {
                    id,
                    reason: e.to_string(),
                })
        }
    }
}

fn render_object_job(
    engine: &mut WorkerEngine,
    shared: &FrameShared<'_>,
    object: &ObjectDefinition,
) -> Result<(), RenderError> {
    let timing = &shared.timing;
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

    shared.load_asset(object.audio_data_id, &mut engine.sample_scratch)?;
    let entity = EntityId::object(object.meta_id);

    // One worker owns this entity for the frame: fetch the start gains
    // once, carry them locally across sub-blocks, store the end gains
    // when done.
    engine.prev_gains.clear();
    let start = lock(shared.history).start_gains(entity, shared.config.channel_count());
    engine.prev_gains.extend_from_slice(&start);

    let mut resolved = object.sub_blocks[0];
    for (index, sub_block) in object.sub_blocks.iter().enumerate() {
        if sub_block.exists {
            resolved = *sub_block;
        }

        let flags = compute_sub_block_gains(
            shared.config,
            &mut engine.vbap,
            &engine.zone9,
            &resolved,
            &mut engine.output_gains,
        );
        shared.record_flags(&flags);

        let offset = timing.sub_block_offsets[index];
        let length = timing.sub_block_samples[index];
        let use_decorr = shared.decorr_enabled && resolved.decorrelate;
        if use_decorr {
            shared.has_decorr_objects.store(true, Ordering::Relaxed);
        }

        shared.accumulate(
            use_decorr,
            &engine.prev_gains,
            &engine.output_gains,
            &engine.sample_scratch[offset..offset + length],
            offset,
            shared.smoothing,
        );
        engine.prev_gains.copy_from_slice(&engine.output_gains);
    }

    lock(shared.history).store(entity, &engine.prev_gains);
    Ok(())
}

fn render_bed_job(
    engine: &mut WorkerEngine,
    shared: &FrameShared<'_>,
    bed: &BedDefinition,
    depth: usize,
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

    for element in &bed.sub_elements {
        if let FrameElement::BedRemap(remap) = element {
            if remap.use_case == shared.target_use_case || remap.use_case == UseCase::Always {
                return render_bed_remap_job(engine, shared, remap, bed);
            }
        }
    }

    for element in &bed.sub_elements {
        if let FrameElement::Bed(nested) = element {
            if nested.conditional
                && is_activated(nested.conditional, nested.use_case, shared.target_use_case)
            {
                return render_bed_job(engine, shared, nested, depth + 1);
            }
        }
    }

    for channel in &bed.channels {
        render_bed_channel_job(engine, shared, bed.meta_id, channel)?;
    }
    Ok(())
}

fn render_bed_channel_job(
    engine: &mut WorkerEngine,
    shared: &FrameShared<'_>,
    bed_meta_id: u32,
    channel: &BedChannel,
) -> Result<(), RenderError> {
    shared.load_asset(channel.audio_data_id, &mut engine.sample_scratch)?;
    let entity = EntityId::bed_channel(bed_meta_id, channel.channel_id.code());
    let gain = channel.gain.value();

    if let Some(output) = shared.config.output_index_by_uri(channel.channel_id.uri()) {
        engine.output_gains.fill(0.0);
        engine.output_gains[output] = gain;
    } else {
        let direction = channel.channel_id.vbap_position();
        let cube = channel.channel_id.iab_position();
        let sources = [VirtualSource {
            direction,
            weight: 1.0,
        }];
        let result = engine.vbap.pan(&cube, 0.0, 0.0, &sources, gain);
        if result.out_of_gamut {
            shared.record_warning(RenderWarning::VbapFallback);
        }
        shared
            .config
            .fold_to_outputs(&result.speaker_gains, &mut engine.output_gains);
    }

    let samples = shared.timing.samples_per_frame;
    let start = lock(shared.history).start_gains(entity, shared.config.channel_count());
    shared.accumulate(
        false,
        &start,
        &engine.output_gains,
        &engine.sample_scratch[..samples],
        0,
        shared.smoothing,
    );
    lock(shared.history).store(entity, &engine.output_gains);
    Ok(())
}

fn render_bed_remap_job(
    engine: &mut WorkerEngine,
    shared: &FrameShared<'_>,
    remap: &BedRemap,
    parent: &BedDefinition,
) -> Result<(), RenderError> {
    let timing = &shared.timing;
    let destinations = remap.destination_channels.len();
    let sources = remap.source_channels.len();
    if destinations == 0 || sources == 0 {
        return Err(RenderError::MalformedElement("remap with empty channel set"));
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

    let mut source_ids = Vec::with_capacity(sources);
    for source_id in &remap.source_channels {
        let channel = parent
            .channels
            .iter()
            .find(|c| c.channel_id == *source_id)
            .ok_or(RenderError::MalformedElement(
                "remap source missing from parent bed",
            ))?;
        source_ids.push(channel.audio_data_id);
    }

    let channels = shared.config.channel_count();
    let mut coefficients = &remap.sub_blocks[0].coefficients;
    for (source_index, &audio_id) in source_ids.iter().enumerate() {
        shared.load_asset(audio_id, &mut engine.sample_scratch)?;
        let entity = EntityId::remap_channel(remap.meta_id, source_index);
        engine.prev_gains.clear();
        let start = lock(shared.history).start_gains(entity, channels);
        engine.prev_gains.extend_from_slice(&start);

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

            engine.remap_gains.fill(0.0);
            for (dest_index, dest_id) in remap.destination_channels.iter().enumerate() {
                let coefficient = coefficients[dest_index][source_index];
                if coefficient == 0.0 {
                    continue;
                }
                if let Some(output) = shared.config.output_index_by_uri(dest_id.uri()) {
                    engine.remap_gains[output] += coefficient;
                } else {
                    let direction = dest_id.vbap_position();
                    let cube = dest_id.iab_position();
                    let virtual_sources = [VirtualSource {
                        direction,
                        weight: 1.0,
                    }];
                    let result = engine.vbap.pan(&cube, 0.0, 0.0, &virtual_sources, 1.0);
                    if result.out_of_gamut {
                        shared.record_warning(RenderWarning::VbapFallback);
                    }
                    shared
                        .config
                        .fold_to_outputs(&result.speaker_gains, &mut engine.output_gains);
                    for (accumulated, gain) in
                        engine.remap_gains.iter_mut().zip(engine.output_gains.iter())
                    {
                        *accumulated += coefficient * gain;
                    }
                }
            }

            let offset = timing.sub_block_offsets[index];
            let length = timing.sub_block_samples[index];
            shared.accumulate(
                false,
                &engine.prev_gains,
                &engine.remap_gains,
                &engine.sample_scratch[offset..offset + length],
                offset,
                shared.smoothing,
            );
            engine.prev_gains.copy_from_slice(&engine.remap_gains);
        }

        lock(shared.history).store(entity, &engine.prev_gains);

        // Rewind the coefficient carry for the next source.
        coefficients = &remap.sub_blocks[0].coefficients;
    }
    Ok(())
}
