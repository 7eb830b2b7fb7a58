// SPDX-License-Identifier: Apache-2.0

//! Core performance benchmarks for the iab-render library

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use iab_render::config::RendererConfig;
use iab_render::decoder::pack_pcm_samples;
use iab_render::frame::{
    AudioDataPcm, BedChannel, BedDefinition, BitDepth, FrameElement, FrameRate, IabFrame,
    ObjectDefinition, ObjectSubBlock, SampleRate,
};
use iab_render::interior::{expand_source, VirtualSource};
use iab_render::render::IabRenderer;
use iab_render::tables::ChannelId;
use iab_render::transform::{cube_to_sphere, CubePosition};
use iab_render::vbap::VbapPanner;

fn bench_vbap_point_solve(c: &mut Criterion) {
    c.bench_function("vbap_point_7.1.4", |b| {
        let config = RendererConfig::for_soundfield("7.1.4").unwrap();
        let mut panner = VbapPanner::new(&config);
        let position = black_box(CubePosition::new(0.3, 0.4, 0.2));
        let source = [VirtualSource {
            direction: cube_to_sphere(&position),
            weight: 1.0,
        }];

        b.iter(|| {
            panner.reset_cache();
            panner.pan(&position, 0.0, 0.0, &source, 1.0)
        });
    });
}

fn bench_vbap_extended_solve(c: &mut Criterion) {
    c.bench_function("vbap_extended_9.1OH", |b| {
        let config = RendererConfig::for_soundfield("9.1OH").unwrap();
        let mut panner = VbapPanner::new(&config);
        let position = black_box(CubePosition::new(0.6, 0.5, 0.3));
        let sources = expand_source(&position, 0.5, 0.2);

        b.iter(|| {
            panner.reset_cache();
            panner.pan(&position, 0.5, 0.2, &sources, 1.0)
        });
    });
}

fn object_frame(objects: u32) -> IabFrame {
    let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
    let samples = pack_pcm_samples(&vec![0.25f32; 2000], BitDepth::Bits24);
    for id in 0..objects {
        frame.elements.push(FrameElement::AudioPcm(AudioDataPcm {
            audio_data_id: id,
            frame_rate: FrameRate::Fps24,
            sample_rate: SampleRate::Hz48000,
            bit_depth: BitDepth::Bits24,
            data: samples.clone(),
        }));
        let mut object = ObjectDefinition::new(id, id);
        object.sub_blocks = (0..8)
            .map(|i| ObjectSubBlock {
                position: CubePosition::new(
                    (id as f32 * 0.1) % 1.0,
                    (i as f32) / 8.0,
                    0.0,
                ),
                ..ObjectSubBlock::default()
            })
            .collect();
        frame.elements.push(FrameElement::Object(object));
    }
    frame
}

fn bench_render_frame_objects(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_frame_objects");
    for count in [1u32, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let config = RendererConfig::for_soundfield("7.1.4").unwrap();
            let mut renderer = IabRenderer::new(config);
            let frame = object_frame(count);
            let channels = renderer.output_channel_count();
            let mut buffers = vec![vec![0.0f32; renderer.max_output_sample_count()]; channels];

            b.iter(|| {
                let mut refs: Vec<&mut [f32]> =
                    buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
                renderer.render_frame(black_box(&frame), &mut refs).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_render_frame_bed(c: &mut Criterion) {
    c.bench_function("render_frame_5.1_bed", |b| {
        let config = RendererConfig::for_soundfield("5.1").unwrap();
        let mut renderer = IabRenderer::new(config);

        let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
        frame.elements.push(FrameElement::AudioPcm(AudioDataPcm {
            audio_data_id: 1,
            frame_rate: FrameRate::Fps24,
            sample_rate: SampleRate::Hz48000,
            bit_depth: BitDepth::Bits24,
            data: pack_pcm_samples(&vec![0.25f32; 2000], BitDepth::Bits24),
        }));
        let channels = vec![
            BedChannel::new(ChannelId::Left, 1),
            BedChannel::new(ChannelId::Center, 1),
            BedChannel::new(ChannelId::Right, 1),
            BedChannel::new(ChannelId::LeftSurround, 1),
            BedChannel::new(ChannelId::RightSurround, 1),
            BedChannel::new(ChannelId::Lfe, 1),
        ];
        frame
            .elements
            .push(FrameElement::Bed(BedDefinition::new(1, channels)));

        let out_channels = renderer.output_channel_count();
        let mut buffers = vec![vec![0.0f32; renderer.max_output_sample_count()]; out_channels];
        b.iter(|| {
            let mut refs: Vec<&mut [f32]> =
                buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
            renderer.render_frame(black_box(&frame), &mut refs).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_vbap_point_solve,
    bench_vbap_extended_solve,
    bench_render_frame_objects,
    bench_render_frame_bed
);
criterion_main!(benches);
