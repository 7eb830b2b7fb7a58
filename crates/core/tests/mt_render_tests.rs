// SPDX-License-Identifier: Apache-2.0

//! Multi-threaded renderer against the single-threaded reference.

use iab_render::config::RendererConfig;
use iab_render::decoder::pack_pcm_samples;
use iab_render::frame::{
    AudioDataPcm, BedChannel, BedDefinition, BedRemap, BitDepth, FrameElement, FrameRate,
    IabFrame, ObjectDefinition, ObjectSubBlock, RemapSubBlock, SampleRate,
};
use iab_render::mt::IabRendererMt;
use iab_render::render::IabRenderer;
use iab_render::tables::{ChannelId, UseCase};
use iab_render::transform::CubePosition;

fn pcm_asset(id: u32, value: f32, samples: usize) -> FrameElement {
    FrameElement::AudioPcm(AudioDataPcm {
        audio_data_id: id,
        frame_rate: FrameRate::Fps24,
        sample_rate: SampleRate::Hz48000,
        bit_depth: BitDepth::Bits24,
        data: pack_pcm_samples(&vec![value; samples], BitDepth::Bits24),
    })
}

/// A busy frame: a bed, a remapped bed, and four moving objects, every
/// entity on its own audio asset.
fn busy_frame() -> IabFrame {
    let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);

    for id in 1..=10u32 {
        frame
            .elements
            .push(pcm_asset(id, 0.05 * id as f32, 2000));
    }

    frame.elements.push(FrameElement::Bed(BedDefinition::new(
        100,
        vec![
            BedChannel::new(ChannelId::Left, 1),
            BedChannel::new(ChannelId::Center, 2),
            BedChannel::new(ChannelId::Right, 3),
        ],
    )));

    // A stereo bed with a remap folding both sources onto the centre.
    let remap = BedRemap {
        meta_id: 200,
        use_case: UseCase::Surround5_1,
        destination_channels: vec![ChannelId::Center],
        source_channels: vec![ChannelId::Left, ChannelId::Right],
        sub_blocks: (0..8)
            .map(|i| RemapSubBlock {
                exists: i == 0,
                coefficients: vec![vec![0.5, 0.5]],
            })
            .collect(),
    };
    let mut remapped = BedDefinition::new(
        101,
        vec![
            BedChannel::new(ChannelId::Left, 4),
            BedChannel::new(ChannelId::Right, 5),
        ],
    );
    remapped.sub_elements.push(FrameElement::BedRemap(remap));
    frame.elements.push(FrameElement::Bed(remapped));

    for (n, id) in (6..=9u32).enumerate() {
        let mut object = ObjectDefinition::new(300 + n as u32, id);
        object.sub_blocks = (0..8)
            .map(|i| ObjectSubBlock {
                position: CubePosition::new(
                    0.1 + 0.2 * n as f32,
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

fn render_st(renderer: &mut IabRenderer, frame: &IabFrame) -> Vec<Vec<f32>> {
    let channels = renderer.output_channel_count();
    let mut buffers = vec![vec![0.0f32; renderer.max_output_sample_count()]; channels];
    let mut refs: Vec<&mut [f32]> = buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
    renderer.render_frame(frame, &mut refs).expect("st render");
    buffers
}

fn render_mt(renderer: &mut IabRendererMt, frame: &IabFrame) -> Vec<Vec<f32>> {
    let channels = renderer.output_channel_count();
    let mut buffers = vec![vec![0.0f32; renderer.max_output_sample_count()]; channels];
    let mut refs: Vec<&mut [f32]> = buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
    renderer.render_frame(frame, &mut refs).expect("mt render");
    buffers
}

#[test]
fn test_busy_frame_matches_single_threaded() {
    let frame = busy_frame();
    let config = RendererConfig::for_soundfield("5.1").unwrap();

    let mut st = IabRenderer::new(config.clone());
    let mut mt = IabRendererMt::new(config, 4).unwrap();

    // Two consecutive frames so the gain history path is exercised too.
    for _ in 0..2 {
        let st_out = render_st(&mut st, &frame);
        let mt_out = render_mt(&mut mt, &frame);
        for (channel, (a, b)) in st_out.iter().zip(&mt_out).enumerate() {
            for (k, (x, y)) in a[..2000].iter().zip(&b[..2000]).enumerate() {
                // Workers accumulate in arbitrary order; the sums agree
                // to float tolerance.
                assert!(
                    (x - y).abs() < 1e-4,
                    "channel {channel} sample {k}: {x} vs {y}"
                );
            }
        }
    }
}

#[test]
fn test_decorrelated_objects_match_single_threaded() {
    let config = RendererConfig::for_soundfield("5.1").unwrap();

    let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
    frame.elements.push(pcm_asset(1, 0.5, 2000));
    let mut object = ObjectDefinition::new(1, 1);
    object.sub_blocks = vec![
        ObjectSubBlock {
            decorrelate: true,
            ..ObjectSubBlock::default()
        };
        8
    ];
    frame.elements.push(FrameElement::Object(object));

    let mut st = IabRenderer::new(config.clone());
    let mut mt = IabRendererMt::new(config, 2).unwrap();

    let st_out = render_st(&mut st, &frame);
    let mt_out = render_mt(&mut mt, &frame);
    for (a, b) in st_out.iter().zip(&mt_out) {
        for (x, y) in a[..2000].iter().zip(&b[..2000]) {
            assert!((x - y).abs() < 1e-5);
        }
    }
    // Output actually went through the decorrelators.
    assert!(st_out.iter().any(|b| b[..2000].iter().any(|&s| s != 0.0)));
}

#[test]
fn test_mt_warnings_surface() {
    use iab_render::config::{build_render_patches, RenderSpeaker};
    use iab_render::geometry::Vector3;
    use iab_render::RenderWarning;

    let mut speakers = vec![
        RenderSpeaker::physical(0, ChannelId::Left),
        RenderSpeaker::physical(1, ChannelId::Right),
    ];
    speakers.push(RenderSpeaker::virtual_at("TSV", Vector3::new(0.0, 0.0, 1.0)));
    let patches = build_render_patches(&speakers).unwrap();
    let config = RendererConfig::new(speakers, patches, "2.0").unwrap();
    let mut mt = IabRendererMt::new(config, 2).unwrap();

    let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
    frame.elements.push(pcm_asset(1, 0.5, 2000));
    let mut object = ObjectDefinition::new(1, 1);
    object.sub_blocks = vec![
        ObjectSubBlock {
            position: CubePosition::new(0.5, 1.0, 0.0),
            ..ObjectSubBlock::default()
        };
        8
    ];
    frame.elements.push(FrameElement::Object(object));

    let _ = render_mt(&mut mt, &frame);
    assert!(mt.warnings().get(&RenderWarning::VbapFallback).copied() > Some(0));
}

#[test]
fn test_mt_gain_history_continuity() {
    let config = RendererConfig::for_soundfield("5.1").unwrap();
    assert!(config.smoothing_enabled());
    let mut mt = IabRendererMt::new(config, 4).unwrap();

    let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
    frame.elements.push(pcm_asset(1, 1.0, 2000));
    let mut object = ObjectDefinition::new(7, 1);
    object.sub_blocks = vec![ObjectSubBlock::default(); 8];
    frame.elements.push(FrameElement::Object(object));

    let first = render_mt(&mut mt, &frame);
    // Frame one ramps in over the first sub-block.
    assert!(first[1][0] < 0.1);
    assert!((first[1][1999] - 1.0).abs() < 1e-3);

    // Frame two starts flat at unity: history crossed the frame boundary.
    let second = render_mt(&mut mt, &frame);
    assert!((second[1][0] - 1.0).abs() < 1e-3);
}
