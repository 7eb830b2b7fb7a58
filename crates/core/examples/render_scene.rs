// SPDX-License-Identifier: Apache-2.0

//! Renders a small immersive scene to a 7.1.4 target and prints the
//! per-channel RMS of each frame.
//!
//! Run with: cargo run --example render_scene

use iab_render::config::RendererConfig;
use iab_render::decoder::pack_pcm_samples;
use iab_render::frame::{
    AudioDataPcm, BedChannel, BedDefinition, BitDepth, FrameElement, FrameRate, IabFrame,
    ObjectDefinition, ObjectSubBlock, SampleRate,
};
use iab_render::render::IabRenderer;
use iab_render::tables::ChannelId;
use iab_render::transform::CubePosition;

fn sine_asset(id: u32, freq: f32, amplitude: f32, samples: usize, rate: f32) -> FrameElement {
    let tone: Vec<f32> = (0..samples)
        .map(|n| amplitude * (2.0 * std::f32::consts::PI * freq * n as f32 / rate).sin())
        .collect();
    FrameElement::AudioPcm(AudioDataPcm {
        audio_data_id: id,
        frame_rate: FrameRate::Fps24,
        sample_rate: SampleRate::Hz48000,
        bit_depth: BitDepth::Bits24,
        data: pack_pcm_samples(&tone, BitDepth::Bits24),
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = RendererConfig::for_soundfield("7.1.4")?;
    let mut renderer = IabRenderer::new(config);
    let channels = renderer.output_channel_count();

    println!("target 7.1.4, {channels} output channels");

    let mut buffers = vec![vec![0.0f32; renderer.max_output_sample_count()]; channels];

    // Twenty frames of a dialog bed plus an object circling overhead.
    for frame_index in 0..20u32 {
        let mut frame = IabFrame::new(FrameRate::Fps24, SampleRate::Hz48000);
        frame.elements.push(sine_asset(1, 220.0, 0.3, 2000, 48_000.0));
        frame.elements.push(sine_asset(2, 880.0, 0.2, 2000, 48_000.0));

        frame.elements.push(FrameElement::Bed(BedDefinition::new(
            1,
            vec![BedChannel::new(ChannelId::Center, 1)],
        )));

        let mut object = ObjectDefinition::new(2, 2);
        object.sub_blocks = (0..8)
            .map(|i| {
                let t = (frame_index * 8 + i) as f32 / 160.0;
                let angle = t * 2.0 * std::f32::consts::PI;
                ObjectSubBlock {
                    position: CubePosition::new(
                        0.5 + 0.45 * angle.cos(),
                        0.5 + 0.45 * angle.sin(),
                        0.8,
                    ),
                    ..ObjectSubBlock::default()
                }
            })
            .collect();
        frame.elements.push(FrameElement::Object(object));

        let mut refs: Vec<&mut [f32]> = buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
        let samples = renderer.render_frame(&frame, &mut refs)?;

        let rms: Vec<String> = buffers
            .iter()
            .map(|channel| {
                let power: f32 =
                    channel[..samples].iter().map(|s| s * s).sum::<f32>() / samples as f32;
                format!("{:5.3}", power.sqrt())
            })
            .collect();
        println!("frame {frame_index:2}: rms [{}]", rms.join(" "));
    }

    Ok(())
}
