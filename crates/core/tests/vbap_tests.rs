// SPDX-License-Identifier: Apache-2.0

//! VBAP panning properties over the preset layouts.

use iab_render::config::RendererConfig;
use iab_render::geometry::Vector3;
use iab_render::interior::{expand_source, VirtualSource};
use iab_render::transform::{cube_to_sphere, sphere_to_cube, CubePosition};
use iab_render::vbap::VbapPanner;

fn point_source(direction: Vector3) -> Vec<VirtualSource> {
    vec![VirtualSource {
        direction: direction.normalized(),
        weight: 1.0,
    }]
}

#[test]
fn test_vertex_property_all_layouts() {
    for soundfield in ["5.1", "7.1DS", "7.1SDS", "9.1OH", "5.1.4", "7.1.4"] {
        let config = RendererConfig::for_soundfield(soundfield).unwrap();
        let mut panner = VbapPanner::new(&config);
        for (index, speaker) in config.all_speakers().iter().enumerate() {
            if !speaker.vbap {
                continue;
            }
            let cube = sphere_to_cube(&speaker.position);
            let result = panner.pan(&cube, 0.0, 0.0, &point_source(speaker.position), 1.0);
            for (i, &gain) in result.speaker_gains.iter().enumerate() {
                if i == index {
                    assert!(
                        (gain - 1.0).abs() < 1e-3,
                        "{soundfield}/{}: vertex gain {gain}",
                        speaker.name
                    );
                } else {
                    assert!(
                        gain.abs() < 1e-3,
                        "{soundfield}/{}: leak {gain} into {}",
                        speaker.name,
                        config.all_speakers()[i].name
                    );
                }
            }
        }
    }
}

#[test]
fn test_power_conservation_random_positions() {
    let config = RendererConfig::for_soundfield("7.1.4").unwrap();
    let mut panner = VbapPanner::new(&config);

    for _ in 0..200 {
        let position = CubePosition::new(
            rand::random::<f32>(),
            rand::random::<f32>(),
            rand::random::<f32>(),
        );
        let direction = cube_to_sphere(&position);
        let result = panner.pan(&position, 0.0, 0.0, &point_source(direction), 1.0);
        let power: f32 = result.speaker_gains.iter().map(|g| g * g).sum();
        assert!(
            (power - 1.0).abs() < 1e-3,
            "power {power} at {position:?}"
        );
        assert!(result.speaker_gains.iter().all(|&g| g >= 0.0));
    }
}

#[test]
fn test_extended_sources_power_preserving() {
    let config = RendererConfig::for_soundfield("9.1OH").unwrap();
    let mut panner = VbapPanner::new(&config);

    for _ in 0..100 {
        let position = CubePosition::new(
            rand::random::<f32>(),
            rand::random::<f32>() * 0.8,
            rand::random::<f32>() * 0.5,
        );
        let aperture = rand::random::<f32>();
        let divergence = rand::random::<f32>();
        let sources = expand_source(&position, aperture, divergence);
        let result = panner.pan(&position, aperture, divergence, &sources, 0.9);
        if result.out_of_gamut {
            continue;
        }
        let power: f32 = result.speaker_gains.iter().map(|g| g * g).sum();
        assert!(
            (power - 0.81).abs() < 2e-3,
            "power {power} a={aperture} d={divergence}"
        );
    }
}

#[test]
fn test_object_gain_scales_power() {
    let config = RendererConfig::for_soundfield("5.1").unwrap();
    let mut panner = VbapPanner::new(&config);
    let position = CubePosition::new(0.3, 0.4, 0.0);
    let direction = cube_to_sphere(&position);

    for gain in [0.25f32, 0.5, 1.0] {
        let result = panner.pan(&position, 0.0, 0.0, &point_source(direction), gain);
        let power: f32 = result.speaker_gains.iter().map(|g| g * g).sum();
        assert!((power - gain * gain).abs() < 1e-3);
        panner.reset_cache();
    }
}

#[test]
fn test_pan_between_adjacent_speakers_stays_local() {
    let config = RendererConfig::for_soundfield("7.1DS").unwrap();
    let mut panner = VbapPanner::new(&config);

    // Sweep the front-left quarter of the screen wall: only L, C and the
    // left wall may light up.
    let names: Vec<&str> = config
        .all_speakers()
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    for step in 0..20 {
        let x = 0.25 + 0.25 * (step as f32 / 19.0);
        let position = CubePosition::new(x, 0.0, 0.0);
        let direction = cube_to_sphere(&position);
        let result = panner.pan(&position, 0.0, 0.0, &point_source(direction), 1.0);
        for (i, &gain) in result.speaker_gains.iter().enumerate() {
            if gain > 1e-3 {
                assert!(
                    ["L", "C", "LSS", "TSV"].contains(&names[i]),
                    "unexpected speaker {} active at x={x}",
                    names[i]
                );
            }
        }
    }
}

#[test]
fn test_cache_reuse_across_sub_blocks() {
    let config = RendererConfig::for_soundfield("5.1").unwrap();
    let mut panner = VbapPanner::new(&config);
    let position = CubePosition::new(0.62, 0.31, 0.0);
    let direction = cube_to_sphere(&position);

    let first = panner.pan(&position, 0.0, 0.0, &point_source(direction), 1.0);
    let second = panner.pan(&position, 0.0, 0.0, &point_source(direction), 1.0);
    assert!(std::sync::Arc::ptr_eq(
        &first.speaker_gains,
        &second.speaker_gains
    ));
}
