// SPDX-License-Identifier: Apache-2.0

//! Zone-9 redistribution over an array-sized target configuration.

use iab_render::config::{build_render_patches, RenderSpeaker, RendererConfig};
use iab_render::frame::{GainPrefix, ObjectZoneGain9};
use iab_render::geometry::Vector3;
use iab_render::transform::{cube_to_sphere, CubePosition};
use iab_render::zones::ObjectZone9;

/// A 30-speaker auditorium array targeting the 9.1OH use case: screen
/// trio, five speakers down each side wall, three across the rear wall,
/// and nine overheads in three rows.
fn array_config() -> RendererConfig {
    let mut speakers = Vec::new();
    let mut channel = 0i32;
    let mut add = |name: String, position: CubePosition| {
        let mut speaker = RenderSpeaker::physical_at(
            &name,
            channel,
            cube_to_sphere(&position),
        );
        // Keep the intended wall position rather than the re-projected
        // one so zone assignment is exact.
        speaker.iab_position = position;
        channel += 1;
        speakers.push(speaker);
    };

    add("L".into(), CubePosition::new(0.2, 0.0, 0.0));
    add("C".into(), CubePosition::new(0.5, 0.0, 0.0));
    add("R".into(), CubePosition::new(0.8, 0.0, 0.0));
    for (i, y) in [0.15, 0.3, 0.5, 0.7, 0.85].iter().enumerate() {
        add(format!("LW{}", i + 1), CubePosition::new(0.0, *y, 0.0));
        add(format!("RW{}", i + 1), CubePosition::new(1.0, *y, 0.0));
    }
    add("LRW".into(), CubePosition::new(0.25, 1.0, 0.0));
    add("CRW".into(), CubePosition::new(0.5, 1.0, 0.0));
    add("RRW".into(), CubePosition::new(0.75, 1.0, 0.0));
    for (i, y) in [0.2, 0.5, 0.8].iter().enumerate() {
        add(format!("LC{}", i + 1), CubePosition::new(0.25, *y, 1.0));
        add(format!("CC{}", i + 1), CubePosition::new(0.5, *y, 1.0));
        add(format!("RC{}", i + 1), CubePosition::new(0.75, *y, 1.0));
    }
    // 3 + 10 + 3 + 9 = 25; four corner fills plus a top make 30.
    add("LFC".into(), CubePosition::new(0.1, 0.0, 0.0));
    add("RFC".into(), CubePosition::new(0.9, 0.0, 0.0));
    add("LWF".into(), CubePosition::new(0.0, 0.25, 0.0));
    add("RWF".into(), CubePosition::new(1.0, 0.25, 0.0));
    add("TS".into(), CubePosition::new(0.5, 0.5, 1.0));

    let patches = build_render_patches(&speakers).unwrap();
    RendererConfig::new(speakers, patches, "9.1OH").unwrap()
}

fn zone_gains(bits: [u8; 9]) -> ObjectZoneGain9 {
    let mut gains = [GainPrefix::Silence; 9];
    for (gain, bit) in gains.iter_mut().zip(bits.iter()) {
        if *bit == 1 {
            *gain = GainPrefix::Unity;
        }
    }
    ObjectZoneGain9 {
        object_zone_control: true,
        gains,
    }
}

fn total_power(gains: &[f32]) -> f32 {
    gains.iter().map(|g| g * g).sum()
}

fn uniform_gains(config: &RendererConfig) -> Vec<f32> {
    let n = config.channel_count();
    vec![(1.0 / n as f32).sqrt(); n]
}

#[test]
fn test_array_build() {
    let config = array_config();
    assert_eq!(config.channel_count(), 30);
    let zone = ObjectZone9::new(&config);
    assert!(zone.is_initialised());
    // Every VBAP speaker belongs to exactly one group.
    let assigned: usize = zone.group_outputs().iter().map(|g| g.len()).sum();
    assert_eq!(assigned, 30);
}

#[test]
fn test_screen_only_no_overhead() {
    let config = array_config();
    let zone = ObjectZone9::new(&config);
    let mut gains = uniform_gains(&config);
    let before = total_power(&gains);

    let outcome = zone.process_zone_gains(&zone_gains([1, 1, 1, 0, 0, 0, 0, 0, 0]), &mut gains);
    assert!(outcome.applied);
    assert_eq!(outcome.dropped_sources, 0);

    // Power conserved within the stream's gain quantization step.
    assert!((total_power(&gains) - before).abs() < 1.0 / (2.0 * 1023.0));

    // Only screen speakers carry energy.
    let screens = ["L", "C", "R", "LFC", "RFC"];
    for speaker in config.physical_speakers() {
        let gain = gains[speaker.output_index.unwrap()];
        if screens.contains(&speaker.name.as_str()) {
            assert!(gain > 0.0, "{} silent", speaker.name);
        } else {
            assert_eq!(gain, 0.0, "{} kept energy", speaker.name);
        }
    }

    // Left/right symmetry of the array carries into the result.
    let out = |name: &str| config.output_index_by_name(name).unwrap();
    assert!((gains[out("L")] - gains[out("R")]).abs() < 1e-5);
}

#[test]
fn test_every_pattern_is_power_preserving() {
    let patterns: [[u8; 9]; 11] = [
        [1, 1, 1, 1, 1, 0, 0, 0, 0],
        [1, 1, 1, 1, 1, 0, 0, 1, 1],
        [1, 1, 1, 0, 0, 1, 1, 0, 0],
        [1, 1, 1, 0, 0, 1, 1, 1, 1],
        [0, 1, 0, 0, 0, 1, 1, 0, 0],
        [0, 1, 0, 0, 0, 1, 1, 1, 1],
        [1, 1, 1, 0, 0, 0, 0, 0, 0],
        [1, 1, 1, 0, 0, 0, 0, 1, 1],
        [0, 0, 0, 1, 1, 1, 1, 0, 0],
        [0, 0, 0, 1, 1, 1, 1, 1, 1],
        [1, 1, 1, 1, 1, 1, 1, 0, 0],
    ];

    let config = array_config();
    let zone = ObjectZone9::new(&config);

    for bits in patterns {
        let mut gains = uniform_gains(&config);
        let before = total_power(&gains);
        let outcome = zone.process_zone_gains(&zone_gains(bits), &mut gains);
        assert!(outcome.applied, "pattern {bits:?} not applied");
        // The array populates every zone, so nothing can be dropped and
        // power moves losslessly.
        assert_eq!(outcome.dropped_sources, 0, "pattern {bits:?}");
        assert!(
            (total_power(&gains) - before).abs() < 1e-4,
            "pattern {bits:?}: power {} vs {}",
            total_power(&gains),
            before
        );
        assert!(gains.iter().all(|&g| g >= 0.0));
    }
}

#[test]
fn test_no_overhead_patterns_silence_ceiling() {
    let config = array_config();
    let zone = ObjectZone9::new(&config);
    let ceiling: Vec<usize> = config
        .physical_speakers()
        .filter(|s| s.iab_position.z > 0.5)
        .map(|s| s.output_index.unwrap())
        .collect();
    assert!(!ceiling.is_empty());

    for bits in [
        [1, 1, 1, 1, 1, 0, 0, 0, 0],
        [1, 1, 1, 0, 0, 1, 1, 0, 0],
        [1, 1, 1, 0, 0, 0, 0, 0, 0],
        [0, 0, 0, 1, 1, 1, 1, 0, 0],
        [1, 1, 1, 1, 1, 1, 1, 0, 0],
    ] {
        let mut gains = uniform_gains(&config);
        zone.process_zone_gains(&zone_gains(bits), &mut gains);
        for &output in &ceiling {
            assert_eq!(gains[output], 0.0, "ceiling output {output} for {bits:?}");
        }
    }
}

#[test]
fn test_plus_overhead_patterns_keep_ceiling() {
    let config = array_config();
    let zone = ObjectZone9::new(&config);
    let out = |name: &str| config.output_index_by_name(name).unwrap();

    let mut gains = uniform_gains(&config);
    zone.process_zone_gains(&zone_gains([1, 1, 1, 1, 1, 0, 0, 1, 1]), &mut gains);
    // Side ceilings stay on in NoBackPlusOverhead.
    assert!(gains[out("LC1")] > 0.0);
    assert!(gains[out("RC3")] > 0.0);
}

#[test]
fn test_fractional_zone_gain_is_noop() {
    let config = array_config();
    let zone = ObjectZone9::new(&config);
    let mut gains = uniform_gains(&config);
    let before = gains.clone();

    let mut zg = zone_gains([1, 1, 1, 1, 1, 0, 0, 0, 0]);
    zg.gains[4] = GainPrefix::Coded(0.7);
    let outcome = zone.process_zone_gains(&zg, &mut gains);
    assert!(!outcome.applied);
    assert!(outcome.unmatched);
    assert_eq!(gains, before);
}

#[test]
fn test_surround_only_leaves_screen_silent_and_walls_loaded() {
    let config = array_config();
    let zone = ObjectZone9::new(&config);
    let mut gains = uniform_gains(&config);
    zone.process_zone_gains(&zone_gains([0, 0, 0, 1, 1, 1, 1, 0, 0]), &mut gains);

    for name in ["L", "C", "R", "LFC", "RFC"] {
        let output = config.output_index_by_name(name).unwrap();
        assert_eq!(gains[output], 0.0, "{name}");
    }
    // Wall fronts picked up the screen energy.
    let lw1 = config.output_index_by_name("LW1").unwrap();
    let base = (1.0f32 / 30.0).sqrt();
    assert!(gains[lw1] > base);
}

#[test]
fn test_missing_rear_channels_drop_with_warning_count() {
    // A screen-plus-sides-only layout: NoSide cannot move the rear-most
    // side speakers anywhere and leaves them in place.
    let mut speakers = vec![
        RenderSpeaker::physical(0, iab_render::ChannelId::Left),
        RenderSpeaker::physical(1, iab_render::ChannelId::Center),
        RenderSpeaker::physical(2, iab_render::ChannelId::Right),
        RenderSpeaker::physical(3, iab_render::ChannelId::LeftSideSurround),
        RenderSpeaker::physical(4, iab_render::ChannelId::RightSideSurround),
    ];
    speakers.push(RenderSpeaker::virtual_at("TSV", Vector3::new(0.0, 0.0, 1.0)));
    let patches = build_render_patches(&speakers).unwrap();
    let config = RendererConfig::new(speakers, patches, "5.1").unwrap();
    let zone = ObjectZone9::new(&config);

    let mut gains = vec![0.1, 0.1, 0.1, 0.5, 0.5];
    let before = gains.clone();
    let outcome = zone.process_zone_gains(&zone_gains([1, 1, 1, 0, 0, 1, 1, 0, 0]), &mut gains);
    assert!(outcome.applied);
    assert!(outcome.dropped_sources > 0);
    // Side energy stays put instead of collapsing onto the screen.
    assert_eq!(gains[3], before[3]);
    assert_eq!(gains[4], before[4]);
}
