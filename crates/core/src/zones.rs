// SPDX-License-Identifier: Apache-2.0

//! Object zone-9 control: gating per-speaker gains to zone patterns
//!
//! The listening space splits into 9 top-level zones (3 screen, 2 side
//! walls, 2 rear walls, 2 ceilings). For redistribution the walls and
//! ceilings subdivide front/mid/rear and center bands are added on the
//! rear wall and ceiling, giving 21 groups. Each VBAP speaker of the
//! target configuration is assigned to exactly one group at setup from
//! its IAB-cube coordinates.
//!
//! Only the 11 supported on/off patterns are processed; fractional zone
//! gains or unmatched combinations leave the channel gains untouched.
//! Redistribution moves *power*: the squared-gain total of a disabled
//! source group is split evenly over the first non-empty target group of
//! its preference chain, and each target becomes sqrt(g^2 + share).

use crate::config::RendererConfig;
use crate::frame::{GainPrefix, ObjectZoneGain9};

/// Tolerance when binning speaker coordinates into zones, guarding
/// against float differences from the angle-to-cube conversion.
const ZONE_MAPPING_TOLERANCE: f32 = 0.05;

// Front/mid/rear bounds on the cube's y axis.
const FRONT_MID_BOUND_FLOOR: f32 = 0.33;
const MID_REAR_BOUND_FLOOR: f32 = 0.67;
const FRONT_MID_BOUND_CEILING: f32 = 0.25;
const MID_REAR_BOUND_CEILING: f32 = 0.75;

/// The supported zone-9 gain patterns. `AllZonesEnabled` stands for
/// "zone control inactive" and is also the outcome for unmatched
/// combinations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Zone9Pattern {
    NoBackNoOverhead = 0,
    NoBackPlusOverhead = 1,
    NoSideNoOverhead = 2,
    NoSidePlusOverhead = 3,
    CenterBackNoOverhead = 4,
    CenterBackPlusOverhead = 5,
    ScreenOnlyNoOverhead = 6,
    ScreenOnlyPlusOverhead = 7,
    SurroundNoOverhead = 8,
    SurroundPlusOverhead = 9,
    FloorNoOverhead = 10,
    AllZonesEnabled = 11,
}

/// Zone enable bits for each supported pattern, in zone order LScreen,
/// CScreen, RScreen, LWall, RWall, LRear, RRear, LCeiling, RCeiling.
const SUPPORTED_ZONE_GAIN_PATTERNS: [[u8; 9]; 11] = [
    [1, 1, 1, 1, 1, 0, 0, 0, 0], // NoBackNoOverhead
    [1, 1, 1, 1, 1, 0, 0, 1, 1], // NoBackPlusOverhead
    [1, 1, 1, 0, 0, 1, 1, 0, 0], // NoSideNoOverhead
    [1, 1, 1, 0, 0, 1, 1, 1, 1], // NoSidePlusOverhead
    [0, 1, 0, 0, 0, 1, 1, 0, 0], // CenterBackNoOverhead
    [0, 1, 0, 0, 0, 1, 1, 1, 1], // CenterBackPlusOverhead
    [1, 1, 1, 0, 0, 0, 0, 0, 0], // ScreenOnlyNoOverhead
    [1, 1, 1, 0, 0, 0, 0, 1, 1], // ScreenOnlyPlusOverhead
    [0, 0, 0, 1, 1, 1, 1, 0, 0], // SurroundNoOverhead
    [0, 0, 0, 1, 1, 1, 1, 1, 1], // SurroundPlusOverhead
    [1, 1, 1, 1, 1, 1, 1, 0, 0], // FloorNoOverhead
];

const PATTERNS: [Zone9Pattern; 11] = [
    Zone9Pattern::NoBackNoOverhead,
    Zone9Pattern::NoBackPlusOverhead,
    Zone9Pattern::NoSideNoOverhead,
    Zone9Pattern::NoSidePlusOverhead,
    Zone9Pattern::CenterBackNoOverhead,
    Zone9Pattern::CenterBackPlusOverhead,
    Zone9Pattern::ScreenOnlyNoOverhead,
    Zone9Pattern::ScreenOnlyPlusOverhead,
    Zone9Pattern::SurroundNoOverhead,
    Zone9Pattern::SurroundPlusOverhead,
    Zone9Pattern::FloorNoOverhead,
];

/// Zone groups used by the redistribution algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Group {
    LeftScreen = 0,
    CenterScreen = 1,
    RightScreen = 2,
    LeftWallFront = 3,
    LeftWallMid = 4,
    LeftWallRear = 5,
    RightWallFront = 6,
    RightWallMid = 7,
    RightWallRear = 8,
    LeftRearWall = 9,
    CenterRearWall = 10,
    RightRearWall = 11,
    LeftCeilingFront = 12,
    LeftCeilingMid = 13,
    LeftCeilingRear = 14,
    CenterCeilingFront = 15,
    CenterCeilingMid = 16,
    CenterCeilingRear = 17,
    RightCeilingFront = 18,
    RightCeilingMid = 19,
    RightCeilingRear = 20,
}

const NUM_GROUPS: usize = 21;

/// Result of one zone-gain application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ZoneOutcome {
    /// True when a supported pattern matched and redistribution ran.
    pub applied: bool,
    /// True when zone control was active but the gains matched no
    /// supported pattern.
    pub unmatched: bool,
    /// Number of source groups whose energy could not be moved because
    /// every preference was empty (left in place, counted for warnings).
    pub dropped_sources: u32,
}

/// Zone-9 processor bound to one renderer configuration.
///
/// Channel gains passed to [`ObjectZone9::process_zone_gains`] are indexed
/// by renderer output channel, matching the configuration's physical
/// speaker order.
pub struct ObjectZone9 {
    groups: Vec<Vec<usize>>,
    num_output_channels: usize,
    initialised: bool,
}

impl ObjectZone9 {
    pub fn new(config: &RendererConfig) -> Self {
        let mut groups = vec![Vec::new(); NUM_GROUPS];
        let mut any = false;

        for speaker in config.physical_speakers() {
            if !speaker.vbap {
                continue;
            }
            let output = match speaker.output_index {
                Some(index) => index,
                None => continue,
            };
            let p = speaker.iab_position;
            let group = map_position_to_group(p.x, p.y, p.z);
            groups[group as usize].push(output);
            any = true;
        }

        Self {
            groups,
            num_output_channels: config.channel_count(),
            initialised: any,
        }
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Output channels of each zone group, for inspection and tests.
    pub fn group_outputs(&self) -> &[Vec<usize>] {
        &self.groups
    }

    fn group(&self, g: Group) -> &[usize] {
        &self.groups[g as usize]
    }

    fn concat(&self, parts: &[Group]) -> Vec<usize> {
        let mut out = Vec::new();
        for g in parts {
            out.extend_from_slice(self.group(*g));
        }
        out
    }

    /// Full side wall (front + mid + rear).
    fn left_wall_all(&self) -> Vec<usize> {
        self.concat(&[Group::LeftWallFront, Group::LeftWallMid, Group::LeftWallRear])
    }

    fn right_wall_all(&self) -> Vec<usize> {
        self.concat(&[
            Group::RightWallFront,
            Group::RightWallMid,
            Group::RightWallRear,
        ])
    }

    /// Left-of-center ceiling (front + mid + rear), center band excluded.
    fn left_ceiling_all(&self) -> Vec<usize> {
        self.concat(&[
            Group::LeftCeilingFront,
            Group::LeftCeilingMid,
            Group::LeftCeilingRear,
        ])
    }

    fn right_ceiling_all(&self) -> Vec<usize> {
        self.concat(&[
            Group::RightCeilingFront,
            Group::RightCeilingMid,
            Group::RightCeilingRear,
        ])
    }

    /// Apply a zone-9 gain set to a per-output-channel gain vector.
    ///
    /// Inactive zone control, an uninitialised processor, fractional zone
    /// gains or an unmatched pattern leave the gains unmodified.
    pub fn process_zone_gains(
        &self,
        zone_gains: &ObjectZoneGain9,
        channel_gains: &mut [f32],
    ) -> ZoneOutcome {
        let mut outcome = ZoneOutcome::default();

        if !zone_gains.object_zone_control || !self.initialised {
            return outcome;
        }
        if channel_gains.len() != self.num_output_channels {
            return outcome;
        }

        let pattern = match_zone_gain_pattern(&zone_gains.gains);
        if pattern == Zone9Pattern::AllZonesEnabled {
            outcome.unmatched = true;
            return outcome;
        }

        // Step 1: patterns excluding the overhead zones move ceiling
        // energy to the floor first.
        use Zone9Pattern::*;
        match pattern {
            NoBackNoOverhead | NoSideNoOverhead | CenterBackNoOverhead
            | ScreenOnlyNoOverhead | SurroundNoOverhead | FloorNoOverhead => {
                self.redistribute_for_floor_only(channel_gains, &mut outcome);
            }
            _ => {}
        }

        // Step 2: the floor pattern, shared between the with- and
        // without-overhead pairs.
        match pattern {
            NoBackNoOverhead | NoBackPlusOverhead => {
                self.redistribute_for_no_back(channel_gains, &mut outcome);
            }
            NoSideNoOverhead | NoSidePlusOverhead => {
                self.redistribute_for_no_side(channel_gains, &mut outcome);
            }
            CenterBackNoOverhead | CenterBackPlusOverhead => {
                self.redistribute_for_center_back(channel_gains, &mut outcome);
            }
            ScreenOnlyNoOverhead | ScreenOnlyPlusOverhead => {
                self.redistribute_for_screen_only(channel_gains, &mut outcome);
            }
            SurroundNoOverhead | SurroundPlusOverhead => {
                self.redistribute_for_surround_only(channel_gains, &mut outcome);
            }
            FloorNoOverhead => {} // already done in step 1
            AllZonesEnabled => unreachable!(),
        }

        outcome.applied = true;
        outcome
    }

    /// Move the power of `sources` to the first non-empty preference
    /// group. When every preference is empty the source gains stay in
    /// place and the drop is counted.
    fn redistribute(
        &self,
        gains: &mut [f32],
        sources: &[usize],
        preferences: [&[usize]; 3],
        outcome: &mut ZoneOutcome,
    ) {
        if sources.is_empty() {
            return;
        }
        let targets = preferences
            .iter()
            .find(|p| !p.is_empty())
            .copied()
            .unwrap_or(&[]);
        if targets.is_empty() {
            outcome.dropped_sources += 1;
            return;
        }

        let mut power = 0.0f32;
        for &s in sources {
            power += gains[s] * gains[s];
            gains[s] = 0.0;
        }
        let per_target = power / targets.len() as f32;
        if per_target > 0.0 {
            for &t in targets {
                gains[t] = (gains[t] * gains[t] + per_target).sqrt();
            }
        }
    }

    fn redistribute_for_no_back(&self, gains: &mut [f32], outcome: &mut ZoneOutcome) {
        // Center rear first: into the rear walls, then the side-wall rear
        // sections, then the full side walls. Whatever lands on the rear
        // walls moves wallward in the per-side passes below.
        let rear_walls = self.concat(&[Group::LeftRearWall, Group::RightRearWall]);
        let side_rears = self.concat(&[Group::LeftWallRear, Group::RightWallRear]);
        let side_walls: Vec<usize> = {
            let mut v = self.left_wall_all();
            v.extend(self.right_wall_all());
            v
        };
        self.redistribute(
            gains,
            &self.concat(&[Group::CenterRearWall]),
            [&rear_walls, &side_rears, &side_walls],
            outcome,
        );

        // Rear wall power folds onto the same-side wall, rear-most
        // section first.
        self.redistribute(
            gains,
            self.group(Group::LeftRearWall),
            [
                self.group(Group::LeftWallRear),
                self.group(Group::LeftWallMid),
                self.group(Group::LeftWallFront),
            ],
            outcome,
        );
        self.redistribute(
            gains,
            self.group(Group::RightRearWall),
            [
                self.group(Group::RightWallRear),
                self.group(Group::RightWallMid),
                self.group(Group::RightWallFront),
            ],
            outcome,
        );
    }

    fn redistribute_for_no_side(&self, gains: &mut [f32], outcome: &mut ZoneOutcome) {
        const EMPTY: &[usize] = &[];

        // Wall fronts fold onto the same-side screen.
        self.redistribute(
            gains,
            self.group(Group::LeftWallFront),
            [self.group(Group::LeftScreen), EMPTY, EMPTY],
            outcome,
        );

        // Wall mids split between screen and rear wall. When a side has
        // neither a rear wall nor a wall-rear section, the mid speakers
        // are the rear-most on that side; moving them would collapse
        // everything onto the screen, so they stay.
        if self.group(Group::LeftRearWall).is_empty()
            && self.group(Group::LeftWallRear).is_empty()
        {
            if !self.group(Group::LeftWallMid).is_empty() {
                outcome.dropped_sources += 1;
            }
        } else {
            let targets = self.concat(&[Group::LeftScreen, Group::LeftRearWall]);
            self.redistribute(
                gains,
                self.group(Group::LeftWallMid),
                [&targets, EMPTY, EMPTY],
                outcome,
            );
        }

        // Wall rears fold onto the same-side rear wall.
        self.redistribute(
            gains,
            self.group(Group::LeftWallRear),
            [self.group(Group::LeftRearWall), EMPTY, EMPTY],
            outcome,
        );

        self.redistribute(
            gains,
            self.group(Group::RightWallFront),
            [self.group(Group::RightScreen), EMPTY, EMPTY],
            outcome,
        );

        if self.group(Group::RightRearWall).is_empty()
            && self.group(Group::RightWallRear).is_empty()
        {
            if !self.group(Group::RightWallMid).is_empty() {
                outcome.dropped_sources += 1;
            }
        } else {
            let targets = self.concat(&[Group::RightScreen, Group::RightRearWall]);
            self.redistribute(
                gains,
                self.group(Group::RightWallMid),
                [&targets, EMPTY, EMPTY],
                outcome,
            );
        }

        self.redistribute(
            gains,
            self.group(Group::RightWallRear),
            [self.group(Group::RightRearWall), EMPTY, EMPTY],
            outcome,
        );
    }

    fn redistribute_for_center_back(&self, gains: &mut [f32], outcome: &mut ZoneOutcome) {
        // CenterBack is NoSide followed by emptying the screen flanks
        // into the screen center.
        self.redistribute_for_no_side(gains, outcome);

        const EMPTY: &[usize] = &[];
        let screen_flanks = self.concat(&[Group::LeftScreen, Group::RightScreen]);
        self.redistribute(
            gains,
            &screen_flanks,
            [self.group(Group::CenterScreen), EMPTY, EMPTY],
            outcome,
        );
    }

    fn redistribute_for_screen_only(&self, gains: &mut [f32], outcome: &mut ZoneOutcome) {
        const EMPTY: &[usize] = &[];

        // Center rear prefers the screen center, falling back to the
        // rear walls (which are emptied right after).
        let rear_walls = self.concat(&[Group::LeftRearWall, Group::RightRearWall]);
        self.redistribute(
            gains,
            &self.concat(&[Group::CenterRearWall]),
            [self.group(Group::CenterScreen), &rear_walls, EMPTY],
            outcome,
        );

        // Side walls and rear walls fold onto the same-side screen.
        let left_wall = self.left_wall_all();
        let right_wall = self.right_wall_all();
        self.redistribute(
            gains,
            &left_wall,
            [self.group(Group::LeftScreen), EMPTY, EMPTY],
            outcome,
        );
        self.redistribute(
            gains,
            self.group(Group::LeftRearWall),
            [self.group(Group::LeftScreen), EMPTY, EMPTY],
            outcome,
        );
        self.redistribute(
            gains,
            &right_wall,
            [self.group(Group::RightScreen), EMPTY, EMPTY],
            outcome,
        );
        self.redistribute(
            gains,
            self.group(Group::RightRearWall),
            [self.group(Group::RightScreen), EMPTY, EMPTY],
            outcome,
        );
    }

    fn redistribute_for_surround_only(&self, gains: &mut [f32], outcome: &mut ZoneOutcome) {
        const EMPTY: &[usize] = &[];

        // Pre-step: split the screen center over both screen flanks so
        // its energy reaches both sides evenly.
        let screen_flanks = self.concat(&[Group::LeftScreen, Group::RightScreen]);
        self.redistribute(
            gains,
            self.group(Group::CenterScreen),
            [&screen_flanks, EMPTY, EMPTY],
            outcome,
        );

        // Screen flanks move onto the same-side wall, front-most
        // section first.
        self.redistribute(
            gains,
            self.group(Group::LeftScreen),
            [
                self.group(Group::LeftWallFront),
                self.group(Group::LeftWallMid),
                self.group(Group::LeftWallRear),
            ],
            outcome,
        );
        self.redistribute(
            gains,
            self.group(Group::RightScreen),
            [
                self.group(Group::RightWallFront),
                self.group(Group::RightWallMid),
                self.group(Group::RightWallRear),
            ],
            outcome,
        );
    }

    fn redistribute_for_floor_only(&self, gains: &mut [f32], outcome: &mut ZoneOutcome) {
        const EMPTY: &[usize] = &[];

        // Center ceiling bands first.
        let lr_ceiling_fronts = self.concat(&[Group::LeftCeilingFront, Group::RightCeilingFront]);
        let ceiling_mids_rears = self.concat(&[
            Group::LeftCeilingMid,
            Group::RightCeilingMid,
            Group::LeftCeilingRear,
            Group::RightCeilingRear,
        ]);
        self.redistribute(
            gains,
            self.group(Group::CenterCeilingFront),
            [
                self.group(Group::CenterScreen),
                &lr_ceiling_fronts,
                &ceiling_mids_rears,
            ],
            outcome,
        );

        // The center-ceiling mid band (a lone top speaker in many
        // layouts) drains to the flanking ceilings, or straight down to
        // the side walls when no other ceiling speakers exist.
        let side_ceilings: Vec<usize> = {
            let mut v = self.left_ceiling_all();
            v.extend(self.right_ceiling_all());
            v
        };
        let side_walls: Vec<usize> = {
            let mut v = self.left_wall_all();
            v.extend(self.right_wall_all());
            v
        };
        self.redistribute(
            gains,
            self.group(Group::CenterCeilingMid),
            [&side_ceilings, &side_walls, EMPTY],
            outcome,
        );

        let lr_ceiling_rears = self.concat(&[Group::LeftCeilingRear, Group::RightCeilingRear]);
        let ceiling_mids_fronts = self.concat(&[
            Group::LeftCeilingMid,
            Group::RightCeilingMid,
            Group::LeftCeilingFront,
            Group::RightCeilingFront,
        ]);
        self.redistribute(
            gains,
            self.group(Group::CenterCeilingRear),
            [
                self.group(Group::CenterRearWall),
                &lr_ceiling_rears,
                &ceiling_mids_fronts,
            ],
            outcome,
        );

        // Left and right ceilings fold down section by section.
        let left_front_floor = self.concat(&[Group::LeftScreen, Group::LeftWallFront]);
        self.redistribute(
            gains,
            self.group(Group::LeftCeilingFront),
            [
                &left_front_floor,
                self.group(Group::LeftWallMid),
                self.group(Group::LeftWallRear),
            ],
            outcome,
        );

        let left_wall_ends = self.concat(&[Group::LeftWallFront, Group::LeftWallRear]);
        self.redistribute(
            gains,
            self.group(Group::LeftCeilingMid),
            [self.group(Group::LeftWallMid), &left_wall_ends, EMPTY],
            outcome,
        );

        let left_rear_floor = self.concat(&[Group::LeftRearWall, Group::LeftWallRear]);
        self.redistribute(
            gains,
            self.group(Group::LeftCeilingRear),
            [&left_rear_floor, self.group(Group::LeftWallMid), EMPTY],
            outcome,
        );

        let right_front_floor = self.concat(&[Group::RightScreen, Group::RightWallFront]);
        self.redistribute(
            gains,
            self.group(Group::RightCeilingFront),
            [
                &right_front_floor,
                self.group(Group::RightWallMid),
                self.group(Group::RightWallRear),
            ],
            outcome,
        );

        let right_wall_ends = self.concat(&[Group::RightWallFront, Group::RightWallRear]);
        self.redistribute(
            gains,
            self.group(Group::RightCeilingMid),
            [self.group(Group::RightWallMid), &right_wall_ends, EMPTY],
            outcome,
        );

        let right_rear_floor = self.concat(&[Group::RightRearWall, Group::RightWallRear]);
        self.redistribute(
            gains,
            self.group(Group::RightCeilingRear),
            [&right_rear_floor, self.group(Group::RightWallMid), EMPTY],
            outcome,
        );
    }
}

/// Match a zone gain set against the supported patterns. Fractional
/// gains and unknown combinations map to `AllZonesEnabled`.
fn match_zone_gain_pattern(gains: &[GainPrefix; 9]) -> Zone9Pattern {
    let mut bits = [0u8; 9];
    for (bit, gain) in bits.iter_mut().zip(gains.iter()) {
        *bit = match gain {
            GainPrefix::Silence => 0,
            GainPrefix::Unity => 1,
            GainPrefix::Coded(_) => return Zone9Pattern::AllZonesEnabled,
        };
    }

    for (pattern, mask) in PATTERNS.iter().zip(SUPPORTED_ZONE_GAIN_PATTERNS.iter()) {
        if bits == *mask {
            return *pattern;
        }
    }
    Zone9Pattern::AllZonesEnabled
}

/// Assign one speaker position (IAB cube coordinates) to its zone group.
///
/// Screen: y ~ 0. Rear wall: y ~ 1. Ceiling: z above tolerance. Interior
/// coordinates land on the side walls. The left/right split is at
/// x = 0.5 with a center band on the screen, rear wall and ceiling.
fn map_position_to_group(x: f32, y: f32, z: f32) -> Group {
    if z >= ZONE_MAPPING_TOLERANCE {
        // Overhead speakers.
        if x < 0.5 - ZONE_MAPPING_TOLERANCE {
            if y < FRONT_MID_BOUND_CEILING {
                Group::LeftCeilingFront
            } else if y > MID_REAR_BOUND_CEILING {
                Group::LeftCeilingRear
            } else {
                Group::LeftCeilingMid
            }
        } else if x > 0.5 + ZONE_MAPPING_TOLERANCE {
            if y < FRONT_MID_BOUND_CEILING {
                Group::RightCeilingFront
            } else if y > MID_REAR_BOUND_CEILING {
                Group::RightCeilingRear
            } else {
                Group::RightCeilingMid
            }
        } else if y < FRONT_MID_BOUND_CEILING {
            Group::CenterCeilingFront
        } else if y > MID_REAR_BOUND_CEILING {
            Group::CenterCeilingRear
        } else {
            Group::CenterCeilingMid
        }
    } else if y < ZONE_MAPPING_TOLERANCE {
        // Screen.
        if x < 0.5 - ZONE_MAPPING_TOLERANCE {
            Group::LeftScreen
        } else if x > 0.5 + ZONE_MAPPING_TOLERANCE {
            Group::RightScreen
        } else {
            Group::CenterScreen
        }
    } else if y > 1.0 - ZONE_MAPPING_TOLERANCE {
        // Rear wall.
        if x < 0.5 - ZONE_MAPPING_TOLERANCE {
            Group::LeftRearWall
        } else if x > 0.5 + ZONE_MAPPING_TOLERANCE {
            Group::RightRearWall
        } else {
            Group::CenterRearWall
        }
    } else if x > 0.5 {
        // Right wall.
        if y < FRONT_MID_BOUND_FLOOR {
            Group::RightWallFront
        } else if y > MID_REAR_BOUND_FLOOR {
            Group::RightWallRear
        } else {
            Group::RightWallMid
        }
    } else {
        // Left wall.
        if y < FRONT_MID_BOUND_FLOOR {
            Group::LeftWallFront
        } else if y > MID_REAR_BOUND_FLOOR {
            Group::LeftWallRear
        } else {
            Group::LeftWallMid
        }
    }
}
