// SPDX-License-Identifier: Apache-2.0

//! Immutable lookup tables for bed channels and target soundfields
//!
//! Channel identities and nominal speaker positions follow ST 2098-2:2019
//! (ST 428-12 + ST 2098-5 definitions) plus the ten ITU-R BS.2051-2
//! channels added in the 2019 revision. Soundfield URIs map to the IAB
//! use cases used for conditional element gating.

use serde::{Deserialize, Serialize};

use crate::geometry::Vector3;
use crate::transform::{sphere_to_cube, CubePosition};

/// Polar speaker position in degrees: radius, azimuth (left negative),
/// elevation (up positive).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolarPosition {
    pub radius: f32,
    pub azimuth: f32,
    pub elevation: f32,
}

impl PolarPosition {
    pub const fn new(radius: f32, azimuth: f32, elevation: f32) -> Self {
        Self {
            radius,
            azimuth,
            elevation,
        }
    }

    pub fn to_vbap(&self) -> Vector3 {
        Vector3::from_polar(self.radius, self.azimuth, self.elevation)
    }
}

/// Bed channel identifiers defined by ST 2098-2:2019.
///
/// Discriminants match the channel ID codes carried in the bitstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ChannelId {
    Left = 0,
    LeftCenter = 1,
    Center = 2,
    RightCenter = 3,
    Right = 4,
    LeftSideSurround = 5,
    LeftSurround = 6,
    LeftRearSurround = 7,
    RightRearSurround = 8,
    RightSideSurround = 9,
    RightSurround = 10,
    LeftTopSurround = 11,
    RightTopSurround = 12,
    Lfe = 13,
    LeftHeight = 14,
    RightHeight = 15,
    CenterHeight = 16,
    LeftSurroundHeight = 17,
    RightSurroundHeight = 18,
    LeftSideSurroundHeight = 19,
    RightSideSurroundHeight = 20,
    LeftRearSurroundHeight = 21,
    RightRearSurroundHeight = 22,
    TopSurround = 23,
    // ITU-R BS.2051-2 additions.
    LeftTopFront = 24,
    RightTopFront = 25,
    LeftTopBack = 26,
    RightTopBack = 27,
    TopSideLeft = 28,
    TopSideRight = 29,
    Lfe1 = 30,
    Lfe2 = 31,
    FrontLeft = 32,
    FrontRight = 33,
}

impl ChannelId {
    pub const ALL: [ChannelId; 34] = [
        ChannelId::Left,
        ChannelId::LeftCenter,
        ChannelId::Center,
        ChannelId::RightCenter,
        ChannelId::Right,
        ChannelId::LeftSideSurround,
        ChannelId::LeftSurround,
        ChannelId::LeftRearSurround,
        ChannelId::RightRearSurround,
        ChannelId::RightSideSurround,
        ChannelId::RightSurround,
        ChannelId::LeftTopSurround,
        ChannelId::RightTopSurround,
        ChannelId::Lfe,
        ChannelId::LeftHeight,
        ChannelId::RightHeight,
        ChannelId::CenterHeight,
        ChannelId::LeftSurroundHeight,
        ChannelId::RightSurroundHeight,
        ChannelId::LeftSideSurroundHeight,
        ChannelId::RightSideSurroundHeight,
        ChannelId::LeftRearSurroundHeight,
        ChannelId::RightRearSurroundHeight,
        ChannelId::TopSurround,
        ChannelId::LeftTopFront,
        ChannelId::RightTopFront,
        ChannelId::LeftTopBack,
        ChannelId::RightTopBack,
        ChannelId::TopSideLeft,
        ChannelId::TopSideRight,
        ChannelId::Lfe1,
        ChannelId::Lfe2,
        ChannelId::FrontLeft,
        ChannelId::FrontRight,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Short speaker label as used in renderer configurations.
    pub fn name(self) -> &'static str {
        match self {
            ChannelId::Left => "L",
            ChannelId::LeftCenter => "LC",
            ChannelId::Center => "C",
            ChannelId::RightCenter => "RC",
            ChannelId::Right => "R",
            ChannelId::LeftSideSurround => "LSS",
            ChannelId::LeftSurround => "LS",
            ChannelId::LeftRearSurround => "LRS",
            ChannelId::RightRearSurround => "RRS",
            ChannelId::RightSideSurround => "RSS",
            ChannelId::RightSurround => "RS",
            ChannelId::LeftTopSurround => "LTS",
            ChannelId::RightTopSurround => "RTS",
            ChannelId::Lfe => "LFE",
            ChannelId::LeftHeight => "LH",
            ChannelId::RightHeight => "RH",
            ChannelId::CenterHeight => "CH",
            ChannelId::LeftSurroundHeight => "LSH",
            ChannelId::RightSurroundHeight => "RSH",
            ChannelId::LeftSideSurroundHeight => "LSSH",
            ChannelId::RightSideSurroundHeight => "RSSH",
            ChannelId::LeftRearSurroundHeight => "LRSH",
            ChannelId::RightRearSurroundHeight => "RRSH",
            ChannelId::TopSurround => "TS",
            ChannelId::LeftTopFront => "LTF",
            ChannelId::RightTopFront => "RTF",
            ChannelId::LeftTopBack => "LTB",
            ChannelId::RightTopBack => "RTB",
            ChannelId::TopSideLeft => "TSSL",
            ChannelId::TopSideRight => "TSSR",
            ChannelId::Lfe1 => "LFE1",
            ChannelId::Lfe2 => "LFE2",
            ChannelId::FrontLeft => "FL",
            ChannelId::FrontRight => "FR",
        }
    }

    pub fn from_name(name: &str) -> Option<ChannelId> {
        ChannelId::ALL.iter().copied().find(|c| c.name() == name)
    }

    pub fn is_lfe(self) -> bool {
        matches!(self, ChannelId::Lfe | ChannelId::Lfe1 | ChannelId::Lfe2)
    }

    /// The channel's associated speaker URI. Used to locate the channel's
    /// slot in the renderer output when the target layout carries the
    /// same speaker.
    pub fn uri(self) -> &'static str {
        match self {
            ChannelId::Left => "urn:smpte:ul:060E2B34.0401010D.03020101.00000000",
            ChannelId::LeftCenter => "urn:smpte:ul:060E2B34.0401010D.0302010B.00000000",
            ChannelId::Center => "urn:smpte:ul:060E2B34.0401010D.03020103.00000000",
            ChannelId::RightCenter => "urn:smpte:ul:060E2B34.0401010D.0302010C.00000000",
            ChannelId::Right => "urn:smpte:ul:060E2B34.0401010D.03020102.00000000",
            ChannelId::LeftSideSurround => "urn:smpte:ul:060E2B34.0401010D.03020107.00000000",
            ChannelId::LeftSurround => "urn:smpte:ul:060E2B34.0401010D.03020105.00000000",
            ChannelId::LeftRearSurround => "urn:smpte:ul:060E2B34.0401010D.03020109.00000000",
            ChannelId::RightRearSurround => "urn:smpte:ul:060E2B34.0401010D.0302010A.00000000",
            ChannelId::RightSideSurround => "urn:smpte:ul:060E2B34.0401010D.03020108.00000000",
            ChannelId::RightSurround => "urn:smpte:ul:060E2B34.0401010D.03020106.00000000",
            ChannelId::LeftTopSurround => "http://dts.com/mda/channels#TSL",
            ChannelId::RightTopSurround => "http://dts.com/mda/channels#TSR",
            ChannelId::Lfe => "urn:smpte:ul:060E2B34.0401010D.03020104.00000000",
            ChannelId::LeftHeight => "http://dts.com/mda/channels#LH",
            ChannelId::RightHeight => "http://dts.com/mda/channels#RH",
            ChannelId::CenterHeight => "http://dts.com/mda/channels#CH",
            // The URIs below intentionally carry "Lhs"/"Rhs" orderings per
            // the published channel registry.
            ChannelId::LeftSurroundHeight => "http://dts.com/mda/channels#LHS",
            ChannelId::RightSurroundHeight => "http://dts.com/mda/channels#RHS",
            ChannelId::LeftSideSurroundHeight => "http://dts.com/mda/channels#LSSH",
            ChannelId::RightSideSurroundHeight => "http://dts.com/mda/channels#RSSH",
            ChannelId::LeftRearSurroundHeight => "http://dts.com/mda/channels#LRSH",
            ChannelId::RightRearSurroundHeight => "http://dts.com/mda/channels#RRSH",
            ChannelId::TopSurround => "http://dts.com/mda/channels#TS",
            ChannelId::LeftTopFront => "tag:dts.com,2015:dtsx:channel:LFH",
            ChannelId::RightTopFront => "tag:dts.com,2015:dtsx:channel:RFH",
            ChannelId::LeftTopBack => "tag:dts.com,2015:dtsx:channel:LRH",
            ChannelId::RightTopBack => "tag:dts.com,2015:dtsx:channel:RRH",
            ChannelId::TopSideLeft => "tag:dts.com,2020:dtsx:channel:TSSL",
            ChannelId::TopSideRight => "tag:dts.com,2020:dtsx:channel:TSSR",
            ChannelId::Lfe1 => "tag:dts.com,2015:dtsx:channel:LFE2",
            ChannelId::Lfe2 => "tag:dts.com,2015:dtsx:channel:LFE3",
            ChannelId::FrontLeft => "tag:dts.com,2015:dtsx:channel:LW",
            ChannelId::FrontRight => "tag:dts.com,2015:dtsx:channel:RW",
        }
    }

    /// Nominal polar position per the MDA / nearfield recommended
    /// practice documents.
    pub fn polar_position(self) -> PolarPosition {
        match self {
            ChannelId::Left => PolarPosition::new(1.0, -30.0, 0.0),
            ChannelId::LeftCenter => PolarPosition::new(1.0, -16.1, 0.0),
            ChannelId::Center => PolarPosition::new(1.0, 0.0, 0.0),
            ChannelId::RightCenter => PolarPosition::new(1.0, 16.1, 0.0),
            ChannelId::Right => PolarPosition::new(1.0, 30.0, 0.0),
            ChannelId::LeftSideSurround => PolarPosition::new(1.0, -90.0, 0.0),
            ChannelId::LeftSurround => PolarPosition::new(1.0, -110.0, 0.0),
            ChannelId::LeftRearSurround => PolarPosition::new(1.0, -150.0, 0.0),
            ChannelId::RightRearSurround => PolarPosition::new(1.0, 150.0, 0.0),
            ChannelId::RightSideSurround => PolarPosition::new(1.0, 90.0, 0.0),
            ChannelId::RightSurround => PolarPosition::new(1.0, 110.0, 0.0),
            ChannelId::LeftTopSurround => PolarPosition::new(1.0, -90.0, 60.0),
            ChannelId::RightTopSurround => PolarPosition::new(1.0, 90.0, 60.0),
            ChannelId::Lfe => PolarPosition::new(1.0, 0.0, 0.0),
            ChannelId::LeftHeight => PolarPosition::new(1.0, -30.0, 21.0),
            ChannelId::RightHeight => PolarPosition::new(1.0, 30.0, 21.0),
            ChannelId::CenterHeight => PolarPosition::new(1.0, 0.0, 24.0),
            ChannelId::LeftSurroundHeight => PolarPosition::new(1.0, -110.0, 30.0),
            ChannelId::RightSurroundHeight => PolarPosition::new(1.0, 110.0, 30.0),
            ChannelId::LeftSideSurroundHeight => PolarPosition::new(1.0, -90.0, 30.0),
            ChannelId::RightSideSurroundHeight => PolarPosition::new(1.0, 90.0, 30.0),
            ChannelId::LeftRearSurroundHeight => PolarPosition::new(1.0, -150.0, 21.0),
            ChannelId::RightRearSurroundHeight => PolarPosition::new(1.0, 150.0, 21.0),
            ChannelId::TopSurround => PolarPosition::new(1.0, 0.0, 90.0),
            ChannelId::LeftTopFront => PolarPosition::new(1.0, -24.79, 35.99),
            ChannelId::RightTopFront => PolarPosition::new(1.0, 24.79, 35.99),
            ChannelId::LeftTopBack => PolarPosition::new(1.0, -155.21, 35.99),
            ChannelId::RightTopBack => PolarPosition::new(1.0, 155.21, 35.99),
            ChannelId::TopSideLeft => PolarPosition::new(1.0, -90.0, 30.0),
            ChannelId::TopSideRight => PolarPosition::new(1.0, 90.0, 30.0),
            ChannelId::Lfe1 => PolarPosition::new(1.0, 45.0, -30.0),
            ChannelId::Lfe2 => PolarPosition::new(1.0, -45.0, -30.0),
            ChannelId::FrontLeft => PolarPosition::new(1.0, -60.0, 0.0),
            ChannelId::FrontRight => PolarPosition::new(1.0, 60.0, 0.0),
        }
    }

    /// Nominal Cartesian position on the VBAP sphere.
    pub fn vbap_position(self) -> Vector3 {
        self.polar_position().to_vbap()
    }

    /// Nominal position in the IAB unit cube.
    pub fn iab_position(self) -> CubePosition {
        sphere_to_cube(&self.vbap_position())
    }
}

/// IAB use case tags. Conditional beds and objects render only when their
/// declared use case matches the target (or is [`UseCase::Always`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UseCase {
    Surround5_1,
    Surround7_1Ds,
    Surround7_1Sds,
    Surround9_1Oh,
    Surround11_1Ht,
    Surround13_1Ht,
    Itu2_0A,
    Itu5_1_4D,
    Itu7_1_4J,
    Always,
    NoUseCase,
}

// Soundfield URIs for the ST 2098-2 specified target layouts.
pub const SOUNDFIELD_URI_51: &str = "urn:smpte:ul:060E2B34.0401010D.03020201.00000000";
pub const SOUNDFIELD_URI_71DS: &str = "urn:smpte:ul:060E2B34.0401010D.03020202.00000000";
pub const SOUNDFIELD_URI_71SDS: &str = "urn:smpte:ul:060E2B34.0401010D.03020203.00000000";
pub const SOUNDFIELD_URI_91OH: &str = "http://dts.com/mda/soundfield#91OH";
pub const SOUNDFIELD_URI_111HT: &str = "http://dts.com/mda/soundfield#111HT";
pub const SOUNDFIELD_URI_131HT: &str = "http://dts.com/mda/soundfield#131HT";
pub const SOUNDFIELD_URI_20_ITUA: &str = "tag:dts.com,2020:dtsx:channel-layout:2.0";
pub const SOUNDFIELD_URI_514_ITUD: &str = "tag:dts.com,2015:dtsx:channel-layout:5.1.4";
pub const SOUNDFIELD_URI_714_ITUJ: &str = "tag:dts.com,2015:dtsx:channel-layout:7.1.4";

impl UseCase {
    /// Resolve a target soundfield string to a use case. Accepts both the
    /// registered soundfield URIs and the short labels used by renderer
    /// configurations.
    pub fn from_soundfield(soundfield: &str) -> Option<UseCase> {
        match soundfield {
            SOUNDFIELD_URI_51 | "5.1" => Some(UseCase::Surround5_1),
            SOUNDFIELD_URI_71DS | "7.1DS" | "7.1" => Some(UseCase::Surround7_1Ds),
            SOUNDFIELD_URI_71SDS | "7.1SDS" => Some(UseCase::Surround7_1Sds),
            SOUNDFIELD_URI_91OH | "9.1OH" => Some(UseCase::Surround9_1Oh),
            SOUNDFIELD_URI_111HT | "11.1HT" => Some(UseCase::Surround11_1Ht),
            SOUNDFIELD_URI_131HT | "13.1HT" => Some(UseCase::Surround13_1Ht),
            SOUNDFIELD_URI_20_ITUA | "2.0" | "ITU-A" => Some(UseCase::Itu2_0A),
            SOUNDFIELD_URI_514_ITUD | "5.1.4" | "ITU-D" => Some(UseCase::Itu5_1_4D),
            SOUNDFIELD_URI_714_ITUJ | "7.1.4" | "ITU-J" => Some(UseCase::Itu7_1_4J),
            _ => None,
        }
    }

    pub fn soundfield_label(self) -> &'static str {
        match self {
            UseCase::Surround5_1 => "5.1",
            UseCase::Surround7_1Ds => "7.1DS",
            UseCase::Surround7_1Sds => "7.1SDS",
            UseCase::Surround9_1Oh => "9.1OH",
            UseCase::Surround11_1Ht => "11.1HT",
            UseCase::Surround13_1Ht => "13.1HT",
            UseCase::Itu2_0A => "2.0",
            UseCase::Itu5_1_4D => "5.1.4",
            UseCase::Itu7_1_4J => "7.1.4",
            UseCase::Always => "Always",
            UseCase::NoUseCase => "NoUseCase",
        }
    }
}
