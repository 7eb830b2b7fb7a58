// SPDX-License-Identifier: Apache-2.0

//! SMPTE ST 2098-2 Immersive Audio Bitstream renderer.
//!
//! Consumes parsed IAB frames (beds, objects with time-varying spatial
//! metadata, bed remaps, DLC/PCM audio assets) and renders one block of
//! floating-point PCM per speaker of a target loudspeaker configuration.
//! [`render::IabRenderer`] is the sequential renderer;
//! [`mt::IabRendererMt`] spreads asset decoding and element rendering
//! over a worker pool with identical output semantics.

pub mod config;
pub mod decoder;
pub mod decorr;
pub mod error;
pub mod frame;
pub mod gains;
pub mod geometry;
pub mod interior;
pub mod mt;
pub mod render;
pub mod tables;
pub mod transform;
pub mod vbap;
pub mod zones;

pub use config::{build_render_patches, RenderPatch, RenderSpeaker, RendererConfig};
pub use decoder::{AssetDecodeError, DlcDecoder, NoDlcDecoder};
pub use error::{ConfigError, RenderError, RenderWarning};
pub use frame::{
    AudioDataDlc, AudioDataPcm, BedChannel, BedDefinition, BedRemap, BitDepth, FrameElement,
    FrameRate, FrameTiming, IabFrame, ObjectDefinition, ObjectSubBlock, SampleRate,
};
pub use mt::IabRendererMt;
pub use render::IabRenderer;
pub use tables::{ChannelId, UseCase};
