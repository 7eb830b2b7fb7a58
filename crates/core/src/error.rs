// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for renderer construction and per-frame rendering

/// Errors raised while building a renderer configuration or a renderer instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration has no speakers")]
    EmptySpeakerList,
    #[error("configuration has no render patches")]
    NoRenderPatches,
    #[error("unknown target soundfield: {0}")]
    UnknownSoundfield(String),
    #[error("render patch ({0}, {1}, {2}) has a singular speaker basis")]
    InvalidPatch(usize, usize, usize),
    #[error("patch references speaker index {0} outside the speaker list")]
    PatchSpeakerOutOfRange(usize),
    #[error("thread pool size {0} outside supported range 1..=8")]
    BadThreadPoolSize(u32),
}

/// Fatal rendering errors. Any of these poisons the renderer instance;
/// the caller must destroy and recreate it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("output buffer arguments invalid: {0}")]
    BadArguments(&'static str),
    #[error("output channel count {given} below configured count {needed}")]
    ChannelCountTooSmall { given: usize, needed: usize },
    #[error("sample buffer capacity {given} below frame sample count {needed}")]
    SampleBufferTooSmall { given: usize, needed: usize },
    #[error("unsupported frame rate / sample rate combination")]
    UnsupportedRateCombination,
    #[error("DLC asset not defined at fractional frame rates")]
    DlcAtFractionalRate,
    #[error("audio data ID {0} referenced but not present in frame")]
    MissingAsset(u32),
    #[error("asset decode failed for audio data ID {id}: {reason}")]
    DecodeError { id: u32, reason: String },
    #[error("malformed element: {0}")]
    MalformedElement(&'static str),
    #[error("renderer instance poisoned by earlier fatal error")]
    InstancePoisoned,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Non-fatal conditions counted per renderer instance.
///
/// These never abort a frame; occurrence counts are kept in a map and
/// exposed through the renderer so hosts can surface them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderWarning {
    /// A source direction fell outside every render patch and the panner
    /// used the nearest patch instead.
    VbapFallback,
    /// Object zone gains did not match any of the supported patterns and
    /// zone control was skipped for that sub-block.
    ZonePatternUnmatched,
    /// A zone redistribution source had no non-empty target preference and
    /// its energy was dropped.
    ZoneSourceDropped,
}
