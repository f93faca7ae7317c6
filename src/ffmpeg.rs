//! FFmpeg console verbosity.
//!
//! FFmpeg writes its own diagnostics straight to stderr, independent of the
//! `log` facade this crate uses. Decoding a few hundred seek targets across
//! several sources can produce a lot of that output, so the level is exposed
//! here without requiring a direct `ffmpeg-next` dependency.
//!
//! ```no_run
//! use shotalign::FfmpegLogLevel;
//!
//! shotalign::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! assert_eq!("quiet".parse::<FfmpegLogLevel>(), Ok(FfmpegLogLevel::Quiet));
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use ffmpeg_next::util::log::Level;

/// FFmpeg's `AV_LOG_*` verbosity, from silent to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FfmpegLogLevel {
    Quiet,
    Panic,
    Fatal,
    Error,
    /// FFmpeg's own default.
    Warning,
    Info,
    Verbose,
    Debug,
    Trace,
}

const LEVELS: [(FfmpegLogLevel, Level, &str); 9] = [
    (FfmpegLogLevel::Quiet, Level::Quiet, "quiet"),
    (FfmpegLogLevel::Panic, Level::Panic, "panic"),
    (FfmpegLogLevel::Fatal, Level::Fatal, "fatal"),
    (FfmpegLogLevel::Error, Level::Error, "error"),
    (FfmpegLogLevel::Warning, Level::Warning, "warning"),
    (FfmpegLogLevel::Info, Level::Info, "info"),
    (FfmpegLogLevel::Verbose, Level::Verbose, "verbose"),
    (FfmpegLogLevel::Debug, Level::Debug, "debug"),
    (FfmpegLogLevel::Trace, Level::Trace, "trace"),
];

impl FfmpegLogLevel {
    pub fn name(self) -> &'static str {
        LEVELS
            .iter()
            .find(|(level, _, _)| *level == self)
            .map_or("warning", |(_, _, name)| name)
    }

    fn to_ffmpeg_level(self) -> Level {
        LEVELS
            .iter()
            .find(|(level, _, _)| *level == self)
            .map_or(Level::Warning, |(_, ffmpeg_level, _)| *ffmpeg_level)
    }

    fn from_ffmpeg_level(ffmpeg_level: Level) -> Option<Self> {
        LEVELS
            .iter()
            .find(|(_, candidate, _)| *candidate == ffmpeg_level)
            .map(|(level, _, _)| *level)
    }
}

impl Display for FfmpegLogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        let wanted = if wanted == "warn" { "warning".to_string() } else { wanted };
        LEVELS
            .iter()
            .find(|(_, _, name)| *name == wanted)
            .map(|(level, _, _)| *level)
            .ok_or_else(|| format!("unknown FFmpeg log level: {value}"))
    }
}

/// Set what FFmpeg prints to stderr.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// The level FFmpeg currently prints at, if it maps to a known variant.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .and_then(FfmpegLogLevel::from_ffmpeg_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for (level, _, name) in LEVELS {
            assert_eq!(level.to_string(), name);
            assert_eq!(name.parse::<FfmpegLogLevel>(), Ok(level));
        }
        assert_eq!("WARN".parse::<FfmpegLogLevel>(), Ok(FfmpegLogLevel::Warning));
        assert!("loud".parse::<FfmpegLogLevel>().is_err());
    }

    #[test]
    fn ordered_by_verbosity() {
        assert!(FfmpegLogLevel::Quiet < FfmpegLogLevel::Error);
        assert!(FfmpegLogLevel::Debug < FfmpegLogLevel::Trace);
    }
}
