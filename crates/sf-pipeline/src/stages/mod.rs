//! Built-in stage executors.

mod audio;
mod command;
mod subtitles;

pub use audio::AudioExtractor;
pub use command::CommandStage;
pub use subtitles::SubtitleExtractor;
