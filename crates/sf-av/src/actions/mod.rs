//! Media actions used by the stage executors: audio-track extraction,
//! subtitle extraction, and templated external commands.

mod audio;
mod exec;
mod subtitle;

pub use audio::extract_audio;
pub use exec::{exec_command, render_args};
pub use subtitle::extract_subtitle;
