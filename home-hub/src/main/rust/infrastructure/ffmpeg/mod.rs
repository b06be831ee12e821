mod command_builder;
mod ffmpeg_launcher;

pub use command_builder::DecoderCommandBuilder;
pub use ffmpeg_launcher::FfmpegLauncher;
