use crate::domain::value_objects::CameraConfig;

pub struct DecoderCommandBuilder;

impl DecoderCommandBuilder {
    /// Arguments for a decoder that reads the camera source and writes
    /// a raw MJPEG stream to stdout
    pub fn build_args(config: &CameraConfig) -> Vec<String> {
        let mut args = Vec::with_capacity(config.input_args().len() + config.output_args().len() + 8);
        args.extend(config.input_args().iter().cloned());
        args.push("-i".to_string());
        args.push(config.source().to_string());
        args.extend(config.output_args().iter().cloned());
        args.extend(["-c:v", "mjpeg", "-f", "mjpeg", "-"].map(String::from));
        args
    }
}
