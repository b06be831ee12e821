use crate::domain::errors::{DomainError, Result};

/// Default number of diagnostic characters kept per camera
pub const DEFAULT_LOG_SIZE: usize = 1024;

/// Immutable decoder configuration for one camera
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    source: String,
    input_args: Vec<String>,
    output_args: Vec<String>,
    retain_last_frame: bool,
    capture_logs: bool,
    log_size: usize,
}

impl CameraConfig {
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        Self::validate_source(&source)?;

        Ok(Self {
            source,
            input_args: Vec::new(),
            output_args: Vec::new(),
            retain_last_frame: false,
            capture_logs: true,
            log_size: DEFAULT_LOG_SIZE,
        })
    }

    pub fn with_input_args(mut self, args: Vec<String>) -> Self {
        self.input_args = args;
        self
    }

    pub fn with_output_args(mut self, args: Vec<String>) -> Self {
        self.output_args = args;
        self
    }

    pub fn with_last_frame(mut self, retain: bool) -> Self {
        self.retain_last_frame = retain;
        self
    }

    pub fn with_logs(mut self, capture: bool, size: usize) -> Self {
        self.capture_logs = capture;
        self.log_size = size;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn input_args(&self) -> &[String] {
        &self.input_args
    }

    pub fn output_args(&self) -> &[String] {
        &self.output_args
    }

    pub fn retains_last_frame(&self) -> bool {
        self.retain_last_frame
    }

    pub fn captures_logs(&self) -> bool {
        self.capture_logs
    }

    pub fn log_size(&self) -> usize {
        self.log_size
    }

    fn validate_source(source: &str) -> Result<()> {
        if source.trim().is_empty() {
            return Err(DomainError::InvalidDeviceConfig {
                device: "camera".to_string(),
                reason: "media source path is empty".to_string(),
            });
        }
        Ok(())
    }
}
