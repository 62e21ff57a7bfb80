use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything a pipeline run can fail with. Every variant is terminal for the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unable to open the input video {path}")]
    SourceUnreadable { path: String },

    #[error("video metadata could not be read (width={width}, height={height}); ensure the file is a valid video")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("unable to initialise the video encoder")]
    SinkInitializationFailed(#[source] BoxError),

    #[error("no frames decoded; the input may be corrupted")]
    NoUsableFrames,

    #[error("processing failed at frame {frame_index}")]
    ProcessingFailed {
        frame_index: u64,
        #[source]
        source: BoxError,
    },
}

impl PipelineError {
    pub(crate) fn sink(err: anyhow::Error) -> Self {
        PipelineError::SinkInitializationFailed(err.into())
    }

    pub(crate) fn processing(frame_index: u64, err: anyhow::Error) -> Self {
        PipelineError::ProcessingFailed {
            frame_index,
            source: err.into(),
        }
    }

    /// True for faults caused by the input itself, false for unexpected
    /// runtime faults. Transports map these to client and server errors.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, PipelineError::ProcessingFailed { .. })
    }
}
