/// Failure to bring the classifier model into memory.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("Invalid model location `{location}`: {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("Failed to fetch model from {location}: {reason}")]
    Fetch { location: String, reason: String },

    #[error("Malformed model from {location}: {reason}")]
    Malformed { location: String, reason: String },
}

/// Failure while scoring an input tensor.
#[derive(thiserror::Error, Debug)]
pub enum InferenceError {
    #[error("Model is not loaded for prediction")]
    ModelNotLoaded,

    #[error("Input tensor is not available for prediction")]
    MissingInput,

    #[error("Invalid input with dimensions {dims:?}")]
    InvalidInput { dims: Vec<usize> },

    #[error("Model output has no maximum")]
    EmptyOutput,

    #[error("Predicted class {0} does not fit a label")]
    LabelOutOfRange(usize),

    #[error("Could not read model output: {0}")]
    Readback(String),
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Prediction requested on an empty canvas")]
    EmptyInput,

    #[error("Invalid canvas {width}x{height} with stroke width {stroke_width}")]
    InvalidCanvas {
        width: u32,
        height: u32,
        stroke_width: f32,
    },

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl Error {
    /// Status text shown to the user for this error.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Load(_) => "Failed to load the AI model. Please try refreshing the page.",
            Error::EmptyInput => "Please draw a digit first.",
            Error::Inference(InferenceError::ModelNotLoaded) | Error::InvalidCanvas { .. } => {
                "Model or canvas not ready."
            }
            Error::Inference(_) => "Could not recognize the digit. Please try again.",
        }
    }
}
