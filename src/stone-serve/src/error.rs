use std::io;
use std::path::PathBuf;

/// Message returned to clients when a request carries no image.
pub const NO_IMAGE_UPLOADED: &str = "No image uploaded";

/// Failure to bring the model into memory. Never cached by the provider.
#[derive(thiserror::Error, Debug)]
pub enum ModelLoadError {
    #[error("model artifact not found at {0}")]
    NotFound(PathBuf),

    #[error("could not read preprocessing profile {path}: {source}")]
    Profile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid preprocessing profile {path}: {source}")]
    ProfileFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("model backend failed to load: {0}")]
    Backend(String),
}

/// Errors a single classification request can end with.
#[derive(thiserror::Error, Debug)]
pub enum ClassifyError {
    #[error("{}", NO_IMAGE_UPLOADED)]
    MissingInput,

    #[error("could not decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("could not read image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ClassifyError {
    /// Whether the failure was caused by the caller's input rather than the
    /// service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ClassifyError::MissingInput | ClassifyError::Decode(_))
    }
}

/// Failures while loading the label artifact. Fatal at startup.
#[derive(thiserror::Error, Debug)]
pub enum LabelMapError {
    #[error("could not read label file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("label file is not a JSON object of index to label: {0}")]
    Format(#[from] serde_json::Error),

    #[error("label key {0:?} is not a class index")]
    InvalidIndex(String),

    #[error("label for class {0} is empty")]
    EmptyLabel(usize),

    #[error("class {0} is mapped more than once")]
    DuplicateIndex(usize),
}
