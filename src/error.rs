use std::path::PathBuf;

/// Errors produced while loading, transforming, or matching traverses.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two pose sets in a binary operation have different lengths and neither is a singleton.
    #[error("expected equal number of transformations in both or a single transformation in either, got {left} and {right}")]
    ShapeMismatch { left: usize, right: usize },

    /// Translation or rotation input with the wrong dimensionality.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Attitude weight that is negative or not a number.
    #[error("attitude weight must be non-negative, got {0}")]
    InvalidWeight(f64),

    /// A referenced pose, timestamp, log or image location does not exist.
    #[error("missing input: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Requested timestamp lies outside of the pose log.
    #[error("timestamp {0} is outside of the pose log")]
    OutOfRange(i64),

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("could not build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Check that a path exists before trying to read from it.
pub(crate) fn require(path: &std::path::Path) -> Result<(), Error> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::MissingInput(path.to_path_buf()))
    }
}
