use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameStripeError {
    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("Display geometry invalid: {0}")]
    InvalidGeometry(#[from] GeometryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GeometryError {
    #[error("zero dimension (width={width}, height={height}, bytes_per_pixel={bytes_per_pixel})")]
    ZeroDimension { width: u32, height: u32, bytes_per_pixel: u32 },

    #[error("stride {stride} is narrower than a {row_bytes}-byte row")]
    StrideTooSmall { stride: u32, row_bytes: usize },

    #[error("{width}×{height} at {bytes_per_pixel} bytes per pixel overflows the frame size")]
    TooLarge { width: u32, height: u32, bytes_per_pixel: u32 },

    #[error("frame size {size} is below stride × height = {required}")]
    BufferTooSmall { size: usize, required: usize },
}
