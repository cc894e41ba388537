pub mod config;
pub mod errors;
pub mod types;

pub use config::ComposerConfig;
pub use errors::{FrameStripeError, GeometryError};
pub use types::*;
