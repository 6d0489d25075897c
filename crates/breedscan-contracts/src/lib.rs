pub mod breeds;
pub mod error;
pub mod events;
pub mod recognition;

pub use error::RecognitionError;
