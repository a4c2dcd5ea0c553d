/// Golf tee-time confirmation email processing module
pub mod extractor;
pub mod processor;

pub use extractor::{ConfirmationExtractor, ConfirmationRecord, Extraction, Rejection};
pub use processor::GolfEmailProcessor;
