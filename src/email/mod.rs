pub mod body;
pub mod common;
pub mod processor_base;

// Re-export commonly used items
pub use body::{extract, MessagePart};
pub use common::{MessageMeta, ProcessingResult};
pub use processor_base::{BaseEmailProcessor, EmailProcessingStrategy};
