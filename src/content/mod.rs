pub mod metadata;
pub mod payload;

pub use metadata::{Metadata, MetadataValue};
pub use payload::{Content, ContentCategory, MergeRecord, MergeResolution, Role, ToolDirection};
