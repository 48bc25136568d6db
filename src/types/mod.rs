pub mod commit;
pub mod identifiers;

pub use commit::{Annotation, CommitRecord, Head, Operation, Priority};
pub use identifiers::{BranchName, BranchNameError, CommitHash, ContentHash, HashParseError};
