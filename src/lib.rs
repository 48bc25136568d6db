//! Versioned, content-addressed context history for AI agents and LLMs.
//!
//! `context-dag` records every piece of context (instructions, dialogue turns,
//! tool traffic, artifacts) as an immutable commit in a multi-parent DAG, with
//! git-like branches, merges, rebases and cherry-picks. The context compiler
//! turns any point of that history into a flat, ordered message list. Hashing
//! and compilation are deterministic: identical inputs always produce
//! identical outputs, byte-for-byte.
//!
//! ```no_run
//! use context_dag::{CompileRequest, Content, History};
//!
//! let mut history = History::in_memory();
//! history.append(Content::instruction("You are terse."))?;
//! let question = history.append(Content::user("What is a DAG?"))?;
//! history.edit(&question, Content::user("What is a merge-base?"))?;
//!
//! let compiled = history.compile(&CompileRequest::new())?;
//! assert_eq!(compiled.messages.len(), 2);
//! # Ok::<(), context_dag::HistoryError>(())
//! ```

pub mod cache;
pub mod clock;
pub mod compile;
pub mod config;
pub mod content;
pub mod dag;
pub mod error;
pub mod hashing;
pub mod history;
pub mod resolver;
pub mod store;
pub mod types;

pub use clock::{Clock, SteppingClock, SystemClock};
pub use compile::{CompileRequest, CompileResult, CompiledMessage, ContextCompiler, TokenCounter};
pub use config::{CompileConfig, HistoryConfig};
pub use content::{Content, ContentCategory, Metadata, Role};
pub use error::{ErrorKind, HistoryError, HistoryResult, StoreError};
pub use history::{CommitOptions, History, MergeKind, MergeOptions, MergeOutcome};
pub use resolver::{Hazard, Resolution, Resolver};
pub use store::{Backend, FileBackend, MemoryBackend};
pub use types::{BranchName, CommitHash, CommitRecord, ContentHash, Head, Operation, Priority};
