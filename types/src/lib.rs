//! Shared data model for the face recognition core.
//!
//! Every component crate (`facesrec-index`, `facesrec-store`, `facesrec-cache`,
//! `facesrec-coordinator`, `facesrec-batch`) depends on this crate for the
//! entities it passes across its public boundary. Nothing in here talks to a
//! database, a graph, or a network socket — it is the vocabulary, not the
//! implementation.

pub mod descriptor;
pub mod error;
pub mod job;
pub mod profile;
pub mod result;
pub mod user;

pub use descriptor::{Descriptor, DescriptorParseError, JobId, Label, UserId, DESCRIPTOR_DIM};
pub use error::CoreError;
pub use job::{Job, JobError, JobOptions, JobResult, JobStatus};
pub use profile::{DetectionMode, RecognitionProfile};
pub use result::{CachedResult, IdentifyOutcome, Match};
pub use user::{FaceBox, IndexEntry, User};
