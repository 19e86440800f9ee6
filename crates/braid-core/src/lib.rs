//! `braid-core` — model, JSONL codec, and in-memory store for braid.
//!
//! Everything here is storage-engine-free: the JSONL log is the durable
//! representation, and [`MemStore`] provides the full CRUD surface for
//! `--no-db` operation and for merge scratch work. The SQLite cache lives
//! in the `braid` binary crate.
//!
//! # Quick start
//!
//! ```no_run
//! use braid_core::{MemStore, IssueUpdate, Status};
//! use braid_core::model::Issue;
//!
//! let mut store = MemStore::open("path/to/.braid/issues.jsonl").unwrap();
//! store.create_issue(&Issue { title: "New task".into(), ..Default::default() }, "agent").unwrap();
//! store.update_issue("bi-abc123", &IssueUpdate { status: Some(Status::Closed), ..Default::default() }, "agent").unwrap();
//! store.save().unwrap();
//! ```

pub mod error;
pub mod hash;
pub mod jsonl;
pub mod model;
pub mod store;
pub mod update;

pub use error::{BraidError, Result, ValidationError};
pub use model::{Comment, Dependency, DependencyType, Issue, IssueType, Priority, Status};
pub use store::MemStore;
pub use update::IssueUpdate;
