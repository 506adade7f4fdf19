//! rusty-reddit/crates/rr-core/src/lib.rs
//!
//! The central domain logic and interface definitions for the forum:
//! the vote engine, the comment tree, listings, and the ports plugins implement.

pub mod comments;
pub mod error;
pub mod models;
pub mod pagination;
pub mod service;
pub mod traits;
pub mod validation;
pub mod vote;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use service::{Forum, FrontPage, Session, Thread};
pub use traits::*;
pub use vote::{VoteOutcome, VoteTransition};
