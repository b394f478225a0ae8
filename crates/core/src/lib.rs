//! `campus-core`: record foundation building blocks.
//!
//! This crate contains **pure** primitives shared by every resource (no IO, no HTTP).

pub mod entity;
pub mod error;
pub mod id;
pub mod page;
pub mod view;

pub use entity::{same_content, same_identity, Entity};
pub use error::{DomainError, DomainResult};
pub use id::EntityId;
pub use page::{sort_records, Direction, Page, PageRequest, SortOrder, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use view::{render, View};
