//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PageStatus`: final outcome of one URL (exported, unchanged, not modified, ...)
//! - `FailureReason`: stable reason codes attached to failed URLs
//! - `Validators`: entity tag / last-modified pair sent back on re-crawls
//! - `DomainState`: per-domain request spacing used by the fetcher

mod domain_state;
mod page_state;

pub use domain_state::DomainState;
pub use page_state::{FailureReason, PageStatus, Validators};
