//! Domain model for pooled content items.
//!
//! - [`feed_type`] - the `shared`/`selected`/`deleted` membership set
//! - [`transition`] - the pure function that evolves that set
//! - [`item`] - the item record and its tile references

pub mod feed_type;
pub mod item;
pub mod transition;

pub use feed_type::{DeletionReason, FeedType, FeedTypeSet, UnknownFeedType};
pub use item::{parse_tile_refs, Item, TileRefs, SITE_TITLE_LABEL};
pub use transition::{apply as apply_transition, Outcome, RejectReason, TransitionResult};
