//! Feed-state reconciliation for a shared content pool.
//!
//! Items arrive as Atom/RSS entries on three logical feeds (`shared`,
//! `selected`, `deleted`). Each item's membership is kept in a
//! [`model::FeedTypeSet`] that evolves through [`model::apply_transition`];
//! the [`reconcile`] layer persists the result through [`storage::ItemStore`]
//! and mirrors it into a [`index::SearchIndex`].

pub mod config;
pub mod feed;
pub mod index;
pub mod model;
pub mod reconcile;
pub mod storage;
