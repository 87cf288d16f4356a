//! Timelines over the peer directory.
//!
//! A [`Timeline`] shows the history of one individual or contact method as
//! a tree of time categories, conversation groups and events. It is built
//! from the [`Directory`](peerdir_core::Directory) and kept current by
//! feeding it the directory's notifications.

pub mod node;
pub mod peers;
pub mod time_category;
pub mod timeline;

pub use node::{GroupKind, GroupSummary, Node, NodeId, NodeKind};
pub use peers::PeersTimeline;
pub use time_category::TimeCategory;
pub use timeline::{Grouping, Timeline, TimelineChange, TimelineSource};

#[cfg(test)]
mod tests;
