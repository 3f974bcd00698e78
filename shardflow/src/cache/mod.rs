//! Run-scoped memoization of expensive derived objects.

mod group_cache;
mod group_key;

pub use group_cache::{BuildEvent, GroupCache};
pub use group_key::GroupKey;
