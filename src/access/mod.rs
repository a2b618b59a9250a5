//! Caller Access Control
//!
//! Blacklist, whitelist and the failed-unlock window with automatic
//! promotion: three failed unlock attempts within twelve hours block the
//! number before the next call reaches media.

mod store;

pub use store::{AccessStore, AUTO_BLACKLIST_REASON};
