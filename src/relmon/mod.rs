//! RelMon data model.
//!
//! A [`Job`] owns named [`Category`] values, each holding reference and target
//! [`Item`] lists. Items are normalized once at construction; nothing
//! downstream branches on the shape clients originally sent.

pub mod category;
pub mod item;
pub mod job;
pub mod resources;

pub use category::{Category, CategoryInput, CategoryStatus, HltMode};
pub use item::{sanitize_name, Item, ItemInput, ItemStatus};
pub use job::{CondorStatus, Intent, IntentKind, Job, JobRequest, JobStatus, UserInfo};
pub use resources::Resources;
