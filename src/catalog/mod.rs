//! 媒体库：记录持久化（SQLite）与存储容量统计。
//!
//! 子模块：
//! - `models`：MediaRecord / Playlist / StorageUsage
//! - `store`：基于 rusqlite 的记录增删查
//! - `usage`：存储卷容量

pub mod models;
pub mod store;
pub mod usage;

pub use models::{MediaKind, MediaRecord};
pub use store::{CatalogError, SqliteCatalog};
pub use usage::storage_usage;
