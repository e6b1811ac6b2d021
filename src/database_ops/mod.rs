//! Warehouse store access: the store trait, its Postgres and in-memory
//! implementations, and the bulk loader on top of them.

pub mod bulk;
pub mod db;
pub mod memory;
pub mod store;

pub use bulk::{upsert_batch, LoadOutcome, LoadStatus};
pub use db::Db;
pub use memory::MemoryStore;
pub use store::{TableRow, WarehouseStore};
