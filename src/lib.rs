//! Loader for document-store reward exports (users, brands, receipts) into a
//! relational warehouse, with a read-only data-quality audit.

pub mod audit;
pub mod cli;
pub mod database_ops;
pub mod normalization;
pub mod pipeline;

pub mod util {
    pub mod env;
    pub mod logging;
}
