pub mod alert;
pub mod allocator;
pub mod catalog;
pub mod command;
pub mod compactor;
pub mod config;
pub mod limits;
pub mod model;
pub mod observability;
pub mod store;
pub mod wal;
pub mod wire;
