pub mod assistant;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod links;
pub mod listing;
pub mod realtime;
pub mod records;
pub mod session;
pub mod store;

pub use dispatch::{DispatchBackend, DispatchService, ReconcileReport};
pub use error::{DispatchError, Result};
pub use store::Store;
