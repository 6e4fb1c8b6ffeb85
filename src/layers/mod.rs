mod storage;
pub use storage::*;
mod configuration;
pub use configuration::*;
mod ingestion_consumption;
pub use ingestion_consumption::*;
