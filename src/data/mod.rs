pub mod ingestion;
pub mod series;
pub mod storage;

pub use ingestion::AlphaVantageClient;
pub use storage::DataLayout;
