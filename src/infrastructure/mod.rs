pub mod memory_cache;
pub mod upstream_client;

pub use memory_cache::MemoryCacheStore;
pub use upstream_client::HttpUpstreamProvider;
