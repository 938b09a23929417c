pub mod range_resolver;
pub mod refresher;
pub mod upstream;

pub use range_resolver::{CacheOutcome, RangeResolver, ResolvedRange, ResolverSettings};
pub use refresher::SnapshotRefresher;
pub use upstream::fetch_window;
