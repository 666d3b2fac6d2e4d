mod fetcher;
mod pool;
mod version;

pub use fetcher::{DownloadCache, FetchError, ListFetcher};
pub use pool::{CompileError, CompilersPool};
pub use version::{DetailedVersion, ParseVersionError};
