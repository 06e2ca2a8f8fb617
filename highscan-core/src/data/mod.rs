//! Data acquisition: providers, batch download with retry, frame
//! normalization and the scan universe.

pub mod download;
pub mod normalize;
pub mod provider;
pub mod schema;
pub mod universe;
pub mod yahoo;

pub use download::{FailureLedger, RetryPolicy, RetryingDownloader};
pub use normalize::FrameNormalizer;
pub use provider::{
    DownloadRequest, FetchError, GroupBy, Interval, MarketDataProvider, Period, RawBar,
    RawDownload, MAX_HISTORY_SESSIONS,
};
pub use schema::{frame_from_rows, FrameError, FrameSchema};
pub use universe::{
    parse_constituents_csv, NseIndexProvider, StaticUniverse, Universe, UniverseError,
    UniverseLoad, UniverseProvider,
};
pub use yahoo::YahooProvider;
