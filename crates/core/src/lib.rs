pub mod bisect;
pub mod builds;
pub mod cache;
pub mod config;
pub mod http;
pub mod runner;
pub mod search;
pub mod testing;

pub use bisect::{
    parse_bound_date, BisectError, BisectOutcome, BisectRequest, BisectionCandidate, Bisector,
    RangeCallback, ResultCallback, TestedBuild,
};
pub use builds::{
    fetch_builds, normalize_builds, resolve_order, BuildIndexSource, BuildInfo, BuildOverrides,
    HttpIndexSource, IndexError, OrderError, OrderMode, RawBuild,
};
pub use cache::{CacheError, DownloadCache};
pub use config::{
    load_config, load_config_from_str, validate_config, BisectConfig, CacheConfig, Config,
    ConfigError, IndexConfig, RunnerConfig,
};
pub use http::build_http_client;
pub use runner::{BuildRunner, NightlyRunner, RunRequest, RunStatus, RunnerError};
pub use search::{binary_search_async, Probe, SearchError, SearchOutcome, SearchRange};
