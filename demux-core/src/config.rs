//! Process-wide configuration, externalized as an explicit construction parameter rather than
//! global state, with a `Default` impl exposing sensible process-wide defaults.

use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct GlobalConfig {
    /// Directory the seek engine's on-disk index cache is stored under.
    pub cache_dir: PathBuf,
    pub log_level: log::LevelFilter,
}

impl GlobalConfig {
    /// Build the default configuration, resolving `cache_dir` from `XDG_CACHE_HOME` (or the
    /// platform equivalent).
    pub fn default_global() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache")).join("demux");

        GlobalConfig { cache_dir, log_level: log::LevelFilter::Info }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self::default_global()
    }
}
