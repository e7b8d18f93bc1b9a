//! Infrastructure layer for the workspace state sync engine.
//!
//! File-backed implementations of the core repository traits, plus path
//! resolution, configuration loading and logging setup.

pub mod config_service;
pub mod logging;
pub mod paths;
pub mod storage;
pub mod toml_side_cache_repository;

pub use config_service::ConfigService;
pub use paths::WsyncPaths;
pub use toml_side_cache_repository::TomlSideCacheRepository;
