mod settings;

pub use settings::{
    CacheConfig, LoggingConfig, ResolverSettings, ServerConfig, Settings, ValidationSettings,
};
