mod settings;

pub use settings::{
    AuthMethod, AuthSettings, HubSettings, LogConfig, LogFormat, OtelConfig, PublisherConfig,
    ServerConfig, Settings,
};
