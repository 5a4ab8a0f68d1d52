pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod traits;
pub mod types;

pub use config::{
    AppConfig, ExchangeConfig, ExchangeSchedule, PairConfig, PollingConfig, RotationConfig,
    RotationOrdering, MAX_INTERVAL_MS, MAX_WINDOW_SECS,
};
pub use config_loader::{ConfigLoader, DEFAULT_CONFIG_PATH, ENV_PREFIX};
pub use error::{ConfigError, ExchangeError, ExchangeResult};
pub use events::{QuoteUpdate, SpreadNotification};
pub use traits::ExchangeAdapter;
pub use types::{AssetId, Credentials, ExchangeId, PairId, Quote};
