pub use app_error::{AppError, AppResult};
pub use config::{
    global_config, GeneralConfig, IngestConfig, NetworkConfig, RelayConfig, GLOBAL_CONFIG,
};
pub use relay::Relay;
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod config;
mod relay;
mod shutdown;
mod tracing_config;
