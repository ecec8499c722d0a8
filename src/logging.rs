use env_logger::{Builder, Env};
use log::LevelFilter;

/// Initializes `env_logger` for the binaries.
///
/// `RUST_LOG` takes precedence over `default_level`. Calling this more than
/// once is harmless; later calls are ignored.
pub fn init_logging(default_level: LevelFilter) {
    let env = Env::default().default_filter_or(default_level.as_str());
    let _ = Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
