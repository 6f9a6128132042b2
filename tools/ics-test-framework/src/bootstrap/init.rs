/*!
   Functions for initializing each test at the beginning of a Rust test
   session.
*/

use std::env;
use std::fs;
use std::io::IsTerminal;
use std::sync::Once;
use tracing::debug;
use tracing_subscriber::{
    self as ts,
    filter::{EnvFilter, LevelFilter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{handle_generic_error, Error};
use crate::types::config::TestConfig;
use crate::util::random::random_u32;

static INIT: Once = Once::new();

/**
   Initialize the test with a global logger and error handlers,
   read the configuration file and environment variables, and return a
   validated [`TestConfig`].

   The configuration is read from the TOML file named by `ICS_TEST_CONFIG`
   if it is set, and the following environment variables then override
   individual fields: `CHAIN_STORE_DIR`, `PROVIDER_COMMAND`,
   `CONSUMER_COMMAND`, `RELAYER_COMMAND`, `VALIDATOR_KEY_NAME`,
   `COMMIT_INTERVAL` and `HANG_ON_FAIL`.
*/
pub fn init_test() -> Result<TestConfig, Error> {
    let no_color_log = env_flag("NO_COLOR_LOG");

    INIT.call_once(|| {
        let with_color = std::io::stderr().is_terminal() && !no_color_log;

        if with_color {
            // Fails only if a hook is already installed.
            let _ = color_eyre::install();
        }

        install_logger(with_color);
    });

    let mut config = match env::var("ICS_TEST_CONFIG") {
        Ok(path) => {
            debug!("loading test config from {}", path);
            TestConfig::load(path)?
        }
        Err(_) => TestConfig::default(),
    };

    apply_env_overrides(&mut config)?;

    let chain_store_dir = config
        .chain_store_dir
        .join(format!("test-{}", random_u32()));

    fs::create_dir_all(&chain_store_dir)?;

    config.chain_store_dir = fs::canonicalize(chain_store_dir)?;

    config.validate()?;

    Ok(config)
}

fn apply_env_overrides(config: &mut TestConfig) -> Result<(), Error> {
    if let Ok(dir) = env::var("CHAIN_STORE_DIR") {
        config.chain_store_dir = dir.into();
    }

    if let Ok(command) = env::var("PROVIDER_COMMAND") {
        config.provider_command = command;
    }

    if let Ok(command) = env::var("CONSUMER_COMMAND") {
        config.consumer_command = command;
    }

    if let Ok(command) = env::var("RELAYER_COMMAND") {
        config.relayer_command = command;
    }

    if let Ok(key_name) = env::var("VALIDATOR_KEY_NAME") {
        config.validator_key_name = key_name;
    }

    if let Ok(interval) = env::var("COMMIT_INTERVAL") {
        config.commit_interval = humantime::parse_duration(&interval).map_err(handle_generic_error)?;
    }

    if env_flag("HANG_ON_FAIL") {
        config.hang_on_fail = true;
    }

    Ok(())
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|val| val == "1").unwrap_or(false)
}

/**
   Install the [`tracing_subscriber`] logger handlers so that logs will
   be displayed during test.
*/
pub fn install_logger(with_color: bool) {
    // Use log level INFO by default if RUST_LOG is not set.
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let layer = ts::fmt::layer().with_ansi(with_color);

    // Another subscriber may already be installed by the test harness.
    let _ = ts::registry().with(env_filter).with(layer).try_init();
}
