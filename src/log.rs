//! The `log` module defines an interface to Orrery's internal logging facilities. This is the
//! channel for messages about the internal behavior of the framework (object creation and
//! removal, script hook dispatch, save/load progress), not a place for simulation output.
//!
//! Host code can nonetheless use these facilities to output messages. This module
//! (re)exports the five logging macros: `error!`, `warn!`, `info!`, `debug!` and `trace!` where
//! `error!` represents the highest-priority log messages and `trace!` the lowest. To emit a log
//! message, simply use one of these macros in your code:
//!
//! ```rust
//! use orrery::info;
//!
//! pub fn do_a_thing() {
//!     info!("A thing is being done.");
//! }
//! ```
//!
//! Logging is _disabled_ by default. Logging messages can be enabled by passing the command line
//! option `--log-level <level>` to the runner. Log messages can also be controlled
//! programmatically. Logging can be enabled/disabled from code using the functions:
//!
//!  - `enable_logging()`: turns on all log messages
//!  - `disable_logging()`: turns off all log messages
//!  - `set_log_level(level: LevelFilter)`: enables only log messages with priority at least `level`
//!
//! In addition, per-module filtering of messages can be configured using `set_module_filter()` /
//! `set_module_filters()` and `remove_module_filter()`:
//!
//! ```rust
//! use orrery::log::{set_module_filter, remove_module_filter, LevelFilter, set_log_level};
//!
//! pub fn setup_logging() {
//!     // Enable `info` log messages globally.
//!     set_log_level(LevelFilter::Info);
//!     // Disable Orrery's internal logging messages.
//!     set_module_filter("orrery", LevelFilter::Off);
//!     // Enable all log messages for the `flight_model` module.
//!     set_module_filter("flight_model", LevelFilter::Trace);
//! }
//! ```

pub use log::{debug, error, info, trace, warn, LevelFilter};

use std::sync::{LazyLock, Mutex};

use crate::HashMap;

#[cfg(feature = "logging")]
use log4rs::append::console::ConsoleAppender;
#[cfg(feature = "logging")]
use log4rs::config::{Appender, Config, Logger, Root};
#[cfg(feature = "logging")]
use log4rs::encode::pattern::PatternEncoder;

// Logging disabled
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Off;

// Use an ISO 8601 timestamp format and color coded level tag
#[cfg(feature = "logging")]
const DEFAULT_LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";

/// A global instance of the logging configuration.
static LOG_CONFIGURATION: LazyLock<Mutex<LogConfiguration>> = LazyLock::new(Mutex::default);

/// Different log level filters can be applied to the log messages emitted from different modules
/// according to the module path (e.g. `"orrery::universe"`). These are stored in the global
/// `LogConfiguration`.
#[derive(Debug, PartialEq)]
struct ModuleLogConfiguration {
    /// The module path this configuration applies to
    module: String,
    /// The maximum log level for this module path
    level: LevelFilter,
}

impl From<(&str, LevelFilter)> for ModuleLogConfiguration {
    fn from((module, level): (&str, LevelFilter)) -> Self {
        Self {
            module: module.to_string(),
            level,
        }
    }
}

/// Holds logging configuration. Its primary responsibility is to keep track of the filter levels
/// of modules and hold a handle to the global logger.
///
/// Because loggers are globally installed, only one instance of this struct should exist. The
/// public API are free functions which fetch the singleton and call the appropriate member
/// function.
struct LogConfiguration {
    /// The "default" level filter for modules ("targets") without an explicitly set filter. A
    /// global filter level of `LevelFilter::Off` disables logging.
    global_log_level: LevelFilter,
    module_configurations: HashMap<String, ModuleLogConfiguration>,

    #[cfg(feature = "logging")]
    /// Handle to the `log4rs` logger.
    root_handle: Option<log4rs::Handle>,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        Self {
            global_log_level: DEFAULT_LOG_LEVEL,
            module_configurations: HashMap::default(),

            #[cfg(feature = "logging")]
            root_handle: None,
        }
    }
}

#[cfg(feature = "logging")]
impl From<&ModuleLogConfiguration> for Logger {
    fn from(module_config: &ModuleLogConfiguration) -> Self {
        Logger::builder().build(module_config.module.clone(), module_config.level)
    }
}

impl LogConfiguration {
    /// Sets the global logger to conform to this `LogConfiguration`.
    #[cfg(feature = "logging")]
    fn set_config(&mut self) {
        let encoder = Box::new(PatternEncoder::new(DEFAULT_LOG_PATTERN));
        let stdout: ConsoleAppender = ConsoleAppender::builder().encoder(encoder).build();
        let mut config =
            Config::builder().appender(Appender::builder().build("stdout", Box::new(stdout)));

        // Add module specific configuration
        for module_config in self.module_configurations.values() {
            config = config.logger(module_config.into());
        }

        // The `Root` determines the global log level
        let root = Root::builder()
            .appender("stdout")
            .build(self.global_log_level);
        let new_config = match config.build(root) {
            Err(e) => {
                panic!("failed to build logging config: {e}");
            }
            Ok(config) => config,
        };

        match self.root_handle {
            Some(ref mut handle) => {
                // The global logger has already been initialized
                handle.set_config(new_config);
            }

            None => {
                // The global logger has not yet been initialized
                self.root_handle = Some(log4rs::init_config(new_config).unwrap());
            }
        }
    }

    /// Without the `logging` feature there is no backend to install; only the facade's
    /// maximum level is kept in sync so disabled macros stay cheap.
    #[cfg(not(feature = "logging"))]
    fn set_config(&mut self) {
        log::set_max_level(self.global_log_level);
    }
}

/// Enables the logger with no global level filter / full logging. Equivalent to
/// `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Disables logging completely. Equivalent to `set_log_level(LevelFilter::Off)`.
pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

/// Sets the global log level. A global filter level of `LevelFilter::Off` disables logging.
pub fn set_log_level(level: LevelFilter) {
    let mut log_configuration = LOG_CONFIGURATION.lock().unwrap();
    log_configuration.global_log_level = level;
    log_configuration.set_config();
}

/// Sets a level filter for the given module path.
pub fn set_module_filter(module_path: &str, level_filter: LevelFilter) {
    let mut log_configuration = LOG_CONFIGURATION.lock().unwrap();
    log_configuration
        .module_configurations
        .insert(module_path.to_string(), (module_path, level_filter).into());
    log_configuration.set_config();
}

/// Removes a module-specific level filter for the given module path. The global level filter will
/// apply to the module.
pub fn remove_module_filter(module_path: &str) {
    let mut log_configuration = LOG_CONFIGURATION.lock().unwrap();
    log_configuration.module_configurations.remove(module_path);
    log_configuration.set_config();
}

/// Sets the level filters for a set of modules according to the provided map. Use this instead of
/// `set_module_filter()` to set filters in bulk.
#[allow(clippy::implicit_hasher)]
pub fn set_module_filters(module_filters: &HashMap<&str, LevelFilter>) {
    let mut log_configuration = LOG_CONFIGURATION.lock().unwrap();
    log_configuration.module_configurations.extend(
        module_filters
            .iter()
            .map(|(module_path, level)| ((*module_path).to_string(), (*module_path, *level).into())),
    );
    log_configuration.set_config();
}

#[cfg(test)]
mod tests {
    use super::*;

    // All of these touch the global configuration singleton, so they live in a single
    // test to keep the mutations ordered.
    #[test]
    fn module_filters_are_recorded() {
        set_module_filter("orrery::universe", LevelFilter::Debug);
        set_module_filter("flight_model", LevelFilter::Trace);
        {
            let config = LOG_CONFIGURATION.lock().unwrap();
            assert_eq!(
                config.module_configurations["orrery::universe"],
                ("orrery::universe", LevelFilter::Debug).into()
            );
            assert_eq!(
                config.module_configurations["flight_model"],
                ("flight_model", LevelFilter::Trace).into()
            );
        }

        remove_module_filter("flight_model");
        {
            let config = LOG_CONFIGURATION.lock().unwrap();
            assert!(!config.module_configurations.contains_key("flight_model"));
        }

        set_log_level(LevelFilter::Warn);
        {
            let config = LOG_CONFIGURATION.lock().unwrap();
            assert_eq!(config.global_log_level, LevelFilter::Warn);
        }
        disable_logging();
    }
}
