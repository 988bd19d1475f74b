use std::{fmt::Display, str::FromStr};

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum LogLevel {
	Trace,
	Debug,
	Info,
	Warn,
	Error,
}

impl Default for LogLevel {
	fn default() -> Self {
		Self::Info
	}
}

impl Display for LogLevel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Trace => write!(f, "trace"),
			Self::Debug => write!(f, "debug"),
			Self::Info => write!(f, "info"),
			Self::Warn => write!(f, "warn"),
			Self::Error => write!(f, "error"),
		}
	}
}

/// A logging verbosity preset, selected by name from configuration.
#[derive(Debug, Default, Deserialize)]
pub enum LoggingPreset {
	#[default]
	Default,
	Verbose,
	Develop,
	Trace,
}

impl LoggingPreset {
	pub fn get_config(&self) -> LoggingConfig {
		match self {
			Self::Default => LoggingConfig {
				other: LogLevel::Warn,
				core: LogLevel::Info,
				scheduler: LogLevel::Info,
				storage: LogLevel::Info,
			},

			Self::Verbose => LoggingConfig {
				other: LogLevel::Warn,
				core: LogLevel::Debug,
				scheduler: LogLevel::Debug,
				storage: LogLevel::Debug,
			},

			Self::Develop => LoggingConfig {
				other: LogLevel::Debug,
				core: LogLevel::Trace,
				scheduler: LogLevel::Trace,
				storage: LogLevel::Trace,
			},

			Self::Trace => LoggingConfig {
				other: LogLevel::Trace,
				core: LogLevel::Trace,
				scheduler: LogLevel::Trace,
				storage: LogLevel::Trace,
			},
		}
	}
}

/// Per-component log levels, assembled into an [`EnvFilter`].
pub struct LoggingConfig {
	other: LogLevel,
	core: LogLevel,
	scheduler: LogLevel,
	storage: LogLevel,
}

impl From<LoggingConfig> for EnvFilter {
	fn from(value: LoggingConfig) -> Self {
		EnvFilter::from_str(
			&[
				format!("flowmill_core={}", value.core),
				format!("flowmill_scheduler_local={}", value.scheduler),
				format!("flowmill_storage_fs={}", value.storage),
				value.other.to_string(),
			]
			.join(","),
		)
		.unwrap()
	}
}
