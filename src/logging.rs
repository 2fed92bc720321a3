// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Structured logging setup.
//!
//! The library only emits `tracing` events; binaries decide where they go by
//! calling [`init_logging`] once at startup.

use std::io;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Level used when neither `directive` nor `RUST_LOG` is set.
    pub level: Level,
    /// Log span enter/close events (store, sync and audit entry points).
    pub span_events: bool,
    pub file_line: bool,
    pub target: bool,
    pub ansi: bool,
    pub compact: bool,
    /// Explicit filter directive, e.g. `codi_perf::sync=debug`. Wins over `RUST_LOG`.
    pub directive: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            span_events: false,
            file_line: false,
            target: true,
            ansi: true,
            compact: true,
            directive: None,
        }
    }
}

impl LogConfig {
    /// Verbose output for local debugging.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            span_events: true,
            file_line: true,
            compact: false,
            ..Self::default()
        }
    }

    /// Warnings and errors only, no colors.
    pub fn production() -> Self {
        Self {
            level: Level::WARN,
            target: false,
            ansi: false,
            ..Self::default()
        }
    }

    /// Everything from this crate, for test runs.
    pub fn testing() -> Self {
        Self {
            level: Level::TRACE,
            span_events: true,
            file_line: true,
            ansi: false,
            compact: false,
            directive: Some("codi_perf=trace".to_string()),
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string());
        match self.directive {
            Some(ref directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Keeps the global subscriber installed. Hold it for the life of the program.
#[must_use = "dropping the guard immediately is almost always a mistake"]
pub struct LogGuard {
    _private: (),
}

/// Install the global `tracing` subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> io::Result<LogGuard> {
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = fmt::layer()
        .with_ansi(config.ansi)
        .with_target(config.target)
        .with_file(config.file_line)
        .with_line_number(config.file_line)
        .with_span_events(span_events);

    let registry = tracing_subscriber::registry().with(config.env_filter());
    let installed = if config.compact {
        registry.with(fmt_layer.compact()).try_init()
    } else {
        registry.with(fmt_layer).try_init()
    };
    installed.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(LogGuard { _private: () })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(LogConfig::default().level, Level::INFO);
        assert!(LogConfig::development().span_events);
        assert!(!LogConfig::production().ansi);
        assert_eq!(
            LogConfig::testing().directive.as_deref(),
            Some("codi_perf=trace")
        );
    }

    #[test]
    fn test_builder() {
        let config = LogConfig::default()
            .with_level(Level::DEBUG)
            .with_filter("codi_perf::sync=debug")
            .with_ansi(false);
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.directive.as_deref(), Some("codi_perf::sync=debug"));
        assert!(!config.ansi);
    }
}
