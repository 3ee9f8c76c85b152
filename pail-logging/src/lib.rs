//! Tracing subscriber setup for the `pail` binaries.
//!
//! Settings come from the environment:
//!
//! | Variable | Values | Default |
//! |---|---|---|
//! | `PAIL_LOG_LEVEL` | any `EnvFilter` directive | `info` |
//! | `PAIL_LOG_FORMAT` | `human`, `json` | `human` |
//! | `PAIL_LOG_OUTPUT` | `console`, `file`, `both`, `none` | `console` |
//! | `PAIL_LOG_FILE` | path of the rolling log file | `pail.log` |
//!
//! `RUST_LOG`, when set, replaces the level entirely.

use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::MakeWriter, prelude::*, registry, util::TryInitError, EnvFilter,
};

/// Crates whose chatter is capped at `warn` regardless of the level.
const QUIET_TARGETS: &[&str] = &["tokio=warn", "hyper=warn", "h2=warn", "aws_smithy_runtime=warn"];

// Writes every record to two sinks.
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write(buf);
        let res_b = self.b.write(buf);
        res_a.or(res_b)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B, W1, W2> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a, Writer = W1>,
    B: MakeWriter<'a, Writer = W2>,
    W1: Write + 'a,
    W2: Write + 'a,
{
    type Writer = Tee<W1, W2>;
    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
    None,
}

impl LogOutput {
    fn console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    pub file: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Human,
            output: LogOutput::Console,
            file: PathBuf::from("pail.log"),
        }
    }
}

impl LogSettings {
    /// Read `PAIL_LOG_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup. Unknown values fall
    /// back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let format = match lookup("PAIL_LOG_FORMAT").as_deref().map(str::trim) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Human,
        };
        let output = match lookup("PAIL_LOG_OUTPUT").as_deref().map(str::trim) {
            Some("file") => LogOutput::File,
            Some("both") => LogOutput::Both,
            Some("none") => LogOutput::None,
            _ => LogOutput::Console,
        };
        Self {
            level: lookup("PAIL_LOG_LEVEL")
                .filter(|l| !l.trim().is_empty())
                .unwrap_or(defaults.level),
            format,
            output,
            file: lookup("PAIL_LOG_FILE")
                .filter(|f| !f.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.file),
        }
    }

    /// Same settings at `debug` level.
    pub fn with_debug(mut self) -> Self {
        self.level = "debug".to_string();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        QUIET_TARGETS
            .iter()
            .filter_map(|d| d.parse().ok())
            .fold(filter, EnvFilter::add_directive)
    }

    fn file_parts(&self) -> (PathBuf, PathBuf) {
        let dir = self
            .file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = self
            .file
            .file_name()
            .unwrap_or_else(|| "pail.log".as_ref());
        (dir.to_path_buf(), PathBuf::from(name))
    }
}

/// Install the global subscriber described by `settings`.
///
/// Hold on to the returned guard for as long as file logging should keep
/// flushing.
pub fn init_subscriber(settings: &LogSettings) -> Result<Option<WorkerGuard>, TryInitError> {
    let subscriber = registry().with(settings.env_filter());
    let json = settings.format == LogFormat::Json;
    let mut guard = None;

    let file_writer = if settings.output.file() {
        let (dir, name) = settings.file_parts();
        let appender = tracing_appender::rolling::daily(dir, name);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);
        Some(writer)
    } else {
        None
    };

    match (settings.output.console(), file_writer) {
        (true, Some(file)) => {
            let layer = tracing_subscriber::fmt::layer().with_writer(MakeTee {
                make_a: io::stdout,
                make_b: file,
            });
            if json {
                subscriber.with(layer.json()).try_init()?;
            } else {
                subscriber.with(layer.pretty()).try_init()?;
            }
        }
        (true, None) => {
            let layer = tracing_subscriber::fmt::layer().with_writer(io::stdout);
            if json {
                subscriber.with(layer.json()).try_init()?;
            } else {
                subscriber.with(layer.compact()).try_init()?;
            }
        }
        (false, Some(file)) => {
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file);
            if json {
                subscriber.with(layer.json()).try_init()?;
            } else {
                subscriber.with(layer).try_init()?;
            }
        }
        (false, None) => subscriber.try_init()?,
    }

    Ok(guard)
}
