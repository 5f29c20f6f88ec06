//! Tracing setup for the quiz backend.
//!
//! `LOG_LEVEL` takes a full `EnvFilter` directive string; when absent or
//! unparsable the default below applies. `LOG_FORMAT=json` switches to
//! structured output, anything else prints human-readable lines.
//!
//! Targets emitted by the crate: `quiz`, `storage`, `generation`, `jlpt_quiz`.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,quiz=debug,storage=debug,generation=debug,jlpt_quiz=debug,tower_http=info,axum=info";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
  Pretty,
  Json,
}

impl LogFormat {
  fn from_env_value(value: Option<&str>) -> Self {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
      Some(v) if v == "json" => LogFormat::Json,
      _ => LogFormat::Pretty,
    }
  }
}

fn filter_from(value: Option<&str>) -> EnvFilter {
  value
    .filter(|v| !v.trim().is_empty())
    .and_then(|v| EnvFilter::try_new(v).ok())
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_tracing() {
  let level = std::env::var("LOG_LEVEL").ok();
  let format = std::env::var("LOG_FORMAT").ok();

  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter_from(level.as_deref()))
    .with_target(true)
    .with_file(true)
    .with_line_number(true);

  // The two builders have different types, so init in each arm.
  match LogFormat::from_env_value(format.as_deref()) {
    LogFormat::Json => builder.json().init(),
    LogFormat::Pretty => builder.init(),
  }
}
