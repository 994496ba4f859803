//! Installing the process-wide tracing subscriber from [`LoggingConfig`].

use std::io;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::types::LoggingConfig;

impl LoggingConfig {
    /// `level` followed by one `module=level` directive per filter entry,
    /// sorted so the result does not depend on map order.
    pub fn directives(&self) -> String {
        let mut filters: Vec<String> = self
            .filters
            .iter()
            .map(|(module, level)| format!("{module}={level}"))
            .collect();
        filters.sort();
        let mut out = self.level.clone().unwrap_or_else(|| "info".to_string());
        for filter in filters {
            out.push(',');
            out.push_str(&filter);
        }
        out
    }

    /// Install the global subscriber. A second call is a no-op, which lets the
    /// unified binary and the per-role binaries share this path.
    pub fn init(&self) {
        let filter = EnvFilter::try_new(self.directives()).unwrap_or_else(|_| EnvFilter::new("info"));
        let writer = match self.output.as_deref() {
            Some("stdout") => BoxMakeWriter::new(io::stdout),
            _ => BoxMakeWriter::new(io::stderr),
        };
        let layer: Box<dyn Layer<Registry> + Send + Sync> = match self.format.as_deref() {
            Some("json") => fmt::layer().json().with_writer(writer).boxed(),
            Some("compact") => fmt::layer().compact().with_writer(writer).boxed(),
            _ => fmt::layer().with_writer(writer).boxed(),
        };
        let _ = tracing_subscriber::registry().with(layer).with(filter).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_default_to_info() {
        assert_eq!(LoggingConfig::default().directives(), "info");
    }

    #[test]
    fn directives_append_sorted_filters() {
        let mut config = LoggingConfig {
            level: Some("debug".into()),
            ..Default::default()
        };
        config.filters.insert("rustls".into(), "warn".into());
        config.filters.insert("spacekit_transport".into(), "trace".into());
        assert_eq!(config.directives(), "debug,rustls=warn,spacekit_transport=trace");
    }
}
