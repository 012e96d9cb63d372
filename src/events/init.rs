use crate::config::LoggingConfig;
use crate::events::dispatcher::init_events;
use crate::events::sink::{ConsoleSink, JsonFileSink, LogSink};
use std::sync::Arc;

/// Initialize events with defaults (console only, info and above)
pub async fn init_default_events() {
    init_events_from_config(None).await
}

/// Initialize events using optional logging config.
pub async fn init_events_from_config(logging: Option<&LoggingConfig>) {
    let mut sinks: Vec<Arc<dyn LogSink>> = Vec::new();

    let disable_console = logging.and_then(|l| l.disable_console).unwrap_or(false);
    if !disable_console {
        let min_level = logging.and_then(|l| l.console_min_level);
        sinks.push(Arc::new(ConsoleSink::new(min_level)));
    }

    if let Some(json_path) = logging.and_then(|l| l.json_path.clone()) {
        let max_bytes = logging
            .and_then(|l| l.json_max_bytes)
            .unwrap_or(5 * 1024 * 1024);
        let rotate = logging.and_then(|l| l.json_rotate).unwrap_or(3);
        match JsonFileSink::new(&json_path, rotate > 0, max_bytes as u64, rotate).await {
            Ok(json_sink) => sinks.push(Arc::new(json_sink)),
            Err(e) => eprintln!("⚠️ Could not open event log '{}': {}", json_path, e),
        }
    }
    init_events(sinks, 1024).await;
}
