#![allow(dead_code)]

use ramure::{Config, ConfigBuilder, InMemoryLoader, Template};
use std::sync::{Arc, LazyLock};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static SUBSCRIBER_INIT: LazyLock<()> = LazyLock::new(|| {
    let filter = std::env::var("RAMURE_LOG")
        .ok()
        .and_then(|s| s.parse::<Targets>().ok())
        .unwrap_or_else(|| Targets::new().with_default(tracing::Level::TRACE));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_test_writer()
                .with_target(false)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .with(filter)
        .try_init()
        .ok();
});

/// Install the test subscriber once per process.
///
/// Filter with `RAMURE_LOG`, e.g. `RAMURE_LOG=ramure=debug`.
pub fn setup() {
    #[allow(clippy::let_unit_value)]
    let _ = *SUBSCRIBER_INIT;
}

/// A config whose loader serves `templates`
pub fn config_with(templates: impl IntoIterator<Item = Template>) -> Arc<Config> {
    Arc::new(builder_with(templates).build())
}

pub fn builder_with(templates: impl IntoIterator<Item = Template>) -> ConfigBuilder {
    let loader = templates
        .into_iter()
        .fold(InMemoryLoader::new(), InMemoryLoader::with);
    Config::builder().loader(loader)
}
