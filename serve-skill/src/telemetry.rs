use tracing::Subscriber;
use tracing::subscriber::set_global_default;
use tracing_subscriber::{EnvFilter, Registry, fmt::MakeWriter, layer::SubscriberExt};

/// Compose an env filter and a fmt layer writing to `sink`. `RUST_LOG`
/// takes precedence over `env_filter` when set.
pub fn get_subscriber(
    env_filter: &str,
    sink: impl for<'a> MakeWriter<'a> + Send + Sync + 'static,
) -> impl Subscriber + Send + Sync {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));
    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(sink);
    Registry::default().with(env_filter).with(formatting_layer)
}

/// Register a subscriber as global default to process span data.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) -> crate::Result<()> {
    set_global_default(subscriber)
        .map_err(|e| crate::Error::Config(format!("failed to set subscriber: {}", e)))
}
