use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins; otherwise info for this
/// crate and warn for everything else.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,calnotes=info"));

    let registry = tracing_subscriber::registry().with(filter);
    // A second init (tests, embedding) is not an error.
    let _ = if json {
        registry
            .with(fmt::layer().json().with_target(false))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
}
