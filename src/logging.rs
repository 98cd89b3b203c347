use crate::config::Environment;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. Client crates stay at `warn` so
/// upstream calls are visible through our own spans only.
fn default_filter(env: &Environment) -> &'static str {
    match env {
        Environment::Dev => "invoice_bot=debug,tower_http=debug,hyper=warn,reqwest=warn,info",
        Environment::Staging => "invoice_bot=debug,tower_http=info,hyper=warn,reqwest=warn,info",
        Environment::Prod => "invoice_bot=info,tower_http=info,hyper=warn,reqwest=warn,warn",
    }
}

pub fn init_logging(env: &Environment) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(env)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(env.is_dev())
        .with_line_number(env.is_dev());

    if env.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json().flatten_event(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.pretty())
            .init();
    }

    tracing::info!(
        env = ?env,
        version = env!("CARGO_PKG_VERSION"),
        "Logging initialized"
    );
}
