use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize tracing for the service.
///
/// Default filter is `info` for the workspace crates; `RUST_LOG` overrides it.
pub fn init(service_name: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,roster=info,roster_core=info,roster_http=info,roster_fixture=info,{service_name}=info"
        ))
    });

    let builder = fmt().with_env_filter(filter).with_target(false);
    let res = if json {
        builder.json().try_init()
    } else {
        builder.with_ansi(true).try_init()
    };
    res.map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))
}
