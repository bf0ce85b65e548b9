use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` wins when set; otherwise the
/// crate logs at info, or debug with `verbose`. Safe to call twice.
pub fn init(verbose: bool) {
    let fallback = if verbose {
        "dom_bridge=debug"
    } else {
        "dom_bridge=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
