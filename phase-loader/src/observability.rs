use tracing_subscriber::EnvFilter;

/// Structured log setup shared by every binary. `RUST_LOG` still wins over
/// the baked-in info level for the two local crates.
pub fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    for directive in ["phase_loader=info", "phase_client=info"] {
        if let Ok(parsed) = directive.parse() {
            filter = filter.add_directive(parsed);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
