use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let demo_mode = std::env::args().any(|arg| arg == "--demo");
    #[cfg(feature = "desktop")]
    if !demo_mode {
        dispatch_console::run_tauri();
        return;
    }

    let result = if demo_mode {
        dispatch_console::run_demo()
    } else {
        dispatch_console::run()
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "dispatch console failed to start");
        std::process::exit(1);
    }
}
