use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the global tracing subscriber for the core process.
///
/// Backend child output is forwarded into this subscriber under the
/// `backend` target, so one sink carries both core and backend lines.
pub fn init(verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else {
        match std::env::var("CLIPFORGE_LOG").as_deref() {
            Ok("trace") => Level::TRACE,
            Ok("debug") => Level::DEBUG,
            Ok("warn") => Level::WARN,
            Ok("error") => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
