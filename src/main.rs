use clipforge::app;

#[tokio::main]
async fn main() {
    if let Err(e) = app::run_main().await {
        eprintln!("clipforge: {e:#}");
        std::process::exit(1);
    }
}
