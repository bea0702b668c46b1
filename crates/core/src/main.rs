use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env from CWD, falling back to the executable's directory
    // (deployed layout).
    if dotenvy::dotenv().is_err() {
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
    tracing_subscriber::fmt::init();

    let cli = mantle_core::cli::Cli::parse();
    match cli.command {
        None => mantle_core::cli::dispatch(mantle_core::cli::Commands::Demo).await,
        Some(cmd) => mantle_core::cli::dispatch(cmd).await,
    }
}
