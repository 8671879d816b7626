use vaultdex::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; a missing file is not an error
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    cli::run_cli().await
}
