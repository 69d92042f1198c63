use clap::Parser;
use grantscout::cli::*;
use grantscout::config::AppConfig;
use grantscout::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            let _guard = grantscout::logging::init_logging(None, cli.verbose)?;
            print_error(&format!("Failed to load configuration: {e}"));
            return Err(e);
        }
    };

    let _guard = grantscout::logging::init_logging(Some(&config), cli.verbose)?;
    info!("Configuration loaded successfully");

    match cli.command {
        Commands::Serve { host, port, cors } => handle_serve(&config, host, port, cors).await?,
        Commands::Ask {
            query,
            session,
            top_k,
            all,
            shortlist,
        } => handle_ask(&config, query, session, top_k, all, shortlist).await?,
        Commands::Init { force } => handle_init(&config, force).await?,
        Commands::Import { path } => handle_import(&config, &path).await?,
        Commands::Config => handle_config(&config),
    }

    Ok(())
}
