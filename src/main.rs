use clap::Parser;
use medication_dashboard::app;
use medication_dashboard::config::{Cli, StoreConfig};
use medication_dashboard::store;

/// Main entry point for the medication dashboard
///
/// Reads the configuration, opens the backing store and serves the
/// dashboard. A store that cannot be opened is fatal: the reason is printed
/// and the process exits with status 1.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Cli::parse().into_config()?;
    log::info!(
        "starting with {} backend on {}",
        backend_name(&config.store),
        config.bind
    );

    let store_config = config.store.clone();
    let opened = tokio::task::spawn_blocking(move || store::open(&store_config)).await?;
    let store = match opened {
        Ok(store) => store,
        Err(e) => {
            log::error!("{e}");
            eprintln!(
                "❌ Could not open the medication store {}. {}Error: {e}",
                config.store.identifier(),
                access_hint(&config.store),
            );
            std::process::exit(1);
        }
    };

    app::run(config, store).await
}

fn backend_name(store: &StoreConfig) -> &'static str {
    match store {
        StoreConfig::Google { .. } => "google",
        StoreConfig::File { .. } => "file",
        StoreConfig::Memory => "memory",
    }
}

fn access_hint(store: &StoreConfig) -> &'static str {
    match store {
        StoreConfig::Google { .. } => {
            "Make sure the service account (or token owner) has Editor access to the spreadsheet. "
        }
        StoreConfig::File { .. } => "Make sure the data directory is writable. ",
        StoreConfig::Memory => "",
    }
}
