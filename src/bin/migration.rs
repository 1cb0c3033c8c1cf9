use storefront_api::{config, migrator};
use tracing::{error, info};

/// `migration [up|down [steps]]`, reading the target database from
/// `DATABASE_URL` or the layered application config.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_tracing("info", false);

    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => config::load_config()?.database_url,
    };

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "up".to_string());

    info!("Starting database migration: {}", command);
    let result = match command.as_str() {
        "up" => migrator::run_migration(&database_url).await,
        "down" => {
            let steps = args
                .next()
                .map(|s| s.parse::<u32>())
                .transpose()?
                .unwrap_or(1);
            migrator::rollback_migration(&database_url, steps).await
        }
        other => Err(anyhow::anyhow!(
            "unknown command '{}', expected 'up' or 'down'",
            other
        )),
    };

    if let Err(e) = &result {
        error!("Migration command failed: {}", e);
    }
    result
}
