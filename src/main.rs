use std::sync::Arc;

use tracing::{error, info};

use spike::app::{self, AppState};
use spike::config::Settings;
use spike::users::{BcryptHasher, MemoryUserRepository, PgUserRepository, UserRepository, UserService};
use spike::{Error, Pipeline, Server, db, telemetry};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let settings = Settings::load()?;
    telemetry::init(&settings.log)?;

    info!(
        service = %settings.app.name,
        version = %settings.app.version,
        env = %settings.app.env,
        "starting"
    );

    if let Err(e) = run(settings).await {
        error!(error = %e, "server failed");
        return Err(e);
    }
    Ok(())
}

async fn run(settings: Settings) -> Result<(), Error> {
    let repo: Arc<dyn UserRepository> = match settings.database.url.as_deref() {
        Some(url) => {
            let pool = db::connect(url, settings.database.max_connections).await?;
            db::migrate(&pool, &settings.database.migrations_dir).await?;
            Arc::new(PgUserRepository::new(pool))
        }
        None => {
            info!("DATABASE_URL not set, using in-memory user store");
            Arc::new(MemoryUserRepository::new())
        }
    };

    let users = UserService::new(Arc::clone(&repo), Arc::new(BcryptHasher::default()));
    let state = AppState::new(users, repo, settings.app.version.clone());
    let pipeline = Pipeline::new(&settings.pipeline(), app::router(&state))?;

    Server::bind(settings.listen_addr())
        .with_shutdown_timeout(settings.app.shutdown_timeout)
        .serve(pipeline)
        .await
}
