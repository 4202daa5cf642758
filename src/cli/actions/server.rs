use crate::{
    auth::{
        memory::{MemorySessionRepository, MemoryUserRepository},
        storage::{PgSessionRepository, PgUserRepository, SessionRepository, UserRepository},
        CookieCodec, CsrfGuard, SessionManager,
    },
    cli::commands::csrf,
    gatehouse::{self, AppState},
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub memory: bool,
    pub session_secret: SecretString,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub login_path: String,
    pub csrf: csrf::Options,
}

type Repositories = (Arc<dyn UserRepository>, Arc<dyn SessionRepository>);

async fn repositories(args: &Args) -> Result<Repositories> {
    if args.memory {
        warn!("using in-memory storage, users and sessions are lost on restart");
        return Ok((
            Arc::new(MemoryUserRepository::new()),
            Arc::new(MemorySessionRepository::new()),
        ));
    }

    let dsn = args
        .dsn
        .as_deref()
        .ok_or_else(|| anyhow!("missing required argument: --dsn"))?;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    Ok((
        Arc::new(PgUserRepository::new(pool.clone())),
        Arc::new(PgSessionRepository::new(pool)),
    ))
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the session secret is too
/// short, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let (users, sessions) = repositories(&args).await?;

    let cookies = CookieCodec::new(args.session_secret.clone())?
        .with_name(args.cookie_name.clone())
        .with_secure(args.cookie_secure);

    let manager = SessionManager::new(users, sessions).with_login_path(args.login_path.clone());
    let csrf = CsrfGuard::new(args.csrf.clone().into_config());

    info!(
        cookie = cookies.name(),
        login_path = manager.login_path(),
        "starting gatehouse"
    );

    gatehouse::new(args.port, AppState::new(manager, csrf, cookies)).await
}
