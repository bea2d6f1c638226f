use std::{process, sync::Arc};

use opaline::{
    application::{
        auth::{Authenticator, TokenAuthenticator},
        error::AppError,
        pages::PageService,
        repos::{PagesRepo, UsersRepo},
        users::UserService,
    },
    cache::{CacheConfig, build_page_cache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        memory::MemoryRepositories,
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const LOCAL_ACCOUNT_EMAIL: &str = "local@opaline.invalid";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::IssueToken(args) => run_issue_token(settings, args).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

/// Repositories backing one process: Postgres when a URL is configured,
/// otherwise the in-memory store.
struct Repositories {
    pages: Arc<dyn PagesRepo>,
    users: Arc<dyn UsersRepo>,
    db: Option<Arc<PostgresRepositories>>,
}

async fn connect_database(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or(InfraError::MissingSetting("database.url"))
        .map_err(AppError::from)?;

    let repositories =
        PostgresRepositories::bootstrap(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::from(err)))?;
    Ok(Arc::new(repositories))
}

async fn init_repositories(settings: &config::Settings) -> Result<Repositories, AppError> {
    if settings.database.url.is_none() {
        warn!(
            target = "opaline::bootstrap",
            "no database url configured; using the in-memory store, data and accounts are lost on exit"
        );
        let memory = Arc::new(MemoryRepositories::new());
        return Ok(Repositories {
            pages: memory.clone(),
            users: memory,
            db: None,
        });
    }

    let db = connect_database(settings).await?;
    Ok(Repositories {
        pages: db.clone(),
        users: db.clone(),
        db: Some(db),
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let cache_config = CacheConfig::from(&settings.cache);
    let cache = build_page_cache(&cache_config);

    let tokens = Arc::new(TokenAuthenticator::new(repositories.users.clone()));
    if repositories.db.is_none() {
        issue_local_token(&tokens).await?;
    }
    let authenticator: Arc<dyn Authenticator> = tokens;
    let state = ApiState {
        pages: Arc::new(PageService::new(repositories.pages.clone(), cache)),
        users: Arc::new(UserService::new(repositories.users.clone())),
        authenticator,
        db: repositories.db.clone(),
    };

    info!(
        target = "opaline::bootstrap",
        addr = %settings.server.addr,
        cache_enabled = cache_config.enabled,
        cache_capacity = cache_config.capacity.get(),
        persistent = repositories.db.is_some(),
        "starting http server"
    );

    serve_http(&settings, state).await
}

/// The in-memory store starts without accounts; mint one so the write routes
/// are reachable. The token is printed to stdout and lost on restart.
async fn issue_local_token(tokens: &TokenAuthenticator) -> Result<(), AppError> {
    let issued = tokens
        .issue(LOCAL_ACCOUNT_EMAIL, "Local")
        .await
        .map_err(|err| AppError::unexpected(format!("failed to issue local token: {err}")))?;
    warn!(
        target = "opaline::bootstrap",
        email = LOCAL_ACCOUNT_EMAIL,
        user_id = %issued.user.id,
        "in-memory store: issued a bearer token for a local account"
    );
    println!("{}", issued.token);
    Ok(())
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let shutdown = Arc::new(Notify::new());
    let signal = {
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            shutdown.notify_waiters();
        }
    };
    let grace = settings.server.graceful_shutdown;

    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(signal);
    let deadline = async {
        shutdown.notified().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result.map_err(|err| AppError::from(InfraError::from(err))),
        () = deadline => {
            warn!(
                target = "opaline::bootstrap",
                grace_seconds = grace.as_secs(),
                "graceful shutdown window elapsed; exiting with requests in flight"
            );
            Ok(())
        }
    }
}

async fn wait_for_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(
            target = "opaline::bootstrap",
            error = %err,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    info!(target = "opaline::bootstrap", "shutdown signal received; draining");
}

async fn run_issue_token(
    settings: config::Settings,
    args: config::IssueTokenArgs,
) -> Result<(), AppError> {
    let db = connect_database(&settings).await?;
    let authenticator = TokenAuthenticator::new(db);
    let issued = authenticator
        .issue(&args.email, &args.name)
        .await
        .map_err(|err| AppError::validation(err.to_string()))?;

    info!(
        target = "opaline::bootstrap",
        user_id = %issued.user.id,
        email = %issued.user.email,
        "token issued"
    );
    println!("{}", issued.token);
    Ok(())
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let started = std::time::Instant::now();
    connect_database(&settings).await?;
    info!(
        target = "opaline::bootstrap",
        elapsed_ms = started.elapsed().as_millis() as u64,
        "migrations applied"
    );
    Ok(())
}
