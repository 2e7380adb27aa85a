use std::{net::SocketAddr, process, sync::Arc};

use bestdeal::{
    application::{
        accounts::AccountService,
        error::AppError,
        products::ProductService,
        repos::{ProductsRepo, UsersRepo},
        session::{SessionManager, SessionStore},
    },
    config,
    infra::{
        db::{PostgresRepositories, PostgresSessionStore},
        error::InfraError,
        http::{self, HttpState, SessionCookieSettings},
        memory::MemoryRepositories,
        sessions::{MemorySessionStore, spawn_session_cleanup},
        telemetry,
    },
    presentation::templates::TemplateCache,
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

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
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::CheckTemplates(_) => run_check_templates(&settings),
    }
}

struct Backends {
    products: Arc<dyn ProductsRepo>,
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionStore>,
}

async fn init_backends(settings: &config::Settings) -> Result<Backends, AppError> {
    let Some(database_url) = settings.database.url.as_deref() else {
        warn!(
            target = "bestdeal::bootstrap",
            "database url is not configured; using in-memory storage"
        );
        let repositories = Arc::new(MemoryRepositories::new());
        return Ok(Backends {
            products: repositories.clone(),
            users: repositories,
            sessions: Arc::new(MemorySessionStore::new()),
        });
    };

    let pool = connect_and_migrate(database_url, settings).await?;
    let repositories = Arc::new(PostgresRepositories::new(pool.clone()));
    Ok(Backends {
        products: repositories.clone(),
        users: repositories,
        sessions: Arc::new(PostgresSessionStore::new(pool)),
    })
}

async fn connect_and_migrate(
    database_url: &str,
    settings: &config::Settings,
) -> Result<sqlx::PgPool, AppError> {
    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(pool)
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let templates = Arc::new(TemplateCache::build(&settings.templates.directory)?);
    let backends = init_backends(&settings).await?;

    let sessions = SessionManager::new(backends.sessions.clone(), settings.session.lifetime);
    let cleanup_handle =
        spawn_session_cleanup(backends.sessions, settings.session.cleanup_interval);

    let state = HttpState {
        products: Arc::new(ProductService::new(backends.products)),
        accounts: Arc::new(AccountService::new(backends.users)),
        templates,
        sessions,
        session_cookie: SessionCookieSettings {
            name: settings.session.cookie_name.clone(),
            secure: settings.session.cookie_secure,
        },
    };

    let result = serve_http(&settings, state).await;

    cleanup_handle.abort();
    let _ = cleanup_handle.await;

    result
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let database_url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    connect_and_migrate(database_url, &settings).await?;
    info!(target = "bestdeal::migrate", "migrations applied");
    Ok(())
}

fn run_check_templates(settings: &config::Settings) -> Result<(), AppError> {
    let templates = TemplateCache::build(&settings.templates.directory)?;
    for name in templates.names() {
        info!(target = "bestdeal::templates", page = name, "page compiled");
    }
    info!(
        target = "bestdeal::templates",
        pages = templates.len(),
        root = %settings.templates.directory.display(),
        "template check passed"
    );
    Ok(())
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state)?;

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "bestdeal::bootstrap",
        addr = %settings.server.addr,
        "starting server"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "bestdeal::bootstrap", "shutdown signal received");
}
