use std::{process, sync::Arc, time::Duration};

use metrics::gauge;
use quill::{
    application::{
        error::AppError,
        feed::FeedService,
        follows::FollowService,
        groups::GroupAdminService,
        identity::IdentityService,
        media::MediaStore,
        posts::PostService,
        repos::{
            CommentsRepo, FollowsRepo, GroupsRepo, GroupsWriteRepo, HealthRepo, PostsRepo,
            PostsWriteRepo, UsersRepo,
        },
    },
    cache::{CacheConfig, CacheTrigger, MemoryPageCache, PageCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, HttpState},
        telemetry,
        uploads::UploadStorage,
    },
};
use tokio::{sync::watch, try_join};
use tracing::{Dispatch, Level, debug, dispatcher, error, info, warn};
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
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_handle = app
        .memory_cache
        .clone()
        .map(|cache| spawn_cache_sweep(cache, settings.cache.sweep_interval));

    let signal_handle = tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let result = serve_http(&settings, app.http_state, app.admin_state, shutdown_rx).await;

    signal_handle.abort();
    let _ = signal_handle.await;

    if let Some(handle) = sweep_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    info!(
        target = "quill::migrate",
        pool_size = repositories.pool().size(),
        "migrations applied"
    );
    Ok(())
}

struct ApplicationContext {
    http_state: HttpState,
    admin_state: AdminState,
    memory_cache: Option<Arc<MemoryPageCache>>,
}

/// Connect, then bring the schema up to date; both commands need it.
async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let groups_write_repo: Arc<dyn GroupsWriteRepo> = repositories.clone();
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories.clone();

    let upload_storage = Arc::new(
        UploadStorage::new(settings.uploads.directory.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );
    let media: Arc<dyn MediaStore> = upload_storage.clone();

    let cache_config = CacheConfig::from(&settings.cache);
    let memory_cache = cache_config
        .is_enabled()
        .then(|| Arc::new(MemoryPageCache::new(&cache_config)));
    let cache_trigger = memory_cache.clone().map(|cache| {
        let cache: Arc<dyn PageCache> = cache;
        Arc::new(CacheTrigger::new(cache))
    });

    let mut feeds = FeedService::new(
        users_repo.clone(),
        groups_repo.clone(),
        posts_repo.clone(),
        settings.feed.per_page,
    );
    let mut posts = PostService::new(
        groups_repo,
        posts_repo,
        posts_write_repo,
        comments_repo,
        media,
    );
    let mut groups = GroupAdminService::new(groups_write_repo);
    if let Some(cache) = memory_cache.clone() {
        feeds = feeds.with_cache(cache);
    }
    if let Some(trigger) = cache_trigger.clone() {
        posts = posts.with_trigger(trigger.clone());
        groups = groups.with_trigger(trigger);
    }
    info!(
        enabled = cache_config.is_enabled(),
        ttl_secs = cache_config.ttl.as_secs(),
        capacity = cache_config.capacity,
        "page cache configured"
    );

    let http_state = HttpState {
        feeds: Arc::new(feeds),
        posts: Arc::new(posts),
        follows: Arc::new(FollowService::new(users_repo.clone(), follows_repo)),
        identity: Arc::new(IdentityService::new(users_repo)),
        identity_settings: Arc::new(settings.identity.clone()),
        health: health_repo.clone(),
        upload_storage,
        upload_body_limit: usize::try_from(settings.uploads.max_request_bytes.get())
            .unwrap_or(usize::MAX),
    };

    let admin_state = AdminState {
        cache_trigger,
        groups: Arc::new(groups),
        health: health_repo,
    };

    Ok(ApplicationContext {
        http_state,
        admin_state,
        memory_cache,
    })
}

/// Drop expired pages on a fixed cadence and publish the entry count.
fn spawn_cache_sweep(
    cache: Arc<MemoryPageCache>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            let entries = cache.len();
            gauge!("quill_feed_cache_entries").set(entries as f64);
            if purged > 0 {
                debug!(purged, entries, "swept expired feed pages");
            }
        }
    })
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable; waiting for ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
    shutdown: watch::Receiver<bool>,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listening"
    );

    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(shutdown_requested(shutdown.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(shutdown_requested(shutdown.clone()));

    let grace = settings.server.graceful_shutdown;
    let servers = async {
        try_join!(public_server, admin_server)
            .map_err(|err| AppError::unexpected(format!("server error: {err}")))
    };
    tokio::pin!(servers);

    // Once shutdown starts, in-flight requests get `grace` to finish.
    tokio::select! {
        result = &mut servers => {
            result?;
        }
        _ = async {
            shutdown_requested(shutdown).await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_secs = grace.as_secs(), "graceful shutdown timed out");
        }
    }
    Ok(())
}

async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
