use anyhow::{Context, Result};
use callinsight::{
    app::{self, AppStateBuilder},
    config::Config,
    handler::middleware::request_log::AccessLogEventFormat,
    models, version,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{
    fmt::time::LocalTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version = version::get_short_version(),
    about = "Call transcript insight service",
    long_about = version::get_version_info()
)]
struct Cli {
    /// Path to the configuration file
    #[clap(
        long,
        global = true,
        help = "Path to the configuration file (TOML format)"
    )]
    conf: Option<String>,
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and exit without starting the server
    CheckConfig,
    /// Drop and re-create every table
    ResetDb,
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            println!("Loading config from: {}", path);
            Config::load(path)?
        }
        None => {
            println!("Loading default config");
            Config::default()
        }
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &Config) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let mut env_filter = EnvFilter::from_default_env();
    if let Some(Ok(level)) = config
        .log_level
        .as_ref()
        .map(|level| level.parse::<LevelFilter>())
    {
        env_filter = env_filter.add_directive(level.into());
    }
    env_filter = env_filter.add_directive("sqlx=warn".parse()?);
    env_filter = env_filter.add_directive("sea_orm=info".parse()?);

    let Some(log_file) = config.log_file.as_ref() else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(LocalTime::rfc_3339())
                    .event_format(AccessLogEventFormat::new(LocalTime::rfc_3339())),
            )
            .try_init()?;
        return Ok(None);
    };

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTime::rfc_3339())
                .event_format(AccessLogEventFormat::new(LocalTime::rfc_3339()))
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .try_init()?;
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(cli.conf.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration validation failed: {:#}", err);
            std::process::exit(1);
        }
    };

    if matches!(cli.command, Some(Commands::CheckConfig)) {
        println!("Configuration is valid.");
        return Ok(());
    }

    println!("Start at {}", Utc::now());
    println!("{}", version::get_version_info());

    let _guard = init_tracing(&config)?;

    if matches!(cli.command, Some(Commands::ResetDb)) {
        if config.is_production() {
            anyhow::bail!("refusing to reset the database in production");
        }
        let db = models::create_db(&config.database_url).await?;
        models::reset_db(&db).await?;
        println!("Database reset: {}", config.database_url);
        return Ok(());
    }

    let state = AppStateBuilder::new()
        .with_config(config)
        .build()
        .await
        .context("failed to build app state")?;

    info!(
        environment = %state.config.environment,
        "starting callinsight on {}",
        state.config.http_addr
    );
    let mut app_future = Box::pin(app::run(state.clone()));

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm_stream =
            signal(SignalKind::terminate()).context("failed to install signal handler")?;
        tokio::select! {
            result = &mut app_future => return result,
            _ = tokio::signal::ctrl_c() => {
                info!("received CTRL+C, shutting down");
            }
            _ = sigterm_stream.recv() => {
                info!("received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = &mut app_future => return result,
            _ = tokio::signal::ctrl_c() => {
                info!("received CTRL+C, shutting down");
            }
        }
    }

    state.token.cancel();
    app_future.await
}
