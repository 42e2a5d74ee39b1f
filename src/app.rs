use crate::{
    config::Config,
    handler::{self, middleware::request_log::log_requests},
    llm::{InsightGenerator, LlmClient},
    models,
    services::{CallProcessor, RefinementService},
    worker::{ProcessingManagerBuilder, ProcessingQueue},
};
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware, Router,
};
use sea_orm::DatabaseConnection;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

pub struct AppStateInner {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub processor: CallProcessor,
    pub refinement: RefinementService,
    pub queue: ProcessingQueue,
    pub token: CancellationToken,
}

pub type AppState = Arc<AppStateInner>;

pub struct AppStateBuilder {
    pub config: Option<Config>,
    pub db: Option<DatabaseConnection>,
    pub llm_client: Option<Arc<dyn LlmClient>>,
    pub token: Option<CancellationToken>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            db: None,
            llm_client: None,
            token: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_db(mut self, db: DatabaseConnection) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_llm_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm_client = Some(client);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Connects the database, builds the LLM client and starts the processing
    /// worker. Must be called inside a tokio runtime.
    pub async fn build(self) -> Result<AppState> {
        let config = Arc::new(self.config.unwrap_or_default());
        let token = self.token.unwrap_or_default();

        let db = match self.db {
            Some(db) => db,
            None => models::create_db(&config.database_url).await?,
        };

        let generator = match self.llm_client {
            Some(client) => InsightGenerator::new(config.llm.clone(), client),
            None => InsightGenerator::from_config(&config.llm)
                .context("failed to create LLM client")?,
        };
        let generator = Arc::new(generator);

        let processor = CallProcessor::new(db.clone(), generator.clone(), config.limits.clone());
        let refinement = RefinementService::new(db.clone(), generator, config.limits.clone());

        let mut manager = ProcessingManagerBuilder::new()
            .with_cancel_token(token.child_token())
            .with_processor(processor.clone())
            .build()?;
        let queue = manager.queue.clone();
        tokio::spawn(async move { manager.serve().await });

        Ok(Arc::new(AppStateInner {
            config,
            db,
            processor,
            refinement,
            queue,
            token,
        }))
    }
}

/// Re-queues calls a previous run left unfinished.
pub async fn resume_pending_calls(state: &AppState) -> Result<usize> {
    let pending = state.processor.pending_calls().await?;
    for call_id in &pending {
        state.queue.enqueue(*call_id)?;
    }
    if !pending.is_empty() {
        info!(count = pending.len(), "resumed unfinished calls");
    }
    Ok(pending.len())
}

pub async fn run(state: AppState) -> Result<()> {
    let token = state.token.clone();

    if let Err(e) = resume_pending_calls(&state).await {
        warn!("failed to resume unfinished calls: {:#}", e);
    }

    let app = create_router(state.clone());
    let addr: SocketAddr = state
        .config
        .http_addr
        .parse()
        .with_context(|| format!("invalid http_addr {}", state.config.http_addr))?;
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            return Err(anyhow::anyhow!("Failed to bind to {}: {}", addr, e));
        }
    };
    info!("listening on http://{}", addr);

    let shutdown = token.clone();
    let http_task = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await });

    let result = http_task.await;
    token.cancel();
    match result {
        Ok(_) => info!("Server shut down gracefully"),
        Err(e) => {
            tracing::error!("Server error: {}", e);
            return Err(anyhow::anyhow!("Server error: {}", e));
        }
    }
    Ok(())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins = match &config.cors_origins {
        Some(origins) => {
            let values = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %origin, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect::<Vec<_>>();
            AllowOrigin::list(values)
        }
        None => AllowOrigin::any(),
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
        ])
}

pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();
    let skip_paths = Arc::new(vec!["/health".to_string()]);

    let api = handler::api_router();
    let api = if config.api_prefix.is_empty() || config.api_prefix == "/" {
        api
    } else {
        Router::new().nest(&config.api_prefix, api)
    };

    api.merge(handler::health_router())
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(middleware::from_fn_with_state(skip_paths, log_requests))
        .layer(cors_layer(&config))
        .with_state(state)
}
