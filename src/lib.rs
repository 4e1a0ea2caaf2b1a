pub mod appresult;
pub mod auth;
pub mod chain;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod elections;
pub mod verification;

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequest},
    http::{header, HeaderName, Method},
    routing::get,
    Router,
};
use serde_json::Value;
use sqlx::SqlitePool;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};

pub use appresult::{AppError, AppResult};

use chain::VotingContract;
use config::Config;
use elections::VoteFeed;
use verification::{CodeDelivery, LogDelivery};

/// Live subscribers that fall this far behind resynchronise from a snapshot.
const FEED_CAPACITY: usize = 256;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Arc<Config>,
    pub feed: VoteFeed,
    pub delivery: Arc<dyn CodeDelivery>,
    pub chain: Option<VotingContract>,
}

impl AppState {
    pub fn new(config: Config, db_pool: SqlitePool) -> anyhow::Result<Self> {
        let chain = VotingContract::from_config(&config.chain)?;
        if chain.is_none() {
            tracing::warn!("CONTRACT_ADDRESS not set; on-chain routes are disabled");
        }

        Ok(Self {
            db_pool,
            config: Arc::new(config),
            feed: VoteFeed::new(FEED_CAPACITY),
            delivery: Arc::new(LogDelivery),
            chain,
        })
    }
}

pub fn app(state: AppState) -> Router {
    let admin = Router::new()
        .merge(elections::admin_router())
        .merge(verification::admin_router())
        .merge(chain::admin_router())
        .route("/dashboard", get(dashboard::dashboard));

    Router::new()
        .merge(auth::router())
        .merge(verification::router())
        .merge(elections::router())
        .merge(chain::router())
        .nest("/admin", admin)
        .with_state(state)
        .layer(cors())
        .layer(TraceLayer::new_for_http())
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("apikey"),
            HeaderName::from_static("x-client-info"),
        ])
}

/// JSON body whose rejections render as `{ error }` like every other failure.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
        .filter(|value| value.is_object())
        .ok_or(format!("expected object {field} in {self}").into())
    }
}
