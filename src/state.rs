//! Shared application state, built once at startup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::auth::codes::SmsCodeStore;
use crate::auth::jwt::JwtService;
use crate::auth::sms::ZtSmsSender;
use crate::auth::AuthService;
use crate::config::{
    AppPaths, ChatConfig, ConfigService, EmbeddingConfig, HttpConfig, JwtConfig, LlmConfig,
    PubMedConfig, ServerConfig, SmsConfig,
};
use crate::embedding::HttpEmbedder;
use crate::errors::ApiError;
use crate::llm::build_provider;
use crate::pubmed::PubMedClient;
use crate::rag::RagEngine;
use crate::ratelimit::SmsRateLimiter;
use crate::users::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub server: ServerConfig,
    pub auth: Arc<AuthService>,
    pub users: Arc<UserStore>,
    pub engine: Arc<RagEngine>,
    pub sms_limiter: Arc<SmsRateLimiter>,
    pub started_at: Instant,
}

impl AppState {
    pub async fn initialize() -> Result<Self, ApiError> {
        let paths = Arc::new(AppPaths::new());
        let config = ConfigService::new(paths.clone());

        let server: ServerConfig = config.section("server")?;
        let jwt_config: JwtConfig = config.section("jwt")?;
        let sms_config: SmsConfig = config.section("sms")?;
        let pubmed_config: PubMedConfig = config.section("pubmed")?;
        let embedding_config: EmbeddingConfig = config.section("embedding")?;
        let llm_config: LlmConfig = config.section("llm")?;
        let chat_config: ChatConfig = config.section("chat")?;
        let http_config: HttpConfig = config.section("http")?;

        let timeout = Duration::from_secs(http_config.timeout_secs);

        let options = SqliteConnectOptions::new()
            .filename(&paths.db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let users = Arc::new(UserStore::new(pool.clone()).await?);
        let codes = SmsCodeStore::new(pool).await?;
        let jwt = JwtService::new(jwt_config)?;
        let sms = ZtSmsSender::new(sms_config, timeout)?;
        let auth = Arc::new(AuthService::new(codes, users.as_ref().clone(), jwt, sms));

        let source = Arc::new(PubMedClient::new(pubmed_config, timeout)?);
        let embedder = Arc::new(HttpEmbedder::new(embedding_config, timeout)?);
        let provider = build_provider(&llm_config, timeout)?;
        let engine = Arc::new(RagEngine::new(source, embedder, provider, chat_config.top_k));

        Ok(Self {
            paths,
            server,
            auth,
            users,
            engine,
            sms_limiter: Arc::new(SmsRateLimiter::new()),
            started_at: Instant::now(),
        })
    }
}
