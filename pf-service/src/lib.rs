//! Composition root: wires every subsystem crate into one `Core` and
//! exposes the operations the outside world calls through the `Api`
//! trait, so a transport layer can depend on the trait rather than the
//! concrete wiring underneath it.

pub mod config;
pub mod logging;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use pf_auth::{AuthServer, DeviceMetadata, HttpIdentityVerifier};
use pf_cache::RedisCache;
use pf_cleanup::{JobSweeper, SessionSweeper};
use pf_errors::Error;
use pf_fx::{FxConverter, FxService, HttpRateProvider};
use pf_gold::{GoldConversionEngine, HttpMarketPriceProvider, NormalizedHolding, PurchaseCost};
use pf_importer::{ExecuteImportRequest, ImportExecutor, UndoManager, UndoResult};
use pf_importqueue::{ImportJob, ImportJobQueue, NewImportJob, RedisImportQueue};
use pf_primitives::{Currency, GoldType, GoldUnit, ImportBatchId, ImportJobId, UserId, WalletId};
use pf_session::SessionStore;
use pf_store::{Category, CategoryRepository, PgStore, User, UserRepository, Wallet, WalletRepository, WalletType};

use config::Config;

type AppAuthServer = AuthServer<Arc<PgStore>, Arc<PgStore>, pf_session::postgres::PgSessionRepository, Arc<RedisCache>, HttpIdentityVerifier>;

/// Every collaborator the backend needs, built once at startup and
/// shared behind `Arc` by the HTTP layer, the worker pool, and the
/// cleanup sweepers alike.
pub struct Core {
    pub store: Arc<PgStore>,
    pub queue: Arc<dyn ImportJobQueue>,
    pub auth: AppAuthServer,
    pub fx: Arc<FxService>,
    pub gold: Arc<GoldConversionEngine>,
    pub executor: Arc<ImportExecutor>,
    pub undo: Arc<UndoManager>,
    pub session_sweeper: Arc<SessionSweeper>,
    pub job_sweeper: Arc<JobSweeper>,
    job_ttl_hours: i64,
}

impl Core {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let store = Arc::new(PgStore::connect(&config.database_url, config.db_max_connections).await?);
        let session_repo = pf_session::postgres::PgSessionRepository::new(store.pool().clone());
        let cache = Arc::new(RedisCache::connect(&config.redis_url).await?);
        let queue: Arc<dyn ImportJobQueue> = Arc::new(RedisImportQueue::connect(&config.redis_url).await?);

        let identity = HttpIdentityVerifier::new(config.identity_provider_url.clone());
        let signer = pf_auth::token::TokenSigner::new(config.token_secret.clone().into_bytes());
        let sessions = SessionStore::new(session_repo, cache.clone());
        let auth = AuthServer::new(
            store.clone(),
            store.clone(),
            sessions,
            identity,
            signer,
            config.session_ttl_hours,
        );

        let rate_provider = Arc::new(HttpRateProvider::new(config.fx_provider_url.clone()));
        let fx = Arc::new(FxService::new(rate_provider, config.fx_cache_ttl()));

        let mut gold = GoldConversionEngine::new(fx.clone());
        if let Some(market_url) = &config.gold_market_url {
            let market_provider = Arc::new(HttpMarketPriceProvider::new(market_url.clone()));
            gold = gold.with_market_provider(market_provider, config.gold_cache_ttl());
        }
        let gold = Arc::new(gold);

        let executor = Arc::new(ImportExecutor::new(store.clone(), store.clone(), store.clone()));
        let undo = Arc::new(UndoManager::new(store.clone(), store.clone(), store.clone()));

        let session_sweeper = Arc::new(SessionSweeper::new(
            Arc::new(pf_session::postgres::PgSessionRepository::new(store.pool().clone())),
            cache.clone(),
        ));
        let job_sweeper = Arc::new(JobSweeper::new(queue.clone()));

        Ok(Self {
            store,
            queue,
            auth,
            fx,
            gold,
            executor,
            undo,
            session_sweeper,
            job_sweeper,
            job_ttl_hours: config.job_ttl_hours,
        })
    }
}

/// The operations this backend exposes, independent of whatever
/// transport (HTTP, gRPC, ...) ends up calling into them. Kept as a
/// trait rather than inherent methods on `Core` so a transport layer can
/// depend on `Arc<dyn Api>` instead of the concrete composition.
#[async_trait]
pub trait Api: Send + Sync {
    async fn register_or_login(&self, assertion: &str, device: DeviceMetadata) -> Result<(User, String), Error>;
    async fn verify_auth(&self, token: &str) -> Result<UserId, Error>;
    async fn logout(&self, token: &str) -> Result<(), Error>;

    async fn create_wallet(
        &self,
        user_id: UserId,
        name: &str,
        wallet_type: WalletType,
        currency: Currency,
    ) -> Result<Wallet, Error>;
    async fn list_wallets(&self, user_id: UserId) -> Result<Vec<Wallet>, Error>;
    async fn list_categories(&self, user_id: UserId) -> Result<Vec<Category>, Error>;

    async fn get_fx_rate(&self, from: Currency, to: Currency) -> Result<Decimal, Error>;

    async fn gold_purchase_cost(
        &self,
        quantity: Decimal,
        quantity_unit: GoldUnit,
        price_per_quantity_unit_native_minor: i64,
        gold_type: GoldType,
        wallet_currency: Currency,
    ) -> Result<PurchaseCost, Error>;
    async fn gold_market_price(&self, gold_type: GoldType) -> Result<NormalizedHolding, Error>;

    /// Job TTL (§3 ImportJob.expires_at) is the configured
    /// `PF_JOB_TTL_HOURS`, not a caller-supplied value — every job gets
    /// the same operator-controlled lifetime.
    async fn submit_import_job(
        &self,
        user_id: UserId,
        file_id: String,
        request: ExecuteImportRequest,
    ) -> Result<ImportJob, Error>;
    async fn get_import_job(&self, job_id: ImportJobId) -> Result<Option<ImportJob>, Error>;
    async fn cancel_import_job(&self, job_id: ImportJobId, user_id: UserId) -> Result<(), Error>;
    async fn list_import_jobs(&self, user_id: UserId) -> Result<Vec<ImportJob>, Error>;

    async fn undo_import(&self, user_id: UserId, batch_id: ImportBatchId) -> Result<UndoResult, Error>;
}

#[async_trait]
impl Api for Core {
    async fn register_or_login(&self, assertion: &str, device: DeviceMetadata) -> Result<(User, String), Error> {
        self.auth.register_or_login(assertion, device).await
    }

    async fn verify_auth(&self, token: &str) -> Result<UserId, Error> {
        self.auth.verify_auth(token).await
    }

    async fn logout(&self, token: &str) -> Result<(), Error> {
        self.auth.logout(token).await
    }

    async fn create_wallet(
        &self,
        user_id: UserId,
        name: &str,
        wallet_type: WalletType,
        currency: Currency,
    ) -> Result<Wallet, Error> {
        WalletRepository::create(self.store.as_ref(), user_id, name, wallet_type, currency).await
    }

    async fn list_wallets(&self, user_id: UserId) -> Result<Vec<Wallet>, Error> {
        WalletRepository::list_for_user(self.store.as_ref(), user_id).await
    }

    async fn list_categories(&self, user_id: UserId) -> Result<Vec<Category>, Error> {
        CategoryRepository::list_for_user(self.store.as_ref(), user_id).await
    }

    async fn get_fx_rate(&self, from: Currency, to: Currency) -> Result<Decimal, Error> {
        self.fx.get_rate(from, to).await
    }

    async fn gold_purchase_cost(
        &self,
        quantity: Decimal,
        quantity_unit: GoldUnit,
        price_per_quantity_unit_native_minor: i64,
        gold_type: GoldType,
        wallet_currency: Currency,
    ) -> Result<PurchaseCost, Error> {
        self.gold
            .calculate_total_cost_from_user_input(
                quantity,
                quantity_unit,
                price_per_quantity_unit_native_minor,
                gold_type,
                wallet_currency,
            )
            .await
    }

    async fn gold_market_price(&self, gold_type: GoldType) -> Result<NormalizedHolding, Error> {
        self.gold.latest_market_price(gold_type).await
    }

    async fn submit_import_job(
        &self,
        user_id: UserId,
        file_id: String,
        request: ExecuteImportRequest,
    ) -> Result<ImportJob, Error> {
        let request_json = serde_json::to_value(&request)
            .map_err(|e| Error::internal(format!("failed to serialize import request: {e}")))?;
        let total_count = request.parsed_transactions.len() as u32;
        let wallet_id: WalletId = request.wallet_id;

        self.queue
            .enqueue(NewImportJob {
                job_id: ImportJobId::new(),
                user_id,
                file_id,
                wallet_id,
                request: request_json,
                total_count,
                expires_at: Utc::now() + chrono::Duration::hours(self.job_ttl_hours),
            })
            .await
    }

    async fn get_import_job(&self, job_id: ImportJobId) -> Result<Option<ImportJob>, Error> {
        self.queue.get_job(job_id).await
    }

    async fn cancel_import_job(&self, job_id: ImportJobId, user_id: UserId) -> Result<(), Error> {
        self.queue.cancel_job(job_id, user_id).await
    }

    async fn list_import_jobs(&self, user_id: UserId) -> Result<Vec<ImportJob>, Error> {
        self.queue.get_user_jobs(user_id).await
    }

    async fn undo_import(&self, user_id: UserId, batch_id: ImportBatchId) -> Result<UndoResult, Error> {
        self.undo.undo_import(user_id, batch_id).await
    }
}
