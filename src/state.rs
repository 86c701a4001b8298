use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::maintenance::Maintenance;
use crate::storage::{ContentStore, KvStore, MemoryKv, PgKv, UserDirectory};
use crate::translate::Translator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub kv: Arc<dyn KvStore>,
    pub users: UserDirectory,
    pub contents: ContentStore,
    pub clock: Arc<dyn Clock>,
    pub translator: Arc<Translator>,
    pub maintenance: Arc<Maintenance>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let quota = config.storage.quota_bytes;

        let kv: Arc<dyn KvStore> = match &config.storage.database_url {
            Some(url) => {
                let pg = PgKv::connect(url, quota).await?;
                if let Err(e) = sqlx::migrate!("./migrations").run(pg.pool()).await {
                    warn!(error = %e, "migrations folder not found or migration failed; continuing");
                }
                info!("using postgres key-value store");
                Arc::new(pg)
            }
            None => {
                info!(?quota, "DATABASE_URL not set, using in-memory key-value store");
                Arc::new(match quota {
                    Some(q) => MemoryKv::with_quota(q),
                    None => MemoryKv::new(),
                })
            }
        };

        Ok(Self::from_parts(config, kv))
    }

    pub fn from_parts(config: AppConfig, kv: Arc<dyn KvStore>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let users = UserDirectory::new(kv.clone());
        let contents = ContentStore::with_limit(kv.clone(), config.maintenance.max_items_per_user);
        let translator = Arc::new(Translator::new(config.translator.clone()));
        let maintenance = Arc::new(Maintenance::new(
            kv.clone(),
            users.clone(),
            contents.clone(),
            clock.clone(),
            config.maintenance.clone(),
        ));

        Self {
            config: Arc::new(config),
            kv,
            users,
            contents,
            clock,
            translator,
            maintenance,
        }
    }

    pub fn fake() -> Self {
        use crate::config::{JwtConfig, MaintenanceConfig, StorageConfig, TranslatorConfig};

        let config = AppConfig {
            storage: StorageConfig {
                database_url: None,
                quota_bytes: None,
            },
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            maintenance: MaintenanceConfig::default(),
            translator: TranslatorConfig::default(),
        };

        Self::from_parts(config, Arc::new(MemoryKv::new()))
    }
}
