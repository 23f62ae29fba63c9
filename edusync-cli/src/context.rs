//! Composition root shared by the commands.

use std::sync::Arc;

use edusync_core::{
    DataSnapshot, HttpGateway, MirrorStore, Mutations, QueryGateway, Session, Settings,
    Synchronizer,
};

use crate::config::Config;
use crate::error::CliError;

pub struct AppContext {
    pub config: Config,
    pub store: MirrorStore,
    pub session: Session,
}

impl AppContext {
    /// Opens the local mirror and restores the persisted session.
    pub async fn open(config: &Config) -> Result<Self, CliError> {
        let store = MirrorStore::open(&config.mirror_path()).await?;
        let session = Session::load(&store.settings()).await?;
        Ok(Self {
            config: config.clone(),
            store,
            session,
        })
    }

    pub fn settings(&self) -> Settings {
        self.store.settings()
    }

    pub fn gateway(&self) -> Result<Arc<dyn QueryGateway>, CliError> {
        let gateway = HttpGateway::from_config(
            self.config.database_url.value.as_deref(),
            self.config.sql_endpoint.value.as_deref(),
        )?;
        Ok(Arc::new(gateway))
    }

    /// Synchronizer for this run; mirrors to the local store in offline mode.
    pub fn synchronizer(&self) -> Result<Arc<Synchronizer>, CliError> {
        let sync = Synchronizer::new(self.gateway()?);
        let sync = if self.config.is_offline() {
            sync.with_mirror(self.store.clone())
        } else {
            sync
        };
        Ok(Arc::new(sync))
    }

    pub fn mutations(&self) -> Result<Mutations, CliError> {
        Ok(Mutations::new(self.synchronizer()?))
    }

    /// The data the session can see. Offline mode serves the mirror when it
    /// has data; otherwise a sync pass runs first.
    pub async fn load_snapshot(&self, sync: &Synchronizer) -> Result<Arc<DataSnapshot>, CliError> {
        if self.config.is_offline() && sync.hydrate_from_mirror().await? > 0 {
            return Ok(sync.snapshot());
        }
        sync.sync(&self.session).await?;
        Ok(sync.snapshot())
    }

    pub async fn save_session(&self) -> Result<(), CliError> {
        self.session.save(&self.settings()).await?;
        Ok(())
    }
}
