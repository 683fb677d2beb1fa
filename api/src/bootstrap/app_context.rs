use std::sync::Arc;

use crate::application::ports::email_port::EmailPort;
use crate::application::ports::object_store_port::ObjectStorePort;
use crate::application::ports::user_repository::UserRepository;
use crate::application::services::tokens::TokenService;
use crate::bootstrap::config::Config;

#[derive(Clone)]
pub struct AppContext {
    pub cfg: Config,
    services: Arc<AppServices>,
}

pub struct AppServices {
    user_repo: Arc<dyn UserRepository>,
    object_store: Arc<dyn ObjectStorePort>,
    mailer: Arc<dyn EmailPort>,
    tokens: TokenService,
}

impl AppServices {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        object_store: Arc<dyn ObjectStorePort>,
        mailer: Arc<dyn EmailPort>,
        tokens: TokenService,
    ) -> Self {
        Self {
            user_repo,
            object_store,
            mailer,
            tokens,
        }
    }
}

impl AppContext {
    pub fn new(cfg: Config, services: AppServices) -> Self {
        Self {
            cfg,
            services: Arc::new(services),
        }
    }

    pub fn user_repo(&self) -> Arc<dyn UserRepository> {
        self.services.user_repo.clone()
    }

    pub fn object_store(&self) -> Arc<dyn ObjectStorePort> {
        self.services.object_store.clone()
    }

    pub fn mailer(&self) -> Arc<dyn EmailPort> {
        self.services.mailer.clone()
    }

    pub fn tokens(&self) -> &TokenService {
        &self.services.tokens
    }

    /// Absolute URL mailed in magic links.
    pub fn login_code_url(&self) -> String {
        let cfg = &self.cfg;
        format!("{}{}/login/code", cfg.backend_host, cfg.api_v1_str)
    }
}
