use crate::config::AppConfig;
use crate::llm::LanguageModel;
use crate::schema::TableSchema;
use crate::session::orchestrator::Orchestrator;
use crate::session::registry::SessionRegistry;
use crate::sql::QuerySynthesizer;
use crate::warehouse::WarehouseGateway;
use minijinja::Environment;
use std::sync::Arc;
use tracing::info;

/// Shared application state for the web server. Holds no per-session data.
pub struct AppState {
    pub config: AppConfig,
    pub llm: Arc<dyn LanguageModel>,
    pub warehouse: Arc<dyn WarehouseGateway>,
    pub schema: TableSchema,
    pub synthesizer: QuerySynthesizer,
    pub sessions: SessionRegistry,
    pub template_env: Environment<'static>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        llm: Arc<dyn LanguageModel>,
        warehouse: Arc<dyn WarehouseGateway>,
    ) -> Result<Self, minijinja::Error> {
        let schema = config
            .schema
            .clone()
            .unwrap_or_else(TableSchema::inv_transaction);
        info!(
            "Answering questions about table {} ({} columns)",
            schema.name,
            schema.columns.len()
        );

        let idle_timeout = chrono::Duration::seconds(config.session.idle_timeout_secs as i64);

        Ok(Self {
            synthesizer: QuerySynthesizer::new(&schema),
            sessions: SessionRegistry::new(idle_timeout),
            template_env: super::templates::init_templates()?,
            startup_time: chrono::Utc::now(),
            config,
            llm,
            warehouse,
            schema,
        })
    }

    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(
            self.llm.as_ref(),
            self.warehouse.as_ref(),
            &self.synthesizer,
            self.config.session.max_greeting_attempts,
        )
    }
}
