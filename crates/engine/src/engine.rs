//! Wiring of the pool, the registries and the services.

use std::sync::Arc;

use layouts_core::block_definition::{BlockDefinition, BlockDefinitionRegistry};
use layouts_core::cms::ItemLoader;
use layouts_core::layout_type::{LayoutType, LayoutTypeRegistry};
use layouts_core::query_type::{QueryType, QueryTypeRegistry};
use layouts_core::resolver::{ConditionMatcherRegistry, LayoutResolver, TargetBuilderRegistry};
use layouts_db::DbPool;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::resolver::DbRuleLoader;
use crate::services::{BlockService, CollectionService, LayoutService, RuleService};

/// Everything the deployment registers: layout types, block definitions,
/// query types, resolver kinds and the CMS item loader.
#[derive(Clone)]
pub struct Registries {
    pub layout_types: LayoutTypeRegistry,
    pub block_definitions: BlockDefinitionRegistry,
    pub query_types: QueryTypeRegistry,
    pub targets: Arc<TargetBuilderRegistry>,
    pub conditions: Arc<ConditionMatcherRegistry>,
    pub items: Arc<dyn ItemLoader>,
}

impl Registries {
    /// Empty type registries and the built-in target and condition kinds.
    pub fn new(items: Arc<dyn ItemLoader>) -> Self {
        Self {
            layout_types: LayoutTypeRegistry::new(),
            block_definitions: BlockDefinitionRegistry::new(),
            query_types: QueryTypeRegistry::new(),
            targets: Arc::new(TargetBuilderRegistry::with_defaults()),
            conditions: Arc::new(ConditionMatcherRegistry::with_defaults()),
            items,
        }
    }

    pub fn with_layout_type(mut self, layout_type: LayoutType) -> Self {
        self.layout_types = self.layout_types.register(layout_type);
        self
    }

    pub fn with_block_definition(mut self, definition: BlockDefinition) -> Self {
        self.block_definitions = self.block_definitions.register(definition);
        self
    }

    pub fn with_query_type(mut self, query_type: QueryType) -> Self {
        self.query_types = self.query_types.register(query_type);
        self
    }

    pub fn with_targets(mut self, targets: TargetBuilderRegistry) -> Self {
        self.targets = Arc::new(targets);
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionMatcherRegistry) -> Self {
        self.conditions = Arc::new(conditions);
        self
    }
}

/// Entry point handing out services that share one pool.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct Engine {
    pool: DbPool,
    registries: Arc<Registries>,
    default_locale: String,
}

impl Engine {
    pub fn new(pool: DbPool, registries: Registries) -> Self {
        Self {
            pool,
            registries: Arc::new(registries),
            default_locale: EngineConfig::default().default_locale,
        }
    }

    /// Open the pool described by `config`, check it and apply migrations
    /// if configured.
    pub async fn connect(config: &EngineConfig, registries: Registries) -> EngineResult<Self> {
        let pool = layouts_db::create_pool(&config.database_url, config.max_connections).await?;
        layouts_db::health_check(&pool).await?;
        tracing::info!(database_url = %config.database_url, "Database connection pool created");

        if config.run_migrations {
            layouts_db::run_migrations(&pool).await?;
            tracing::info!("Database migrations applied");
        }

        Ok(Self::new(pool, registries).with_default_locale(&config.default_locale))
    }

    pub fn with_default_locale(mut self, locale: &str) -> Self {
        self.default_locale = locale.to_string();
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn layouts(&self) -> LayoutService {
        LayoutService::new(
            self.pool.clone(),
            Arc::clone(&self.registries),
            self.default_locale.clone(),
        )
    }

    pub fn blocks(&self) -> BlockService {
        BlockService::new(self.pool.clone(), Arc::clone(&self.registries))
    }

    pub fn collections(&self) -> CollectionService {
        CollectionService::new(self.pool.clone(), Arc::clone(&self.registries))
    }

    pub fn rules(&self) -> RuleService {
        RuleService::new(self.pool.clone(), Arc::clone(&self.registries))
    }

    /// Resolver reading published rules from this engine's database.
    pub fn resolver(&self) -> LayoutResolver<DbRuleLoader> {
        LayoutResolver::new(
            Arc::clone(&self.registries.targets),
            Arc::clone(&self.registries.conditions),
            DbRuleLoader::new(self.pool.clone()),
        )
    }
}
