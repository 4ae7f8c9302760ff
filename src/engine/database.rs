use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::core::lock_stats::{set_lock_stats_enabled, snapshot_lock_stats, LockStatsSnapshot};
use crate::query::{BuiltinRoutines, RoutineResolver, ViewPlanSource};
use crate::storage::MasterTable;
use crate::txn::{GlobalTxnState, InMemorySequences, StaticTables, Transaction, TxnOptions, TxnServices};

use super::view_manager::ViewManager;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Schema used for unqualified names (default: `APP`).
    pub default_schema: String,
    /// Resolve table names case-insensitively (default: false).
    pub ignore_identifier_case: bool,
    /// Enable collection of lock wait/hold counters.
    pub lock_stats_enabled: bool,
    /// Install the `SYSTEM.views` table and the view manager (default: true).
    pub views_enabled: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            default_schema: "APP".to_string(),
            ignore_identifier_case: false,
            lock_stats_enabled: false,
            views_enabled: true,
        }
    }
}

impl DatabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = schema.into();
        self
    }

    pub fn ignore_identifier_case(mut self, ignore: bool) -> Self {
        self.ignore_identifier_case = ignore;
        self
    }

    pub fn lock_stats_enabled(mut self, enabled: bool) -> Self {
        self.lock_stats_enabled = enabled;
        self
    }

    pub fn views_enabled(mut self, enabled: bool) -> Self {
        self.views_enabled = enabled;
        self
    }
}

/// An in-process database: the committed catalog plus the services every
/// transaction it opens is wired to.
pub struct Database {
    config: DatabaseConfig,
    global: Arc<GlobalTxnState>,
    sequences: Arc<InMemorySequences>,
    dynamic_tables: Arc<StaticTables>,
    routines: Arc<dyn RoutineResolver>,
    views: Option<Arc<ViewManager>>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("global", &self.global)
            .finish()
    }
}

impl Database {
    pub fn open(config: DatabaseConfig) -> Self {
        set_lock_stats_enabled(config.lock_stats_enabled);
        let global = Arc::new(GlobalTxnState::new());

        let views = if config.views_enabled {
            let info = ViewManager::table_info(global.allocate_table_id());
            let master = Arc::new(MasterTable::new(info));
            global.install_table(master.clone());
            let manager = Arc::new(ViewManager::new(master));
            global.add_commit_listener(manager.clone());
            Some(manager)
        } else {
            None
        };

        debug!(views = config.views_enabled, schema = %config.default_schema, "database opened");
        Self {
            config,
            global,
            sequences: Arc::new(InMemorySequences::new()),
            dynamic_tables: Arc::new(StaticTables::new()),
            routines: Arc::new(BuiltinRoutines),
            views,
        }
    }

    /// Replace the routines available to plan expressions.
    pub fn with_routines(mut self, routines: Arc<dyn RoutineResolver>) -> Self {
        self.routines = routines;
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn global(&self) -> &Arc<GlobalTxnState> {
        &self.global
    }

    pub fn sequences(&self) -> &Arc<InMemorySequences> {
        &self.sequences
    }

    pub fn dynamic_tables(&self) -> &Arc<StaticTables> {
        &self.dynamic_tables
    }

    pub fn view_manager(&self) -> Option<&Arc<ViewManager>> {
        self.views.as_ref()
    }

    pub fn lock_stats(&self) -> LockStatsSnapshot {
        snapshot_lock_stats()
    }

    fn services(&self) -> TxnServices {
        TxnServices {
            sequences: Some(self.sequences.clone()),
            dynamic_tables: Some(self.dynamic_tables.clone()),
            routines: self.routines.clone(),
            views: self
                .views
                .clone()
                .map(|views| views as Arc<dyn ViewPlanSource>),
            default_schema: self.config.default_schema.clone(),
            ignore_identifier_case: self.config.ignore_identifier_case,
        }
    }

    pub fn begin(&self) -> Transaction {
        self.begin_with(TxnOptions::default())
    }

    pub fn begin_read_only(&self) -> Transaction {
        self.begin_with(TxnOptions::new().read_only(true))
    }

    pub fn begin_with(&self, options: TxnOptions) -> Transaction {
        self.global.begin_txn(self.services(), options)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::open(DatabaseConfig::default())
    }
}
