use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use im::OrdSet;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::core::errors::StrataError;
use crate::core::name::TableName;
use crate::core::value::Value;
use crate::query::{BuiltinRoutines, QueryContext, QueryPlanNode, RoutineResolver, ViewPlanSource};
use crate::storage::{CommitGuard, ColumnInfo, IndexSet, MasterTable, MutableTable, RowId, Table, TableId, TableInfo};

use super::commit::{CommitCallback, TableCommitInfo};
use super::cursor::{Cursor, CursorAttributes};
use super::dynamic::DynamicTables;
use super::global_txn::GlobalTxnState;
use super::lock::{AccessType, LockHandle};
use super::sequence::SequenceManager;
use super::variables::VariableManager;
use super::view::{SharedIndex, SnapshotViews, ViewStrategy};
use super::TxnId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    Snapshot,
}

impl IsolationLevel {
    /// How views of this isolation level overlay staged changes.
    pub fn view_strategy(self) -> Arc<dyn ViewStrategy> {
        match self {
            IsolationLevel::Snapshot => Arc::new(SnapshotViews),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committing,
    RollingBack,
    Disposed,
}

#[derive(Debug, Clone, Default)]
pub struct TxnOptions {
    pub read_only: bool,
    pub isolation: IsolationLevel,
}

impl TxnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }
}

/// Collaborators a transaction consults but does not own.
#[derive(Debug, Clone)]
pub struct TxnServices {
    pub sequences: Option<Arc<dyn SequenceManager>>,
    pub dynamic_tables: Option<Arc<dyn DynamicTables>>,
    pub routines: Arc<dyn RoutineResolver>,
    pub views: Option<Arc<dyn ViewPlanSource>>,
    pub default_schema: String,
    pub ignore_identifier_case: bool,
}

impl Default for TxnServices {
    fn default() -> Self {
        Self {
            sequences: None,
            dynamic_tables: None,
            routines: Arc::new(BuiltinRoutines),
            views: None,
            default_schema: "APP".to_string(),
            ignore_identifier_case: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Origin {
    version: u64,
    rows: OrdSet<RowId>,
}

struct VisibleTable {
    master: Arc<MasterTable>,
    index: SharedIndex,
    // Baseline the index was derived from; commit merges the difference.
    origin: Origin,
}

struct PendingTable {
    master: Arc<MasterTable>,
    origin: Origin,
    rows: OrdSet<RowId>,
    added: Vec<RowId>,
    removed: Vec<RowId>,
    created: bool,
}

/// A session's snapshot of the database.
///
/// Every visible table pairs a shared master table with an index owned by this
/// transaction. Reads see the snapshot taken at open; writes stage row numbers
/// in the private index and are merged into the masters by `commit`.
/// Dropping an active transaction rolls it back.
pub struct Transaction {
    id: TxnId,
    global: Arc<GlobalTxnState>,
    services: TxnServices,
    isolation: IsolationLevel,
    view_strategy: Arc<dyn ViewStrategy>,
    state: TxnState,
    read_only: bool,
    visible: Vec<VisibleTable>,
    cleanup: Vec<(Arc<MasterTable>, SharedIndex)>,
    table_cache: Mutex<HashMap<TableName, Arc<dyn MutableTable>>>,
    sequence_cache: HashMap<TableName, i64>,
    cursors: Vec<Cursor>,
    variables: VariableManager,
    created: Vec<Arc<MasterTable>>,
    dropped: Vec<Arc<MasterTable>>,
    lock_handle: Option<LockHandle>,
    on_commit: Vec<CommitCallback>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("read_only", &self.read_only)
            .field("visible", &self.visible.len())
            .field("cleanup", &self.cleanup.len())
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(id: TxnId, global: Arc<GlobalTxnState>, services: TxnServices, options: &TxnOptions) -> Self {
        debug!(txn_id = id, read_only = options.read_only, "transaction started");
        Self {
            id,
            global,
            services,
            isolation: options.isolation,
            view_strategy: options.isolation.view_strategy(),
            state: TxnState::Active,
            read_only: false,
            visible: Vec::new(),
            cleanup: Vec::new(),
            table_cache: Mutex::new(HashMap::new()),
            sequence_cache: HashMap::new(),
            cursors: Vec::new(),
            variables: VariableManager::new(),
            created: Vec::new(),
            dropped: Vec::new(),
            lock_handle: None,
            on_commit: Vec::new(),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn global(&self) -> &Arc<GlobalTxnState> {
        &self.global
    }

    pub(crate) fn set_read_only(&mut self) {
        self.read_only = true;
    }

    fn ensure_active(&self) -> Result<(), StrataError> {
        if self.state != TxnState::Active {
            return Err(StrataError::InvalidState(format!(
                "transaction {} is {:?}",
                self.id, self.state
            )));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), StrataError> {
        self.ensure_active()?;
        if self.read_only {
            return Err(StrataError::ReadOnlyViolation);
        }
        Ok(())
    }

    // ---------- Visible tables ----------

    pub(crate) fn push_visible(&mut self, master: Arc<MasterTable>, index: IndexSet) {
        let origin = Origin {
            version: index.version(),
            rows: index.rows().unwrap_or_default(),
        };
        self.visible.push(VisibleTable {
            master,
            index: Arc::new(RwLock::new(index)),
            origin,
        });
    }

    /// Make `master` visible through `index`. For a committed table the index
    /// counts as the starting point. A table not yet in the catalog is treated
    /// as created by this transaction: every row in it is staged and the table
    /// is installed at commit.
    pub fn add_visible_table(&mut self, master: Arc<MasterTable>, index: IndexSet) -> Result<(), StrataError> {
        self.ensure_writable()?;
        if index.table_id() != master.id() {
            return Err(StrataError::InvalidState(format!(
                "index of table {} cannot be made visible as {}",
                index.table_id(),
                master.name()
            )));
        }
        if self.visible.iter().any(|v| v.master.id() == master.id()) {
            return Err(StrataError::InvalidState(format!("table {} is already visible", master.name())));
        }
        let committed = self.global.is_committed(master.id());
        if !committed && self.table_exists(master.name()) {
            return Err(StrataError::TableAlreadyExists(master.name().clone()));
        }
        self.push_visible(master.clone(), index);
        if !committed {
            if let Some(visible) = self.visible.last_mut() {
                visible.origin = Origin::default();
            }
            if !self.created.iter().any(|m| m.id() == master.id()) {
                self.created.push(master);
            }
        }
        Ok(())
    }

    /// Take a table out of view. Its index is retired at once and queued for
    /// disposal at transaction end; a table created here is no longer
    /// installed at commit. Returns false if the table was not visible.
    pub fn remove_visible_table(&mut self, table: TableId) -> Result<bool, StrataError> {
        self.ensure_writable()?;
        let Some(position) = self.visible.iter().position(|v| v.master.id() == table) else {
            return Ok(false);
        };
        let removed = self.visible.remove(position);
        self.created.retain(|m| m.id() != table);
        self.retire(removed.master, removed.index);
        Ok(true)
    }

    // Views handed out over a retired index fail instead of writing to it.
    fn retire(&mut self, master: Arc<MasterTable>, index: SharedIndex) {
        index.write().retire();
        self.table_cache.lock().remove(master.name());
        self.cleanup.push((master, index));
    }

    /// Replace the index of a visible table, keeping its commit starting point.
    /// The old index is queued for disposal. Adds the table if it was not visible.
    pub fn update_visible_table(&mut self, master: Arc<MasterTable>, index: IndexSet) -> Result<(), StrataError> {
        self.ensure_writable()?;
        if index.table_id() != master.id() {
            return Err(StrataError::InvalidState(format!(
                "index of table {} cannot replace the index of {}",
                index.table_id(),
                master.name()
            )));
        }
        let Some(visible) = self.visible.iter_mut().find(|v| v.master.id() == master.id()) else {
            return self.add_visible_table(master, index);
        };
        let old = std::mem::replace(&mut visible.index, Arc::new(RwLock::new(index)));
        let master = visible.master.clone();
        self.retire(master, old);
        Ok(())
    }

    /// Names of the visible master tables, in visibility order.
    pub fn visible_tables(&self) -> Vec<TableName> {
        self.visible.iter().map(|v| v.master.name().clone()).collect()
    }

    pub fn cleanup_queue_len(&self) -> usize {
        self.cleanup.len()
    }

    /// An independent copy of this transaction's index for `name`.
    pub fn index_snapshot(&self, name: &TableName) -> Result<IndexSet, StrataError> {
        self.visible_or_err(name)?.index.read().snapshot()
    }

    fn dispose_all_indices(&mut self) {
        fn dispose(master: &MasterTable, index: &SharedIndex) {
            if let Err(err) = master.release_index(&mut index.write()) {
                error!(table = %master.name(), error = %err, "failed to dispose index");
            }
        }
        for visible in std::mem::take(&mut self.visible) {
            dispose(&visible.master, &visible.index);
        }
        for (master, index) in std::mem::take(&mut self.cleanup) {
            dispose(&master, &index);
        }
    }

    // ---------- Resolution ----------

    fn find_visible(&self, name: &TableName) -> Option<&VisibleTable> {
        self.visible.iter().find(|v| v.master.name() == name)
    }

    fn visible_or_err(&self, name: &TableName) -> Result<&VisibleTable, StrataError> {
        self.find_visible(name)
            .ok_or_else(|| StrataError::TableNotFound(name.clone()))
    }

    fn dynamic(&self, name: &TableName) -> Option<&Arc<dyn DynamicTables>> {
        self.services
            .dynamic_tables
            .as_ref()
            .filter(|dynamic| dynamic.is_dynamic(name))
    }

    fn cached_view(&self, visible: &VisibleTable) -> Arc<dyn MutableTable> {
        self.table_cache
            .lock()
            .entry(visible.master.name().clone())
            .or_insert_with(|| {
                self.view_strategy
                    .create_view(visible.master.clone(), visible.index.clone(), self.read_only)
            })
            .clone()
    }

    /// Visible master tables are checked before dynamic tables.
    pub fn get_table(&self, name: &TableName) -> Result<Arc<dyn Table>, StrataError> {
        if let Some(visible) = self.find_visible(name) {
            return Ok(self.cached_view(visible).as_table());
        }
        match self.dynamic(name) {
            Some(dynamic) => dynamic.table(name),
            None => Err(StrataError::TableNotFound(name.clone())),
        }
    }

    pub fn get_mutable_table(&self, name: &TableName) -> Result<Arc<dyn MutableTable>, StrataError> {
        if let Some(visible) = self.find_visible(name) {
            return Ok(self.cached_view(visible));
        }
        match self.dynamic(name) {
            Some(_) => Err(StrataError::NotMutable(name.clone())),
            None => Err(StrataError::TableNotFound(name.clone())),
        }
    }

    pub fn get_table_info(&self, name: &TableName) -> Result<TableInfo, StrataError> {
        if let Some(visible) = self.find_visible(name) {
            return Ok(visible.master.info().clone());
        }
        match self.dynamic(name) {
            Some(dynamic) => dynamic.table_info(name),
            None => Err(StrataError::TableNotFound(name.clone())),
        }
    }

    /// `"TABLE"` for master tables, otherwise the dynamic table's own type.
    pub fn get_table_type(&self, name: &TableName) -> Result<String, StrataError> {
        if self.find_visible(name).is_some() {
            return Ok("TABLE".to_string());
        }
        match self.dynamic(name) {
            Some(dynamic) => dynamic.table_type(name),
            None => Err(StrataError::TableNotFound(name.clone())),
        }
    }

    /// Visible master tables followed by dynamic tables.
    pub fn get_tables(&self) -> Vec<TableName> {
        let mut names = self.visible_tables();
        if let Some(dynamic) = &self.services.dynamic_tables {
            names.extend(dynamic.table_names());
        }
        names
    }

    pub fn table_exists(&self, name: &TableName) -> bool {
        self.find_visible(name).is_some() || self.dynamic(name).is_some()
    }

    /// True only for visible master tables.
    pub fn real_table_exists(&self, name: &TableName) -> bool {
        self.find_visible(name).is_some()
    }

    /// Correct the case of `name` against visible tables, then dynamic tables.
    /// Returns `name` unchanged when nothing matches.
    pub fn try_resolve_case(&self, name: &TableName) -> TableName {
        if let Some(visible) = self.visible.iter().find(|v| v.master.name().eq_ignore_case(name)) {
            return visible.master.name().clone();
        }
        if let Some(dynamic) = &self.services.dynamic_tables {
            if let Some(found) = dynamic.table_names().into_iter().find(|n| n.eq_ignore_case(name)) {
                return found;
            }
        }
        name.clone()
    }

    pub fn resolve_to_table_name(
        &self,
        current_schema: &str,
        name: &str,
        case_insensitive: bool,
    ) -> Result<TableName, StrataError> {
        let wanted = TableName::resolve(current_schema, name);
        let mut found: Option<TableName> = None;
        for table in self.get_tables() {
            let matches = if case_insensitive {
                table.eq_ignore_case(&wanted)
            } else {
                table == wanted
            };
            if matches {
                if found.is_some() {
                    return Err(StrataError::AmbiguousReference(name.to_string()));
                }
                found = Some(table);
            }
        }
        found.ok_or(StrataError::TableNotFound(wanted))
    }

    /// Resolve `name` in the transaction's default schema, honouring the
    /// identifier case setting.
    pub fn resolve_name(&self, name: &str) -> Result<TableName, StrataError> {
        self.resolve_to_table_name(
            &self.services.default_schema,
            name,
            self.services.ignore_identifier_case,
        )
    }

    fn context_name(&self, name: &TableName) -> TableName {
        if self.services.ignore_identifier_case {
            self.try_resolve_case(name)
        } else {
            name.clone()
        }
    }

    // ---------- DDL ----------

    pub fn create_table(&mut self, name: TableName, columns: Vec<ColumnInfo>) -> Result<TableId, StrataError> {
        self.ensure_writable()?;
        if self.table_exists(&name) {
            return Err(StrataError::TableAlreadyExists(name));
        }
        let id = self.global.allocate_table_id();
        let master = Arc::new(MasterTable::new(TableInfo::new(id, name, columns)));
        let index = master.current_index();
        debug!(txn_id = self.id, table = %master.name(), table_id = %id, "table created");
        self.visible.push(VisibleTable {
            master: master.clone(),
            index: Arc::new(RwLock::new(index)),
            origin: Origin::default(),
        });
        self.created.push(master);
        Ok(id)
    }

    pub fn drop_table(&mut self, name: &TableName) -> Result<(), StrataError> {
        self.ensure_writable()?;
        let master = self.visible_or_err(name)?.master.clone();
        let created_here = self.created.iter().any(|m| m.id() == master.id());
        self.remove_visible_table(master.id())?;
        if !created_here {
            self.dropped.push(master);
        }
        debug!(txn_id = self.id, table = %name, "table dropped");
        Ok(())
    }

    /// Rebuild the table's index from its current contents.
    pub fn compact_table(&mut self, name: &TableName) -> Result<(), StrataError> {
        self.ensure_writable()?;
        let visible = self.visible_or_err(name)?;
        let master = visible.master.clone();
        let rebuilt = visible.index.read().snapshot()?;
        self.update_visible_table(master, rebuilt)
    }

    // ---------- Unique ids ----------

    /// The last id handed out for the table, regardless of transaction.
    pub fn current_unique_id(&self, name: &TableName) -> Result<i64, StrataError> {
        Ok(self.visible_or_err(name)?.master.current_unique_id())
    }

    pub fn next_unique_id(&self, name: &TableName) -> Result<i64, StrataError> {
        self.ensure_writable()?;
        Ok(self.visible_or_err(name)?.master.next_unique_id())
    }

    pub fn set_unique_id(&self, name: &TableName, id: i64) -> Result<(), StrataError> {
        self.ensure_writable()?;
        self.visible_or_err(name)?.master.set_unique_id(id);
        Ok(())
    }

    // ---------- Sequences ----------

    fn sequences(&self) -> Result<&Arc<dyn SequenceManager>, StrataError> {
        self.ensure_writable()?;
        self.services
            .sequences
            .as_ref()
            .ok_or(StrataError::SequencesDisabled)
    }

    pub fn next_sequence_value(&mut self, name: &TableName) -> Result<i64, StrataError> {
        let value = self.sequences()?.next_value(self.id, name)?;
        self.sequence_cache.insert(name.clone(), value);
        Ok(value)
    }

    /// The value last returned or set for `name` within this transaction.
    pub fn last_sequence_value(&self, name: &TableName) -> Result<i64, StrataError> {
        self.sequence_cache
            .get(name)
            .copied()
            .ok_or_else(|| StrataError::SequenceNotInitialized(name.clone()))
    }

    pub fn set_sequence_value(&mut self, name: &TableName, value: i64) -> Result<(), StrataError> {
        self.sequences()?.set_value(self.id, name, value)?;
        self.sequence_cache.insert(name.clone(), value);
        Ok(())
    }

    pub fn flush_sequence_manager(&self, name: &TableName) -> Result<(), StrataError> {
        let sequences = self
            .services
            .sequences
            .as_ref()
            .ok_or(StrataError::SequencesDisabled)?;
        sequences.flush_generator(name);
        Ok(())
    }

    // ---------- Cursors ----------

    pub fn declare_cursor(
        &mut self,
        name: TableName,
        plan: QueryPlanNode,
        attributes: CursorAttributes,
    ) -> Result<(), StrataError> {
        self.ensure_active()?;
        if self.cursor_exists(&name) {
            return Err(StrataError::DuplicateCursor(name));
        }
        self.cursors.push(Cursor::new(name, plan, attributes));
        Ok(())
    }

    pub fn drop_cursor(&mut self, name: &TableName) -> Result<(), StrataError> {
        let position = self
            .cursors
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| StrataError::CursorNotFound(name.clone()))?;
        self.cursors.remove(position);
        Ok(())
    }

    pub fn cursor_exists(&self, name: &TableName) -> bool {
        self.cursors.iter().any(|c| c.name() == name)
    }

    fn cursor_position(&self, name: &TableName) -> Result<usize, StrataError> {
        let position = self
            .cursors
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| StrataError::CursorNotFound(name.clone()))?;
        let cursor = &self.cursors[position];
        if cursor.is_broken() {
            return Err(StrataError::InvalidCursorState {
                name: name.clone(),
                state: cursor.state(),
            });
        }
        Ok(position)
    }

    /// A broken cursor can only be dropped.
    pub fn get_cursor(&self, name: &TableName) -> Result<&Cursor, StrataError> {
        let position = self.cursor_position(name)?;
        Ok(&self.cursors[position])
    }

    pub fn open_cursor(&mut self, name: &TableName) -> Result<(), StrataError> {
        self.ensure_active()?;
        let position = self.cursor_position(name)?;
        // The cursor evaluates against this transaction, so take it out while it does.
        let mut cursor = self.cursors.remove(position);
        let result = cursor.open(&*self);
        self.cursors.insert(position, cursor);
        result
    }

    pub fn fetch_next(&mut self, name: &TableName) -> Result<Option<Vec<Value>>, StrataError> {
        let position = self.cursor_position(name)?;
        self.cursors[position].fetch_next()
    }

    pub fn fetch_absolute(&mut self, name: &TableName, offset: usize) -> Result<Option<Vec<Value>>, StrataError> {
        let position = self.cursor_position(name)?;
        self.cursors[position].fetch_absolute(offset)
    }

    pub fn close_cursor(&mut self, name: &TableName) -> Result<(), StrataError> {
        let position = self.cursor_position(name)?;
        self.cursors[position].close()
    }

    // ---------- Variables ----------

    pub fn variables(&self) -> &VariableManager {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableManager {
        &mut self.variables
    }

    // ---------- Locks ----------

    fn table_ids(&self, names: &[TableName]) -> Result<Vec<TableId>, StrataError> {
        names
            .iter()
            .map(|name| self.visible_or_err(name).map(|v| v.master.id()))
            .collect()
    }

    /// Lock tables for the rest of the transaction, or until `unlock_tables`.
    pub fn lock_tables(&mut self, read: &[TableName], write: &[TableName]) -> Result<(), StrataError> {
        if write.is_empty() {
            self.ensure_active()?;
        } else {
            self.ensure_writable()?;
        }
        if self.lock_handle.is_some() {
            return Err(StrataError::InvalidState(format!(
                "transaction {} already holds table locks",
                self.id
            )));
        }
        let read = self.table_ids(read)?;
        let write = self.table_ids(write)?;
        self.lock_handle = Some(self.global.locks().lock_tables(&read, &write)?);
        Ok(())
    }

    pub fn unlock_tables(&mut self) -> Result<(), StrataError> {
        match self.lock_handle.take() {
            Some(mut handle) => handle.release(),
            None => Ok(()),
        }
    }

    pub fn check_access(&self, name: &TableName, access: AccessType) -> Result<(), StrataError> {
        let id = self.visible_or_err(name)?.master.id();
        match &self.lock_handle {
            Some(handle) => handle.check_access(id, access),
            None => Err(StrataError::LockNotFound(id)),
        }
    }

    // ---------- Commit / rollback ----------

    pub fn register_on_commit(&mut self, callback: impl FnMut(&TableCommitInfo) + Send + 'static) {
        self.on_commit.push(Box::new(callback));
    }

    fn collect_changes(&self) -> Result<Vec<PendingTable>, StrataError> {
        let mut pending = Vec::new();
        for visible in &self.visible {
            let created = self.created.iter().any(|m| m.id() == visible.master.id());
            let index = visible.index.read();
            let rows = index.rows()?;
            let added = index.rows_not_in(&visible.origin.rows)?;
            let removed: Vec<RowId> = visible
                .origin
                .rows
                .iter()
                .filter(|row| !rows.contains(row))
                .copied()
                .collect();
            if created || !added.is_empty() || !removed.is_empty() {
                pending.push(PendingTable {
                    master: visible.master.clone(),
                    origin: visible.origin.clone(),
                    rows,
                    added,
                    removed,
                    created,
                });
            }
        }
        pending.sort_by_key(|p| p.master.id());
        Ok(pending)
    }

    fn conflict(table: &MasterTable, reason: String) -> StrataError {
        StrataError::CommitConflict {
            table: table.name().clone(),
            reason,
        }
    }

    /// Validate every changed table, then install all new baselines and catalog
    /// changes while holding the commit gate.
    fn apply_commit(&self) -> Result<Vec<TableCommitInfo>, StrataError> {
        let pending = self.collect_changes()?;
        let global = self.global.clone();
        let dropped: Vec<TableId> = self.dropped.iter().map(|m| m.id()).collect();

        let _gate = global.gate_write();
        for master in &self.created {
            if let Some(existing) = global.find_committed(master.name()) {
                if !dropped.contains(&existing.id()) {
                    return Err(Self::conflict(
                        master,
                        format!("table was created concurrently as {}", existing.id()),
                    ));
                }
            }
        }
        for master in &self.dropped {
            if !global.is_committed(master.id()) {
                return Err(Self::conflict(master, "table was already dropped".to_string()));
            }
        }

        let guards: Vec<CommitGuard<'_>> = pending.iter().map(|p| p.master.begin_commit()).collect();
        let mut baselines = Vec::with_capacity(pending.len());
        for (table, guard) in pending.iter().zip(&guards) {
            if !table.created && !global.is_committed(table.master.id()) {
                return Err(Self::conflict(
                    &table.master,
                    "table was dropped by another transaction".to_string(),
                ));
            }
            let version = guard.version();
            let rows = if version == table.origin.version {
                table.rows.clone()
            } else {
                let mut current = guard.current_rows();
                for row in &table.removed {
                    if current.remove(row).is_none() {
                        return Err(Self::conflict(
                            &table.master,
                            format!("row {row} was removed by another transaction"),
                        ));
                    }
                }
                for row in &table.added {
                    current.insert(*row);
                }
                current
            };
            baselines.push(IndexSet::from_baseline(table.master.id(), version, rows, false));
        }
        for (guard, baseline) in guards.iter().zip(&baselines) {
            guard.commit(baseline)?;
        }
        global.apply_catalog_changes(self.created.clone(), &dropped);
        drop(guards);

        Ok(pending
            .into_iter()
            .map(|p| TableCommitInfo {
                table_name: p.master.name().clone(),
                added_rows: p.added,
                removed_rows: p.removed,
            })
            .filter(TableCommitInfo::has_changes)
            .collect())
    }

    /// Merge staged changes into the master tables. On a conflict nothing is
    /// applied, the transaction is rolled back and the retryable error returned.
    pub fn commit(mut self) -> Result<(), StrataError> {
        self.ensure_active()?;
        self.state = TxnState::Committing;
        match self.apply_commit() {
            Ok(infos) => {
                for info in &infos {
                    self.global.notify_commit(info);
                    for callback in self.on_commit.iter_mut() {
                        callback(info);
                    }
                }
                debug!(txn_id = self.id, tables = infos.len(), "transaction committed");
                self.finish();
                Ok(())
            }
            Err(err) => {
                debug!(txn_id = self.id, error = %err, "commit failed, rolling back");
                self.state = TxnState::RollingBack;
                self.finish();
                Err(err)
            }
        }
    }

    pub fn rollback(mut self) -> Result<(), StrataError> {
        self.ensure_active()?;
        self.state = TxnState::RollingBack;
        debug!(txn_id = self.id, "transaction rolled back");
        self.finish();
        Ok(())
    }

    fn finish(&mut self) {
        if let Some(mut handle) = self.lock_handle.take() {
            if let Err(err) = handle.release() {
                error!(txn_id = self.id, error = %err, "failed to release table locks");
            }
        }
        self.cursors.clear();
        self.table_cache.get_mut().clear();
        self.sequence_cache.clear();
        self.variables.clear();
        self.on_commit.clear();
        self.dispose_all_indices();
        self.created.clear();
        self.dropped.clear();
        self.global.unregister_active(self.id);
        self.state = TxnState::Disposed;
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TxnState::Active {
            warn!(txn_id = self.id, "transaction dropped while active, rolling back");
            self.state = TxnState::RollingBack;
            self.finish();
        }
    }
}

impl QueryContext for Transaction {
    fn get_table(&self, name: &TableName) -> Result<Arc<dyn Table>, StrataError> {
        let name = self.context_name(name);
        Transaction::get_table(self, &name)
    }

    fn get_view_plan(&self, name: &TableName) -> Result<QueryPlanNode, StrataError> {
        let name = self.context_name(name);
        match &self.services.views {
            Some(views) => views.view_plan(self, &name),
            None => Err(StrataError::ViewNotFound(name)),
        }
    }

    fn invoke_routine(&self, name: &str, args: &[Value]) -> Result<Value, StrataError> {
        self.services.routines.invoke(name, args)
    }
}
