use std::path::{Path, PathBuf};

use anyhow::Result;
use order_intent_core::{
    resolve_intent, suggest, DisabledOracle, MenuItem, MenuItemDraft, MenuItemId, OrderId,
    OrderRecord, OrderStatus, ResolutionOutcome, ResolutionPath, VerificationOracle,
    DEFAULT_SUGGESTION_LIMIT, RESOLUTION_RULESET_VERSION,
};
use order_intent_store_sqlite::{
    AnalyticsSummary, DailySales, IntegrityReport, OrderStats, SchemaStatus, SqliteStore, TopItem,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapResult {
    pub schema_version: i64,
    pub seeded_items: usize,
    pub snapshot_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MenuView {
    pub snapshot_id: String,
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub snapshot_id: String,
    pub active_items: usize,
    pub inactive_items: usize,
}

/// Engine outcome plus the provenance needed to replay or compare it:
/// which catalog snapshot it saw and which ruleset produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolutionReport {
    pub outcome: ResolutionOutcome,
    pub confidence: Option<u32>,
    pub path: ResolutionPath,
    pub snapshot_id: String,
    pub ruleset_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaceOrderResult {
    pub report: ResolutionReport,
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderStatusUpdate {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupResult {
    pub backup_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreResult {
    pub restored_from: String,
    pub schema_version: i64,
}

/// Embedded facade over the store and the resolution engine. Opens the
/// database per call; mutating operations migrate before touching data.
pub struct OrderIntentApi {
    db_path: PathBuf,
    oracle: Box<dyn VerificationOracle + Send + Sync>,
}

impl OrderIntentApi {
    #[must_use]
    pub fn new(db_path: PathBuf, oracle: Box<dyn VerificationOracle + Send + Sync>) -> Self {
        Self { db_path, oracle }
    }

    #[must_use]
    pub fn with_disabled_oracle(db_path: PathBuf) -> Self {
        Self::new(db_path, Box::new(DisabledOracle))
    }

    fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.db_path)
    }

    fn open_migrated(&self) -> Result<SqliteStore> {
        let mut store = self.open_store()?;
        store.migrate()?;
        Ok(store)
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let store = self.open_store()?;
        store.schema_status()
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                after_version: None,
                up_to_date: None,
            });
        }

        let planned_versions = before.pending_versions;
        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: planned_versions,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// Migrate to the latest schema and seed the default menu when empty.
    ///
    /// # Errors
    /// Returns an error when migration or seeding fails.
    pub fn bootstrap(&self) -> Result<BootstrapResult> {
        let mut store = self.open_store()?;
        let seeded_items = store.bootstrap()?;
        let status = store.schema_status()?;
        let snapshot = store.load_snapshot()?;
        Ok(BootstrapResult {
            schema_version: status.current_version,
            seeded_items,
            snapshot_id: snapshot.snapshot_id,
        })
    }

    /// List the catalog, name-sorted, under its current snapshot id.
    ///
    /// # Errors
    /// Returns an error when the catalog cannot be loaded.
    pub fn menu(&self, include_inactive: bool) -> Result<MenuView> {
        let store = self.open_migrated()?;
        let snapshot = store.load_snapshot()?;
        let mut items = snapshot.active;
        if include_inactive {
            items.extend(snapshot.inactive);
            items.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(MenuView { snapshot_id: snapshot.snapshot_id, items })
    }

    /// Add one menu item, active by default.
    ///
    /// # Errors
    /// Returns an error when validation fails or the name already exists.
    pub fn add_menu_item(&self, draft: MenuItemDraft) -> Result<MenuItem> {
        let mut store = self.open_migrated()?;
        store.insert_menu_item(draft)
    }

    /// Flip one item's availability and report the resulting snapshot.
    ///
    /// # Errors
    /// Returns an error when the item does not exist or the update fails.
    pub fn set_item_active(&self, id: MenuItemId, active: bool) -> Result<SnapshotInfo> {
        let mut store = self.open_migrated()?;
        store.set_item_active(id, active)?;
        snapshot_info(&store)
    }

    /// Report the current snapshot id and partition sizes.
    ///
    /// # Errors
    /// Returns an error when the catalog cannot be loaded.
    pub fn reload_snapshot(&self) -> Result<SnapshotInfo> {
        let store = self.open_migrated()?;
        snapshot_info(&store)
    }

    /// Run one utterance through the resolution engine without persisting.
    ///
    /// # Errors
    /// Returns an error when the catalog cannot be loaded.
    pub fn resolve(&self, utterance: &str) -> Result<ResolutionReport> {
        let store = self.open_migrated()?;
        let snapshot = store.load_snapshot()?;
        let resolution = resolve_intent(&snapshot, utterance, self.oracle.as_ref());
        Ok(ResolutionReport {
            outcome: resolution.outcome,
            confidence: resolution.confidence,
            path: resolution.path,
            snapshot_id: snapshot.snapshot_id,
            ruleset_version: RESOLUTION_RULESET_VERSION.to_string(),
        })
    }

    /// Rank active dish names against a partial utterance.
    ///
    /// # Errors
    /// Returns an error when the catalog cannot be loaded.
    pub fn suggest(&self, utterance: &str, limit: Option<usize>) -> Result<Vec<String>> {
        let store = self.open_migrated()?;
        let snapshot = store.load_snapshot()?;
        Ok(suggest(&snapshot, utterance, limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT)))
    }

    /// Resolve an utterance and persist a pending order for the `Resolved`
    /// outcome only. Sold-out and ambiguous outcomes are reported, not stored.
    ///
    /// # Errors
    /// Returns an error when the catalog cannot be loaded or the order
    /// cannot be persisted.
    pub fn place_order(&self, utterance: &str) -> Result<PlaceOrderResult> {
        let mut store = self.open_migrated()?;
        let snapshot = store.load_snapshot()?;
        let resolution = resolve_intent(&snapshot, utterance, self.oracle.as_ref());
        let report = ResolutionReport {
            outcome: resolution.outcome,
            confidence: resolution.confidence,
            path: resolution.path,
            snapshot_id: snapshot.snapshot_id,
            ruleset_version: RESOLUTION_RULESET_VERSION.to_string(),
        };

        let order_id = if let ResolutionOutcome::Resolved {
            item,
            display_name,
            add_ons,
            note,
            total_price,
        } = &report.outcome
        {
            let order = OrderRecord {
                id: OrderId::new(),
                item_id: item.id,
                item_name: display_name.clone(),
                add_ons: add_ons.clone(),
                note: note.clone(),
                total_price: *total_price,
                status: OrderStatus::Pending,
                created_at: OffsetDateTime::now_utc(),
            };
            store.insert_order(&order)?;
            Some(order.id)
        } else {
            None
        };

        Ok(PlaceOrderResult { report, order_id })
    }

    /// List persisted orders, newest first, optionally filtered by status.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<OrderRecord>> {
        let store = self.open_migrated()?;
        store.list_orders(status, limit)
    }

    /// Move one order to a new status.
    ///
    /// # Errors
    /// Returns an error when the order does not exist or the update fails.
    pub fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderStatusUpdate> {
        let mut store = self.open_migrated()?;
        store.update_order_status(id, status)?;
        Ok(OrderStatusUpdate { order_id: id, status })
    }

    /// Order counts and revenue for today, trailing 7/30 days, and all time.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn analytics_summary(&self) -> Result<AnalyticsSummary> {
        let store = self.open_migrated()?;
        store.analytics_summary()
    }

    /// Best-selling items over non-cancelled orders.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn top_items(&self, limit: usize) -> Result<Vec<TopItem>> {
        let store = self.open_migrated()?;
        store.top_items(limit)
    }

    /// Per-day order counts and revenue, oldest first, zero-filled.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn daily_sales(&self, days: u32) -> Result<Vec<DailySales>> {
        let store = self.open_migrated()?;
        store.daily_sales(days)
    }

    /// Status breakdown and completed revenue within a trailing window.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn order_stats(&self, days: u32) -> Result<OrderStats> {
        let store = self.open_migrated()?;
        store.order_stats(days)
    }

    /// Inspect database health without mutating data.
    ///
    /// # Errors
    /// Returns an error when the checks cannot be executed.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let store = self.open_store()?;
        store.integrity_check()
    }

    /// Write a point-in-time copy of the database to `out_file`.
    ///
    /// # Errors
    /// Returns an error when the backup cannot be written.
    pub fn backup(&self, out_file: &Path) -> Result<BackupResult> {
        let store = self.open_migrated()?;
        store.backup_database(out_file)?;
        Ok(BackupResult { backup_file: out_file.display().to_string() })
    }

    /// Replace the database from a backup file and migrate to latest.
    ///
    /// # Errors
    /// Returns an error when the backup file is missing or restore fails.
    pub fn restore(&self, in_file: &Path) -> Result<RestoreResult> {
        let mut store = self.open_store()?;
        store.restore_database(in_file)?;
        let status = store.schema_status()?;
        Ok(RestoreResult {
            restored_from: in_file.display().to_string(),
            schema_version: status.current_version,
        })
    }
}

fn snapshot_info(store: &SqliteStore) -> Result<SnapshotInfo> {
    let snapshot = store.load_snapshot()?;
    Ok(SnapshotInfo {
        snapshot_id: snapshot.snapshot_id,
        active_items: snapshot.active.len(),
        inactive_items: snapshot.inactive.len(),
    })
}
