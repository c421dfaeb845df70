use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use order_intent_core::{
    default_menu, CatalogSnapshot, Category, MenuItem, MenuItemDraft, MenuItemId, OrderId,
    OrderRecord, OrderStatus,
};
use rusqlite::{params, Connection, DatabaseName};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Date, Duration, OffsetDateTime, UtcOffset};
use ulid::Ulid;

const LATEST_SCHEMA_VERSION: i64 = 2;

/// The shop clock. Day boundaries in every analytics query run on this
/// fixed offset, not on the server's local time.
const SHOP_UTC_OFFSET_HOURS: i8 = 7;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS menu_items (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL UNIQUE,
  keywords TEXT NOT NULL,
  base_price INTEGER NOT NULL CHECK (base_price >= 0),
  category TEXT NOT NULL CHECK (category IN ('standard','premium','special','soup','salad','kapkhao')),
  active INTEGER NOT NULL CHECK (active IN (0,1)),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

const MIGRATION_002_SQL: &str = r"
CREATE TABLE IF NOT EXISTS orders (
  id TEXT PRIMARY KEY,
  item_id TEXT NOT NULL,
  item_name TEXT NOT NULL,
  add_ons_json TEXT NOT NULL,
  note TEXT,
  total_price INTEGER NOT NULL CHECK (total_price >= 0),
  status TEXT NOT NULL CHECK (status IN ('pending','completed','cancelled')),
  created_at TEXT NOT NULL,
  FOREIGN KEY (item_id) REFERENCES menu_items(id)
);

CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders(created_at);
";

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKeyViolation {
    pub table: String,
    pub rowid: i64,
    pub parent: String,
    pub fk_index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub foreign_key_violations: Vec<ForeignKeyViolation>,
    pub schema_status: SchemaStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PeriodStats {
    pub orders: u64,
    pub revenue: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyticsSummary {
    pub today: PeriodStats,
    pub last_7_days: PeriodStats,
    pub last_30_days: PeriodStats,
    pub all_time: PeriodStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopItem {
    pub item_name: String,
    pub orders: u64,
    pub revenue: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailySales {
    pub date: String,
    pub orders: u64,
    pub revenue: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderStats {
    pub total: u64,
    pub pending: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub revenue: u64,
}

#[derive(Debug, Clone)]
struct OrderAnalyticsRow {
    item_name: String,
    total_price: u64,
    status: OrderStatus,
    created_at: OffsetDateTime,
}

impl SqliteStore {
    /// Open a SQLite-backed catalog store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version < 1 {
            self.conn.execute_batch(MIGRATION_001_SQL).context("failed to apply migration 1")?;
            record_schema_version(&self.conn, 1)?;
            version = 1;
        }

        if version < 2 {
            self.conn.execute_batch(MIGRATION_002_SQL).context("failed to apply migration 2")?;
            record_schema_version(&self.conn, 2)?;
            version = 2;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    /// Migrate, then seed the default menu when the catalog is empty.
    /// Returns the number of seeded items (0 on an already-populated store).
    ///
    /// # Errors
    /// Returns an error when migration or seeding fails.
    pub fn bootstrap(&mut self) -> Result<usize> {
        self.migrate()?;
        self.seed_default_menu()
    }

    /// Insert the fixed 49-dish menu, but only into an empty `menu_items`.
    ///
    /// # Errors
    /// Returns an error when the catalog cannot be read or the insert fails.
    pub fn seed_default_menu(&mut self) -> Result<usize> {
        let existing: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM menu_items", [], |row| row.get(0))
            .context("failed to count menu items")?;
        if existing > 0 {
            return Ok(0);
        }

        let drafts = default_menu();
        let now = now_rfc3339()?;
        let tx = self.conn.transaction().context("failed to start seed transaction")?;
        for draft in &drafts {
            tx.execute(
                "INSERT INTO menu_items(id, name, keywords, base_price, category, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    MenuItemId::new().to_string(),
                    draft.name,
                    draft.keyword_set.join(","),
                    i64::from(draft.base_price),
                    draft.category.as_str(),
                    true,
                    now,
                    now,
                ],
            )
            .with_context(|| format!("failed to seed menu item {}", draft.name))?;
        }
        tx.commit().context("failed to commit seed transaction")?;
        Ok(drafts.len())
    }

    /// Load the full catalog as an immutable snapshot. The snapshot id is a
    /// digest of member ids and active flags, so identical membership yields
    /// an identical id across reloads.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or fail core validation.
    pub fn load_snapshot(&self) -> Result<CatalogSnapshot> {
        let items = self.list_menu_items()?;
        let snapshot_id = snapshot_digest(&items);
        CatalogSnapshot::from_items(snapshot_id, items)
            .map_err(|err| anyhow!("catalog failed validation: {err}"))
    }

    /// List every menu item, active and inactive, in name order.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded from `SQLite`.
    pub fn list_menu_items(&self) -> Result<Vec<MenuItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, keywords, base_price, category, active
             FROM menu_items
             ORDER BY name ASC",
        )?;

        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let id_raw: String = row.get(0)?;
            let keywords_raw: String = row.get(2)?;
            let category_raw: String = row.get(4)?;
            items.push(MenuItem {
                id: parse_menu_item_id(&id_raw)?,
                name: row.get(1)?,
                keyword_set: keywords_raw.split(',').map(str::to_string).collect(),
                base_price: row.get(3)?,
                category: Category::parse(&category_raw)
                    .ok_or_else(|| anyhow!("unknown category: {category_raw}"))?,
                active: row.get(5)?,
            });
        }

        Ok(items)
    }

    /// Insert one new menu item, active by default.
    ///
    /// # Errors
    /// Returns an error when the draft fails validation, a keyword contains
    /// the storage separator, or the name already exists.
    pub fn insert_menu_item(&mut self, draft: MenuItemDraft) -> Result<MenuItem> {
        if draft.keyword_set.iter().any(|keyword| keyword.contains(',')) {
            return Err(anyhow!("keywords MUST NOT contain commas"));
        }
        let item = draft.into_item(MenuItemId::new(), true);
        item.validate().map_err(|err| anyhow!("menu item validation failed: {err}"))?;

        let now = now_rfc3339()?;
        self.conn
            .execute(
                "INSERT INTO menu_items(id, name, keywords, base_price, category, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    item.id.to_string(),
                    item.name,
                    item.keyword_set.join(","),
                    i64::from(item.base_price),
                    item.category.as_str(),
                    item.active,
                    now,
                    now,
                ],
            )
            .with_context(|| format!("failed to insert menu item {}", item.name))?;

        Ok(item)
    }

    /// Flip one item's active flag. Inactive items stay resolvable as
    /// sold-out signals, so rows are never deleted.
    ///
    /// # Errors
    /// Returns an error when the id is unknown or the update fails.
    pub fn set_item_active(&mut self, id: MenuItemId, active: bool) -> Result<()> {
        let now = now_rfc3339()?;
        let updated = self
            .conn
            .execute(
                "UPDATE menu_items SET active = ?1, updated_at = ?2 WHERE id = ?3",
                params![active, now, id.to_string()],
            )
            .context("failed to update menu item active flag")?;
        if updated == 0 {
            return Err(anyhow!("menu item not found: {id}"));
        }
        Ok(())
    }

    /// Persist one order line.
    ///
    /// # Errors
    /// Returns an error when serialization fails or the referenced menu item
    /// does not exist.
    pub fn insert_order(&mut self, order: &OrderRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO orders(id, item_id, item_name, add_ons_json, note, total_price, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    order.id.to_string(),
                    order.item_id.to_string(),
                    order.item_name,
                    serde_json::to_string(&order.add_ons).context("failed to serialize add-ons")?,
                    order.note,
                    i64::from(order.total_price),
                    order.status.as_str(),
                    rfc3339(order.created_at)?,
                ],
            )
            .context("failed to insert order")?;
        Ok(())
    }

    /// List orders newest first, optionally filtered by status.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded from `SQLite`.
    pub fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<OrderRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut orders = Vec::new();

        let mut push_row = |row: &rusqlite::Row<'_>| -> Result<()> {
            let id_raw: String = row.get(0)?;
            let item_id_raw: String = row.get(1)?;
            let add_ons_json: String = row.get(3)?;
            let status_raw: String = row.get(6)?;
            let created_at_raw: String = row.get(7)?;
            orders.push(OrderRecord {
                id: parse_order_id(&id_raw)?,
                item_id: parse_menu_item_id(&item_id_raw)?,
                item_name: row.get(2)?,
                add_ons: serde_json::from_str(&add_ons_json)
                    .context("failed to deserialize add-ons")?,
                note: row.get(4)?,
                total_price: row.get(5)?,
                status: OrderStatus::parse(&status_raw)
                    .ok_or_else(|| anyhow!("unknown order status: {status_raw}"))?,
                created_at: parse_rfc3339(&created_at_raw)?,
            });
            Ok(())
        };

        if let Some(status) = status {
            let mut stmt = self.conn.prepare(
                "SELECT id, item_id, item_name, add_ons_json, note, total_price, status, created_at
                 FROM orders WHERE status = ?1
                 ORDER BY created_at DESC, id ASC LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![status.as_str(), limit])?;
            while let Some(row) = rows.next()? {
                push_row(row)?;
            }
        } else {
            let mut stmt = self.conn.prepare(
                "SELECT id, item_id, item_name, add_ons_json, note, total_price, status, created_at
                 FROM orders
                 ORDER BY created_at DESC, id ASC LIMIT ?1",
            )?;
            let mut rows = stmt.query(params![limit])?;
            while let Some(row) = rows.next()? {
                push_row(row)?;
            }
        }

        Ok(orders)
    }

    /// Move one order to a new status.
    ///
    /// # Errors
    /// Returns an error when the id is unknown or the update fails.
    pub fn update_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE orders SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id.to_string()],
            )
            .context("failed to update order status")?;
        if updated == 0 {
            return Err(anyhow!("order not found: {id}"));
        }
        Ok(())
    }

    /// Order counts and summed totals for today, the trailing 7 and 30 days,
    /// and all time, on shop-local day boundaries.
    ///
    /// # Errors
    /// Returns an error when order rows cannot be read.
    pub fn analytics_summary(&self) -> Result<AnalyticsSummary> {
        let rows = self.analytics_rows()?;
        Ok(summarize(&rows, shop_today()))
    }

    /// Per-item order counts and revenue over non-cancelled orders, most
    /// ordered first.
    ///
    /// # Errors
    /// Returns an error when order rows cannot be read.
    pub fn top_items(&self, limit: usize) -> Result<Vec<TopItem>> {
        let rows = self.analytics_rows()?;
        Ok(aggregate_top_items(&rows, limit))
    }

    /// Per-day order counts and totals for the trailing `days` shop days,
    /// oldest first, zero-filled.
    ///
    /// # Errors
    /// Returns an error when order rows cannot be read.
    pub fn daily_sales(&self, days: u32) -> Result<Vec<DailySales>> {
        let rows = self.analytics_rows()?;
        Ok(aggregate_daily_sales(&rows, days, shop_today()))
    }

    /// Status counts plus completed-order revenue inside the trailing `days`
    /// window; `days >= 365` drops the window entirely.
    ///
    /// # Errors
    /// Returns an error when order rows cannot be read.
    pub fn order_stats(&self, days: u32) -> Result<OrderStats> {
        let rows = self.analytics_rows()?;
        Ok(aggregate_order_stats(&rows, days, shop_today()))
    }

    /// Run quick-check, foreign-key-check, and schema status health probes.
    ///
    /// # Errors
    /// Returns an error when any integrity probe query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let mut stmt = self
            .conn
            .prepare("PRAGMA foreign_key_check")
            .context("failed to prepare PRAGMA foreign_key_check")?;
        let rows = stmt.query_map([], |row| {
            Ok(ForeignKeyViolation {
                table: row.get(0)?,
                rowid: row.get(1)?,
                parent: row.get(2)?,
                fk_index: row.get(3)?,
            })
        })?;

        let mut foreign_key_violations = Vec::new();
        for row in rows {
            foreign_key_violations.push(row?);
        }

        let schema_status = self.schema_status()?;
        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            foreign_key_violations,
            schema_status,
        })
    }

    /// Write a consistent point-in-time copy of the database to `out_file`.
    ///
    /// # Errors
    /// Returns an error when the destination cannot be created or the backup fails.
    pub fn backup_database(&self, out_file: &Path) -> Result<()> {
        if let Some(parent) = out_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory for backup file {}", out_file.display())
            })?;
        }

        self.conn
            .backup(DatabaseName::Main, out_file, None)
            .with_context(|| format!("failed to create sqlite backup at {}", out_file.display()))
    }

    /// Restore this database from a `SQLite` backup file, then migrate to latest.
    ///
    /// # Errors
    /// Returns an error when the backup file is missing, restore fails, or migrations fail.
    pub fn restore_database(&mut self, in_file: &Path) -> Result<()> {
        if !in_file.exists() {
            return Err(anyhow!("backup file does not exist: {}", in_file.display()));
        }

        self.conn
            .restore(DatabaseName::Main, in_file, None::<fn(rusqlite::backup::Progress)>)
            .with_context(|| {
                format!("failed to restore sqlite backup from {}", in_file.display())
            })?;

        self.migrate()?;
        Ok(())
    }

    fn analytics_rows(&self) -> Result<Vec<OrderAnalyticsRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT item_name, total_price, status, created_at FROM orders")?;

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let status_raw: String = row.get(2)?;
            let created_at_raw: String = row.get(3)?;
            let total_price: i64 = row.get(1)?;
            out.push(OrderAnalyticsRow {
                item_name: row.get(0)?,
                total_price: u64::try_from(total_price).unwrap_or(0),
                status: OrderStatus::parse(&status_raw)
                    .ok_or_else(|| anyhow!("unknown order status: {status_raw}"))?,
                created_at: parse_rfc3339(&created_at_raw)?,
            });
        }
        Ok(out)
    }
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn snapshot_digest(items: &[MenuItem]) -> String {
    let mut lines = items
        .iter()
        .map(|item| format!("{}:{}", item.id, i32::from(item.active)))
        .collect::<Vec<_>>();
    lines.sort();

    let mut hasher = Sha256::new();
    hasher.update(lines.join("\n").as_bytes());
    let digest = hasher.finalize();
    format!("cat_{}", hex::encode(&digest[..8]))
}

fn shop_offset() -> UtcOffset {
    UtcOffset::from_hms(SHOP_UTC_OFFSET_HOURS, 0, 0).unwrap_or(UtcOffset::UTC)
}

fn shop_date(timestamp: OffsetDateTime) -> Date {
    timestamp.to_offset(shop_offset()).date()
}

fn shop_today() -> Date {
    shop_date(OffsetDateTime::now_utc())
}

fn window_start(today: Date, days: u32) -> Date {
    let span = Duration::days(i64::from(days.max(1)) - 1);
    today.checked_sub(span).unwrap_or(Date::MIN)
}

fn summarize(rows: &[OrderAnalyticsRow], today: Date) -> AnalyticsSummary {
    let week_start = window_start(today, 7);
    let month_start = window_start(today, 30);
    let mut summary = AnalyticsSummary {
        today: PeriodStats::default(),
        last_7_days: PeriodStats::default(),
        last_30_days: PeriodStats::default(),
        all_time: PeriodStats::default(),
    };

    for row in rows {
        let date = shop_date(row.created_at);
        add_period(&mut summary.all_time, row);
        if date >= month_start && date <= today {
            add_period(&mut summary.last_30_days, row);
        }
        if date >= week_start && date <= today {
            add_period(&mut summary.last_7_days, row);
        }
        if date == today {
            add_period(&mut summary.today, row);
        }
    }

    summary
}

fn add_period(period: &mut PeriodStats, row: &OrderAnalyticsRow) {
    period.orders += 1;
    period.revenue += row.total_price;
}

fn aggregate_top_items(rows: &[OrderAnalyticsRow], limit: usize) -> Vec<TopItem> {
    let mut by_name: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for row in rows {
        if row.status == OrderStatus::Cancelled {
            continue;
        }
        let entry = by_name.entry(row.item_name.as_str()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += row.total_price;
    }

    let mut items = by_name
        .into_iter()
        .map(|(item_name, (orders, revenue))| TopItem {
            item_name: item_name.to_string(),
            orders,
            revenue,
        })
        .collect::<Vec<_>>();
    items.sort_by(|a, b| {
        b.orders
            .cmp(&a.orders)
            .then_with(|| b.revenue.cmp(&a.revenue))
            .then_with(|| a.item_name.cmp(&b.item_name))
    });
    items.truncate(limit);
    items
}

fn aggregate_daily_sales(rows: &[OrderAnalyticsRow], days: u32, today: Date) -> Vec<DailySales> {
    if days == 0 {
        return Vec::new();
    }
    let start = window_start(today, days);

    let mut by_date: BTreeMap<Date, (u64, u64)> = BTreeMap::new();
    for row in rows {
        let date = shop_date(row.created_at);
        if date >= start && date <= today {
            let entry = by_date.entry(date).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += row.total_price;
        }
    }

    let mut out = Vec::new();
    let mut date = start;
    loop {
        let (orders, revenue) = by_date.get(&date).copied().unwrap_or((0, 0));
        out.push(DailySales { date: date.to_string(), orders, revenue });
        if date >= today {
            break;
        }
        match date.next_day() {
            Some(next) => date = next,
            None => break,
        }
    }
    out
}

fn aggregate_order_stats(rows: &[OrderAnalyticsRow], days: u32, today: Date) -> OrderStats {
    let windowed = days < 365;
    let start = window_start(today, days);

    let mut stats = OrderStats { total: 0, pending: 0, completed: 0, cancelled: 0, revenue: 0 };
    for row in rows {
        if windowed {
            let date = shop_date(row.created_at);
            if date < start || date > today {
                continue;
            }
        }
        stats.total += 1;
        match row.status {
            OrderStatus::Pending => stats.pending += 1,
            OrderStatus::Completed => {
                stats.completed += 1;
                stats.revenue += row.total_price;
            }
            OrderStatus::Cancelled => stats.cancelled += 1,
        }
    }
    stats
}

fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}

fn parse_menu_item_id(raw: &str) -> Result<MenuItemId> {
    let parsed = Ulid::from_string(raw).with_context(|| format!("invalid ULID: {raw}"))?;
    Ok(MenuItemId(parsed))
}

fn parse_order_id(raw: &str) -> Result<OrderId> {
    let parsed = Ulid::from_string(raw).with_context(|| format!("invalid ULID: {raw}"))?;
    Ok(OrderId(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_intent_core::AppliedAddOn;

    fn ts(value: &str) -> OffsetDateTime {
        match parse_rfc3339(value) {
            Ok(parsed) => parsed,
            Err(err) => panic!("invalid fixture timestamp {value}: {err}"),
        }
    }

    fn fixture_today() -> Date {
        shop_date(ts("2026-03-10T12:00:00+07:00"))
    }

    fn mk_row(item_name: &str, total_price: u64, status: OrderStatus, created_at: &str) -> OrderAnalyticsRow {
        OrderAnalyticsRow {
            item_name: item_name.to_string(),
            total_price,
            status,
            created_at: ts(created_at),
        }
    }

    fn mk_order(
        item_id: MenuItemId,
        item_name: &str,
        total_price: u32,
        status: OrderStatus,
        created_at: OffsetDateTime,
    ) -> OrderRecord {
        OrderRecord {
            id: OrderId::new(),
            item_id,
            item_name: item_name.to_string(),
            add_ons: vec![AppliedAddOn { name: "ไข่ดาว".to_string(), surcharge: 10 }],
            note: None,
            total_price,
            status,
            created_at,
        }
    }

    fn mk_draft(name: &str, keywords: &str) -> MenuItemDraft {
        MenuItemDraft {
            name: name.to_string(),
            keyword_set: keywords.split(',').map(str::to_string).collect(),
            base_price: 55,
            category: Category::Special,
        }
    }

    #[test]
    fn schema_status_reports_pending_before_migrate() -> Result<()> {
        let store = SqliteStore::open(Path::new(":memory:"))?;

        let status = store.schema_status()?;
        assert_eq!(status.current_version, 0);
        assert_eq!(status.target_version, LATEST_SCHEMA_VERSION);
        assert_eq!(status.pending_versions, vec![1, 2]);

        Ok(())
    }

    #[test]
    fn migrate_initializes_schema_and_is_idempotent() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.migrate()?;
        store.migrate()?;

        let status = store.schema_status()?;
        assert_eq!(status.current_version, LATEST_SCHEMA_VERSION);
        assert!(status.pending_versions.is_empty());

        Ok(())
    }

    #[test]
    fn sqlite_constraints_enforce_checks_and_foreign_keys() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.migrate()?;

        let now = now_rfc3339()?;
        let check_result = store.conn.execute(
            "INSERT INTO menu_items(id, name, keywords, base_price, category, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                MenuItemId::new().to_string(),
                "ขนมหวาน",
                "ขนม",
                40_i64,
                "dessert",
                true,
                now,
                now,
            ],
        );
        assert!(check_result.is_err());

        let fk_result = store.conn.execute(
            "INSERT INTO orders(id, item_id, item_name, add_ons_json, note, total_price, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                OrderId::new().to_string(),
                MenuItemId::new().to_string(),
                "ข้าวกะเพราหมู",
                "[]",
                Option::<String>::None,
                50_i64,
                "pending",
                now,
            ],
        );
        assert!(fk_result.is_err());

        Ok(())
    }

    #[test]
    fn bootstrap_seeds_the_default_menu_once() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;

        assert_eq!(store.bootstrap()?, 49);
        assert_eq!(store.bootstrap()?, 0);

        let items = store.list_menu_items()?;
        assert_eq!(items.len(), 49);
        assert!(items.iter().all(|item| item.active));

        Ok(())
    }

    #[test]
    fn insert_menu_item_round_trips() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.migrate()?;

        let inserted = store.insert_menu_item(mk_draft("แกงเขียวหวานไก่", "แกงเขียวหวาน,ไก่"))?;
        let items = store.list_menu_items()?;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0], inserted);
        assert_eq!(items[0].keyword_set, vec!["แกงเขียวหวาน", "ไก่"]);
        assert_eq!(items[0].base_price, 55);
        assert!(items[0].active);

        let duplicate = store.insert_menu_item(mk_draft("แกงเขียวหวานไก่", "แกง"));
        assert!(duplicate.is_err());

        Ok(())
    }

    #[test]
    fn keywords_with_commas_are_rejected() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.migrate()?;

        let mut draft = mk_draft("ทดสอบ", "แกง");
        draft.keyword_set = vec!["แกง,เผ็ด".to_string()];
        let err = match store.insert_menu_item(draft) {
            Ok(_) => panic!("expected comma keyword to be rejected"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("MUST NOT contain commas"));

        Ok(())
    }

    #[test]
    fn set_item_active_flips_partition_and_snapshot_id() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.bootstrap()?;

        let before = store.load_snapshot()?;
        assert_eq!(before.active.len(), 49);
        assert!(before.inactive.is_empty());
        assert!(before.snapshot_id.starts_with("cat_"));
        assert_eq!(before.snapshot_id.len(), 4 + 16);

        let target = before.active[0].id;
        store.set_item_active(target, false)?;
        let during = store.load_snapshot()?;
        assert_eq!(during.active.len(), 48);
        assert_eq!(during.inactive.len(), 1);
        assert_ne!(during.snapshot_id, before.snapshot_id);

        store.set_item_active(target, true)?;
        let after = store.load_snapshot()?;
        assert_eq!(after.snapshot_id, before.snapshot_id);

        Ok(())
    }

    #[test]
    fn unknown_ids_are_rejected() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.bootstrap()?;

        let item_err = match store.set_item_active(MenuItemId::new(), false) {
            Ok(()) => panic!("expected unknown menu item id to be rejected"),
            Err(err) => err,
        };
        assert!(item_err.to_string().contains("menu item not found"));

        let order_err = match store.update_order_status(OrderId::new(), OrderStatus::Completed) {
            Ok(()) => panic!("expected unknown order id to be rejected"),
            Err(err) => err,
        };
        assert!(order_err.to_string().contains("order not found"));

        Ok(())
    }

    #[test]
    fn orders_round_trip_with_status_filter_and_limit() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.bootstrap()?;

        let items = store.list_menu_items()?;
        let item = &items[0];
        let base = ts("2026-03-10T10:00:00Z");

        let oldest = mk_order(item.id, &item.name, 60, OrderStatus::Completed, base - Duration::minutes(2));
        let middle = mk_order(item.id, &item.name, 50, OrderStatus::Pending, base - Duration::minutes(1));
        let newest = mk_order(item.id, &item.name, 70, OrderStatus::Pending, base);
        store.insert_order(&oldest)?;
        store.insert_order(&middle)?;
        store.insert_order(&newest)?;

        let all = store.list_orders(None, 10)?;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, newest.id);
        assert_eq!(all[2].id, oldest.id);
        assert_eq!(all[0].add_ons, newest.add_ons);

        let completed = store.list_orders(Some(OrderStatus::Completed), 10)?;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, oldest.id);

        let limited = store.list_orders(None, 1)?;
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, newest.id);

        store.update_order_status(middle.id, OrderStatus::Cancelled)?;
        let cancelled = store.list_orders(Some(OrderStatus::Cancelled), 10)?;
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, middle.id);

        Ok(())
    }

    #[test]
    fn summarize_buckets_on_shop_day_boundaries() {
        let rows = vec![
            // 17:30 UTC is 00:30 shop time the next day.
            mk_row("ข้าวกะเพราหมู", 50, OrderStatus::Pending, "2026-03-09T17:30:00Z"),
            mk_row("ข้าวกะเพราหมู", 50, OrderStatus::Completed, "2026-03-09T16:30:00Z"),
            mk_row("ข้าวผัดหมู", 50, OrderStatus::Completed, "2026-03-01T10:00:00Z"),
            mk_row("ต้มยำกุ้ง", 50, OrderStatus::Cancelled, "2026-01-01T10:00:00Z"),
        ];

        let summary = summarize(&rows, fixture_today());
        assert_eq!(summary.today, PeriodStats { orders: 1, revenue: 50 });
        assert_eq!(summary.last_7_days, PeriodStats { orders: 2, revenue: 100 });
        assert_eq!(summary.last_30_days, PeriodStats { orders: 3, revenue: 150 });
        assert_eq!(summary.all_time, PeriodStats { orders: 4, revenue: 200 });
    }

    #[test]
    fn daily_sales_zero_fills_oldest_first() {
        let rows = vec![
            mk_row("ข้าวกะเพราหมู", 50, OrderStatus::Pending, "2026-03-08T05:00:00Z"),
            mk_row("ข้าวกะเพราหมู", 50, OrderStatus::Pending, "2026-03-09T17:30:00Z"),
            mk_row("ข้าวผัดหมู", 50, OrderStatus::Completed, "2026-03-10T03:00:00Z"),
        ];

        let sales = aggregate_daily_sales(&rows, 3, fixture_today());
        assert_eq!(sales.len(), 3);
        assert_eq!(sales[0], DailySales { date: "2026-03-08".to_string(), orders: 1, revenue: 50 });
        assert_eq!(sales[1], DailySales { date: "2026-03-09".to_string(), orders: 0, revenue: 0 });
        assert_eq!(sales[2], DailySales { date: "2026-03-10".to_string(), orders: 2, revenue: 100 });

        assert!(aggregate_daily_sales(&rows, 0, fixture_today()).is_empty());
    }

    #[test]
    fn order_stats_window_and_completed_revenue() {
        let rows = vec![
            mk_row("ข้าวกะเพราหมู", 60, OrderStatus::Completed, "2026-03-10T03:00:00Z"),
            mk_row("ข้าวกะเพราหมู", 50, OrderStatus::Pending, "2026-03-09T10:00:00Z"),
            mk_row("ข้าวผัดหมู", 50, OrderStatus::Cancelled, "2026-03-08T10:00:00Z"),
            mk_row("ต้มยำกุ้ง", 100, OrderStatus::Completed, "2026-02-01T10:00:00Z"),
        ];

        let windowed = aggregate_order_stats(&rows, 7, fixture_today());
        assert_eq!(
            windowed,
            OrderStats { total: 3, pending: 1, completed: 1, cancelled: 1, revenue: 60 }
        );

        let unwindowed = aggregate_order_stats(&rows, 365, fixture_today());
        assert_eq!(
            unwindowed,
            OrderStats { total: 4, pending: 1, completed: 2, cancelled: 1, revenue: 160 }
        );
    }

    #[test]
    fn top_items_exclude_cancelled_orders() {
        let rows = vec![
            mk_row("ข้าวกะเพราหมู", 50, OrderStatus::Completed, "2026-03-10T03:00:00Z"),
            mk_row("ข้าวกะเพราหมู", 50, OrderStatus::Pending, "2026-03-10T04:00:00Z"),
            mk_row("ต้มยำกุ้ง", 100, OrderStatus::Pending, "2026-03-10T05:00:00Z"),
            mk_row("ต้มยำกุ้ง", 100, OrderStatus::Cancelled, "2026-03-10T06:00:00Z"),
            mk_row("ต้มยำกุ้ง", 100, OrderStatus::Cancelled, "2026-03-10T07:00:00Z"),
        ];

        let top = aggregate_top_items(&rows, 10);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0], TopItem { item_name: "ข้าวกะเพราหมู".to_string(), orders: 2, revenue: 100 });
        assert_eq!(top[1], TopItem { item_name: "ต้มยำกุ้ง".to_string(), orders: 1, revenue: 100 });

        let limited = aggregate_top_items(&rows, 1);
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].item_name, "ข้าวกะเพราหมู");
    }

    #[test]
    fn analytics_summary_counts_fresh_orders() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.bootstrap()?;

        let items = store.list_menu_items()?;
        let order = mk_order(
            items[0].id,
            &items[0].name,
            60,
            OrderStatus::Pending,
            OffsetDateTime::now_utc(),
        );
        store.insert_order(&order)?;

        let summary = store.analytics_summary()?;
        assert_eq!(summary.today, PeriodStats { orders: 1, revenue: 60 });
        assert_eq!(summary.all_time, PeriodStats { orders: 1, revenue: 60 });

        Ok(())
    }

    #[test]
    fn integrity_check_reports_clean_database() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.migrate()?;

        let report = store.integrity_check()?;
        assert!(report.quick_check_ok);
        assert!(report.foreign_key_violations.is_empty());
        assert_eq!(report.schema_status.current_version, LATEST_SCHEMA_VERSION);

        Ok(())
    }

    #[test]
    fn backup_and_restore_database_round_trip() -> Result<()> {
        let mut source = SqliteStore::open(Path::new(":memory:"))?;
        source.bootstrap()?;

        let items = source.list_menu_items()?;
        let order = mk_order(
            items[0].id,
            &items[0].name,
            50,
            OrderStatus::Pending,
            OffsetDateTime::now_utc(),
        );
        source.insert_order(&order)?;

        let backup_file =
            std::env::temp_dir().join(format!("orderintent-backup-{}.sqlite3", Ulid::new()));
        source.backup_database(&backup_file)?;

        let mut target = SqliteStore::open(Path::new(":memory:"))?;
        target.restore_database(&backup_file)?;
        assert_eq!(target.list_menu_items()?.len(), 49);
        let restored = target.list_orders(None, 10)?;
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].id, order.id);

        fs::remove_file(&backup_file).with_context(|| {
            format!("failed to cleanup temp backup file {}", backup_file.display())
        })?;

        Ok(())
    }
}
