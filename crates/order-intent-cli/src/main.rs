use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use order_intent_api::OrderIntentApi;
use order_intent_core::{
    Category, DisabledOracle, MenuItemDraft, MenuItemId, OrderId, OrderStatus, VerificationOracle,
};
use order_intent_oracle::{
    ChatOracle, OracleConfig, DEFAULT_ORACLE_MODEL, DEFAULT_ORACLE_TIMEOUT_MS,
};
use serde_json::Value;

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const DEFAULT_ORDER_LIST_LIMIT: usize = 50;
const DEFAULT_TOP_ITEMS_LIMIT: usize = 10;
const DEFAULT_ANALYTICS_DAYS: u32 = 7;

#[derive(Debug, Parser)]
#[command(name = "oi")]
#[command(about = "Order intent engine CLI")]
struct Cli {
    #[arg(long, default_value = "./order_intent.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: Box<DbCommand>,
    },
    Menu {
        #[command(subcommand)]
        command: Box<MenuCommand>,
    },
    Order {
        #[command(subcommand)]
        command: Box<OrderCommand>,
    },
    Analytics {
        #[command(subcommand)]
        command: Box<AnalyticsCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    Bootstrap,
    IntegrityCheck,
    Backup(DbBackupArgs),
    Restore(DbRestoreArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct DbBackupArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct DbRestoreArgs {
    #[arg(long)]
    from: PathBuf,
}

#[derive(Debug, Subcommand)]
enum MenuCommand {
    List(MenuListArgs),
    Add(MenuAddArgs),
    SetActive(MenuSetActiveArgs),
    Reload,
}

#[derive(Debug, Args)]
struct MenuListArgs {
    #[arg(long, default_value_t = false)]
    include_inactive: bool,
}

#[derive(Debug, Args)]
struct MenuAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    price: u32,
    #[arg(long)]
    category: CategoryArg,
    #[arg(long, value_delimiter = ',', required = true)]
    keywords: Vec<String>,
}

#[derive(Debug, Args)]
struct MenuSetActiveArgs {
    #[arg(long)]
    id: String,
    #[arg(long, action = ArgAction::Set)]
    active: bool,
}

#[derive(Debug, Subcommand)]
enum OrderCommand {
    Resolve(OrderResolveArgs),
    Suggest(OrderSuggestArgs),
    Place(OrderPlaceArgs),
    List(OrderListArgs),
    SetStatus(OrderSetStatusArgs),
}

#[derive(Debug, Args)]
struct OrderResolveArgs {
    #[arg(long)]
    text: String,
    #[command(flatten)]
    oracle: OracleArgs,
}

#[derive(Debug, Args)]
struct OrderSuggestArgs {
    #[arg(long)]
    text: String,
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Debug, Args)]
struct OrderPlaceArgs {
    #[arg(long)]
    text: String,
    #[command(flatten)]
    oracle: OracleArgs,
}

#[derive(Debug, Args)]
struct OrderListArgs {
    #[arg(long)]
    status: Option<StatusArg>,
    #[arg(long, default_value_t = DEFAULT_ORDER_LIST_LIMIT)]
    limit: usize,
}

#[derive(Debug, Args)]
struct OrderSetStatusArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    status: StatusArg,
}

#[derive(Debug, Args)]
struct OracleArgs {
    /// Chat-completions endpoint; without one the oracle is disabled.
    #[arg(long)]
    oracle_endpoint: Option<String>,
    #[arg(long, default_value = DEFAULT_ORACLE_MODEL)]
    oracle_model: String,
    #[arg(long)]
    oracle_api_key: Option<String>,
    #[arg(long, default_value_t = DEFAULT_ORACLE_TIMEOUT_MS)]
    oracle_timeout_ms: u64,
}

#[derive(Debug, Subcommand)]
enum AnalyticsCommand {
    Summary,
    TopItems(TopItemsArgs),
    DailySales(DailySalesArgs),
    OrderStats(OrderStatsArgs),
}

#[derive(Debug, Args)]
struct TopItemsArgs {
    #[arg(long, default_value_t = DEFAULT_TOP_ITEMS_LIMIT)]
    limit: usize,
}

#[derive(Debug, Args)]
struct DailySalesArgs {
    #[arg(long, default_value_t = DEFAULT_ANALYTICS_DAYS)]
    days: u32,
}

#[derive(Debug, Args)]
struct OrderStatsArgs {
    #[arg(long, default_value_t = DEFAULT_ANALYTICS_DAYS)]
    days: u32,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CategoryArg {
    Standard,
    Premium,
    Special,
    Soup,
    Salad,
    Kapkhao,
}

impl CategoryArg {
    fn into_category(self) -> Category {
        match self {
            Self::Standard => Category::Standard,
            Self::Premium => Category::Premium,
            Self::Special => Category::Special,
            Self::Soup => Category::Soup,
            Self::Salad => Category::Salad,
            Self::Kapkhao => Category::Kapkhao,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    Completed,
    Cancelled,
}

impl StatusArg {
    fn into_status(self) -> OrderStatus {
        match self {
            Self::Pending => OrderStatus::Pending,
            Self::Completed => OrderStatus::Completed,
            Self::Cancelled => OrderStatus::Cancelled,
        }
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn build_oracle(args: &OracleArgs) -> Box<dyn VerificationOracle + Send + Sync> {
    let endpoint = args
        .oracle_endpoint
        .clone()
        .or_else(|| std::env::var("ORDER_INTENT_ORACLE_ENDPOINT").ok());
    let Some(endpoint) = endpoint else {
        return Box::new(DisabledOracle);
    };
    let mut config = OracleConfig::new(endpoint, args.oracle_model.clone());
    config.api_key = args
        .oracle_api_key
        .clone()
        .or_else(|| std::env::var("ORDER_INTENT_ORACLE_API_KEY").ok());
    config.timeout_ms = args.oracle_timeout_ms;
    Box::new(ChatOracle::new(config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Db { command } => run_db(*command, &cli.db),
        Command::Menu { command } => run_menu(*command, &cli.db),
        Command::Order { command } => run_order(*command, &cli.db),
        Command::Analytics { command } => run_analytics(*command, &cli.db),
    }
}

fn run_db(command: DbCommand, db: &Path) -> Result<()> {
    let api = OrderIntentApi::with_disabled_oracle(db.to_path_buf());
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty()
            }))
        }
        DbCommand::Migrate(args) => {
            let result = api.migrate(args.dry_run)?;
            emit_json(serde_json::to_value(&result).context("failed to serialize migrate result")?)
        }
        DbCommand::Bootstrap => {
            let result = api.bootstrap()?;
            emit_json(
                serde_json::to_value(&result).context("failed to serialize bootstrap result")?,
            )
        }
        DbCommand::IntegrityCheck => {
            let report = api.integrity_check()?;
            emit_json(
                serde_json::to_value(&report).context("failed to serialize integrity report")?,
            )
        }
        DbCommand::Backup(args) => {
            let result = api.backup(&args.out)?;
            emit_json(serde_json::to_value(&result).context("failed to serialize backup result")?)
        }
        DbCommand::Restore(args) => {
            let result = api.restore(&args.from)?;
            emit_json(serde_json::to_value(&result).context("failed to serialize restore result")?)
        }
    }
}

fn run_menu(command: MenuCommand, db: &Path) -> Result<()> {
    let api = OrderIntentApi::with_disabled_oracle(db.to_path_buf());
    match command {
        MenuCommand::List(args) => {
            let view = api.menu(args.include_inactive)?;
            emit_json(serde_json::to_value(&view).context("failed to serialize menu view")?)
        }
        MenuCommand::Add(args) => {
            let draft = MenuItemDraft {
                name: args.name,
                keyword_set: args.keywords,
                base_price: args.price,
                category: args.category.into_category(),
            };
            let item = api.add_menu_item(draft)?;
            emit_json(serde_json::to_value(&item).context("failed to serialize menu item")?)
        }
        MenuCommand::SetActive(args) => {
            let id = MenuItemId::from_string(&args.id)?;
            let info = api.set_item_active(id, args.active)?;
            emit_json(serde_json::to_value(&info).context("failed to serialize snapshot info")?)
        }
        MenuCommand::Reload => {
            let info = api.reload_snapshot()?;
            emit_json(serde_json::to_value(&info).context("failed to serialize snapshot info")?)
        }
    }
}

fn run_order(command: OrderCommand, db: &Path) -> Result<()> {
    match command {
        OrderCommand::Resolve(args) => {
            let api = OrderIntentApi::new(db.to_path_buf(), build_oracle(&args.oracle));
            let report = api.resolve(&args.text)?;
            emit_json(
                serde_json::to_value(&report).context("failed to serialize resolution report")?,
            )
        }
        OrderCommand::Suggest(args) => {
            let api = OrderIntentApi::with_disabled_oracle(db.to_path_buf());
            let suggestions = api.suggest(&args.text, args.limit)?;
            emit_json(serde_json::json!({ "suggestions": suggestions }))
        }
        OrderCommand::Place(args) => {
            let api = OrderIntentApi::new(db.to_path_buf(), build_oracle(&args.oracle));
            let placed = api.place_order(&args.text)?;
            emit_json(serde_json::to_value(&placed).context("failed to serialize place result")?)
        }
        OrderCommand::List(args) => {
            let api = OrderIntentApi::with_disabled_oracle(db.to_path_buf());
            let status = args.status.map(StatusArg::into_status);
            let orders = api.list_orders(status, args.limit)?;
            emit_json(serde_json::json!({ "orders": orders }))
        }
        OrderCommand::SetStatus(args) => {
            let api = OrderIntentApi::with_disabled_oracle(db.to_path_buf());
            let id = OrderId::from_string(&args.id)?;
            let update = api.update_order_status(id, args.status.into_status())?;
            emit_json(serde_json::to_value(&update).context("failed to serialize status update")?)
        }
    }
}

fn run_analytics(command: AnalyticsCommand, db: &Path) -> Result<()> {
    let api = OrderIntentApi::with_disabled_oracle(db.to_path_buf());
    match command {
        AnalyticsCommand::Summary => {
            let summary = api.analytics_summary()?;
            emit_json(
                serde_json::to_value(&summary).context("failed to serialize analytics summary")?,
            )
        }
        AnalyticsCommand::TopItems(args) => {
            let top_items = api.top_items(args.limit)?;
            emit_json(serde_json::json!({ "top_items": top_items }))
        }
        AnalyticsCommand::DailySales(args) => {
            let daily_sales = api.daily_sales(args.days)?;
            emit_json(serde_json::json!({ "daily_sales": daily_sales }))
        }
        AnalyticsCommand::OrderStats(args) => {
            let stats = api.order_stats(args.days)?;
            emit_json(serde_json::to_value(&stats).context("failed to serialize order stats")?)
        }
    }
}
