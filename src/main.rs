use clap::{Args, Parser, Subcommand, ValueEnum};
use iap_billing::application::orchestrator::{BillingOrchestrator, FlowOutcome};
use iap_billing::config::BillingConfig;
use iap_billing::domain::api::{ApiKind, PurchaseApis};
use iap_billing::domain::ports::{PurchaseGatewayBox, TransactionStoreBox};
use iap_billing::domain::purchase::{GatewayKind, SkuInfo};
use iap_billing::domain::transaction::TransactionRecord;
use iap_billing::infrastructure::file::JsonFileTransactionStore;
use iap_billing::infrastructure::in_memory::InMemoryTransactionStore;
#[cfg(feature = "storage-rocksdb")]
use iap_billing::infrastructure::rocksdb::RocksDBStore;
use iap_billing::infrastructure::simulated::{
    ConsumeScript, Ledger, PurchaseScript, SimulatedPlatform, SimulatedReceiptGateway,
    SimulatedServerApi, SimulatedTokenGateway,
};
use iap_billing::interfaces::console::ConsoleEvents;
use iap_billing::interfaces::csv::catalog_reader::CatalogReader;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LEDGER_FILE: &str = "ledger.json";
const RECORD_FILE: &str = "transaction.json";
#[cfg(feature = "storage-rocksdb")]
const ROCKSDB_DIR: &str = "db";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the pending transaction and the simulated store ledger
    #[arg(long, default_value = ".iap-billing")]
    state_dir: PathBuf,

    /// Platform store variant to simulate
    #[arg(long, value_enum, default_value_t = Platform::Token)]
    platform: Platform,

    /// Where the pending transaction is persisted
    #[arg(long, value_enum, default_value_t = StoreKind::File)]
    store: StoreKind,

    /// JSON config file (product catalog, timeouts)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Product catalog CSV (product_id,title,price,currency)
    #[arg(long)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Buy a product end to end
    Purchase(FlowArgs),
    /// Finish an interrupted transaction, or buy the product if none is pending
    Recover(FlowArgs),
    /// Show the pending transaction and unconsumed purchases
    Status,
    /// List the store listings of the catalog
    Products,
}

#[derive(Args)]
struct FlowArgs {
    #[arg(long)]
    product: String,

    #[arg(long, default_value_t = 1)]
    quantity: u32,

    /// How the simulated store answers the purchase request
    #[arg(long, value_enum, default_value_t = Outcome::Succeed)]
    outcome: Outcome,

    /// Make the server reject the grant request
    #[arg(long)]
    fail_grant: bool,

    /// Make the store reject the consume request
    #[arg(long)]
    fail_consume: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Platform {
    Token,
    Receipt,
}

impl From<Platform> for GatewayKind {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::Token => GatewayKind::Token,
            Platform::Receipt => GatewayKind::Receipt,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreKind {
    File,
    Memory,
    Rocksdb,
}

#[derive(Clone, Copy, ValueEnum)]
enum Outcome {
    Succeed,
    Fail,
    Cancel,
    /// Leave the purchase awaiting verification
    Defer,
}

impl Outcome {
    fn script(self) -> PurchaseScript {
        match self {
            Outcome::Succeed => PurchaseScript::Succeed,
            Outcome::Fail => PurchaseScript::Fail {
                code: 6,
                message: "payment declined".to_string(),
            },
            Outcome::Cancel => PurchaseScript::Cancel,
            Outcome::Defer => PurchaseScript::AwaitVerification,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.state_dir).into_diagnostic()?;

    let catalog = match &cli.catalog {
        Some(path) => {
            let file = File::open(path).into_diagnostic()?;
            CatalogReader::new(file).read_all().into_diagnostic()?
        }
        None => SimulatedPlatform::default_catalog(),
    };
    let mut config = match &cli.config {
        Some(path) => BillingConfig::from_path(path).into_diagnostic()?,
        None => BillingConfig::default(),
    };
    if config.product_catalog.is_empty() {
        config.product_catalog = catalog_ids(&catalog);
    }

    let store = open_store(cli.store, &cli.state_dir)?;

    let ledger_path = cli.state_dir.join(LEDGER_FILE);
    let ledger = Ledger::load(&ledger_path).into_diagnostic()?;
    let platform = SimulatedPlatform::with_ledger(catalog, ledger);

    let kind = GatewayKind::from(cli.platform);
    let gateway: PurchaseGatewayBox = match kind {
        GatewayKind::Receipt => Box::new(SimulatedReceiptGateway::new(platform.clone())),
        GatewayKind::Token => Box::new(SimulatedTokenGateway::new(platform.clone())),
    };

    let mut grant_api = SimulatedServerApi::new(ApiKind::Grant, platform.clone());
    if let Command::Purchase(args) | Command::Recover(args) = &cli.command {
        platform.script_purchase(args.outcome.script()).await;
        if args.fail_consume {
            platform
                .script_consume(ConsumeScript::Fail("consume rejected by store".to_string()))
                .await;
        }
        if args.fail_grant {
            grant_api = grant_api.failing("grant rejected by server");
        }
    }
    let apis = PurchaseApis::new(
        Arc::new(SimulatedServerApi::new(ApiKind::Start, platform.clone())),
        Arc::new(grant_api),
    );

    let mut orchestrator =
        BillingOrchestrator::new(gateway, store, apis, Arc::new(ConsoleEvents::new()), config);

    let outcome: FlowOutcome = match &cli.command {
        Command::Purchase(args) => orchestrator
            .purchase_auto(&args.product, args.quantity)
            .await
            .into_diagnostic()?,
        Command::Recover(args) => orchestrator
            .recover(&args.product, args.quantity)
            .await
            .into_diagnostic()?,
        Command::Products => orchestrator.request_product_list().await.into_diagnostic()?,
        Command::Status => {
            let pending = orchestrator.pending_transaction().await.into_diagnostic()?;
            print_status(pending, &platform.ledger().await);
            return Ok(());
        }
    };

    platform
        .ledger()
        .await
        .save(&ledger_path)
        .into_diagnostic()?;
    println!("outcome={outcome:?}");

    Ok(())
}

fn open_store(kind: StoreKind, state_dir: &Path) -> Result<TransactionStoreBox> {
    let store: TransactionStoreBox = match kind {
        StoreKind::Memory => Box::new(InMemoryTransactionStore::new()),
        StoreKind::File => Box::new(
            JsonFileTransactionStore::open(state_dir.join(RECORD_FILE)).into_diagnostic()?,
        ),
        #[cfg(feature = "storage-rocksdb")]
        StoreKind::Rocksdb => {
            Box::new(RocksDBStore::open(state_dir.join(ROCKSDB_DIR)).into_diagnostic()?)
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        StoreKind::Rocksdb => {
            eprintln!(
                "WARNING: RocksDB storage requested via --store rocksdb, but 'storage-rocksdb' feature is not enabled. Falling back to JSON file storage."
            );
            Box::new(
                JsonFileTransactionStore::open(state_dir.join(RECORD_FILE)).into_diagnostic()?,
            )
        }
    };
    Ok(store)
}

fn print_status(pending: Option<TransactionRecord>, ledger: &Ledger) {
    match pending {
        Some(record) => println!(
            "pending product_id={} transaction_id={} quantity={} state={:?}",
            record.product_id, record.transaction_id, record.quantity, record.state
        ),
        None => println!("pending=none"),
    }
    let unconsumed: Vec<&str> = ledger
        .unconsumed
        .iter()
        .map(|p| p.product_id.as_str())
        .collect();
    println!("unconsumed={}", unconsumed.join(","));
    println!("granted={}", ledger.granted.len());
}

fn catalog_ids(catalog: &[SkuInfo]) -> Vec<String> {
    catalog.iter().map(|s| s.product_id.clone()).collect()
}
