use clap::{Parser, Subcommand};
use installment_orders::application::service::OrderService;
use installment_orders::config::AppConfig;
use installment_orders::domain::ports::OrderStoreBox;
use installment_orders::infrastructure::http::http_gateways;
use installment_orders::infrastructure::in_memory::InMemoryOrderStore;
use installment_orders::interfaces::consumer::{CallbackConsumer, ConsumerStats, RetryPolicy};
use installment_orders::interfaces::events::{PAYMENT_TOPIC, PaymentCallbackHandler};
use installment_orders::interfaces::replay::ReplaySession;
use installment_orders::telemetry;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (YAML). Defaults to `ORDER_SERVICE_CONFIG`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Postgres URL (optional). If provided, uses Postgres.
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume payment callbacks from Kafka until Ctrl-C.
    Consume,
    /// Feed a newline-delimited JSON file of payment callbacks through the consumer.
    Replay {
        file: PathBuf,
        /// Topic the messages are delivered on.
        #[arg(long, default_value = PAYMENT_TOPIC)]
        topic: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.json_logs);

    let config = AppConfig::load(cli.config.as_deref()).into_diagnostic()?;
    let database_url = cli.database_url.or_else(|| config.database.url.clone());

    let store = open_store(database_url.as_deref(), &config).await?;
    let gateways = http_gateways(&config).into_diagnostic()?;
    let service = Arc::new(OrderService::new(
        store,
        gateways,
        &config.circuit_breaker.breaker_config(),
        config.installment.order_settings(),
    ));

    let retry = RetryPolicy {
        max_attempts: config.kafka.max_retry,
        backoff: Duration::from_millis(config.kafka.retry_backoff_ms),
    };
    let mut consumer = CallbackConsumer::new(retry);
    let shutdown = shutdown_on_ctrl_c();

    match cli.command {
        Command::Consume => {
            for topic in &config.kafka.topics {
                consumer.register_topic_handler(
                    topic.clone(),
                    Arc::new(PaymentCallbackHandler::new(service.clone())),
                );
            }
            consume(&consumer, &config, shutdown).await?;
        }
        Command::Replay { file, topic } => {
            consumer.register_topic_handler(
                topic.clone(),
                Arc::new(PaymentCallbackHandler::new(service.clone())),
            );
            let mut session = ReplaySession::open(&file, topic).await.into_diagnostic()?;
            let stats = consumer.run(&mut session, shutdown).await.into_diagnostic()?;
            print_summary(&stats);
        }
    }

    Ok(())
}

async fn open_store(database_url: Option<&str>, config: &AppConfig) -> Result<OrderStoreBox> {
    let Some(url) = database_url else {
        return Ok(Box::new(InMemoryOrderStore::new()));
    };

    #[cfg(feature = "storage-postgres")]
    {
        use installment_orders::infrastructure::postgres::PgOrderStore;

        let store = PgOrderStore::connect(url, config.database.max_connections)
            .await
            .into_diagnostic()?;
        store.migrate().await.into_diagnostic()?;
        info!("using postgres order store");
        Ok(Box::new(store))
    }

    #[cfg(not(feature = "storage-postgres"))]
    {
        let _ = (url, config);
        eprintln!(
            "WARNING: Persistent storage requested via --database-url, but 'storage-postgres' feature is not enabled. Falling back to In-Memory storage."
        );
        Ok(Box::new(InMemoryOrderStore::new()))
    }
}

#[cfg(feature = "kafka")]
async fn consume(
    consumer: &CallbackConsumer,
    config: &AppConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    use installment_orders::interfaces::kafka::KafkaSession;

    let mut session = KafkaSession::connect(&config.kafka, &consumer.topics()).into_diagnostic()?;
    let stats = consumer.run(&mut session, shutdown).await.into_diagnostic()?;
    print_summary(&stats);
    Ok(())
}

#[cfg(not(feature = "kafka"))]
async fn consume(
    _consumer: &CallbackConsumer,
    _config: &AppConfig,
    _shutdown: watch::Receiver<bool>,
) -> Result<()> {
    miette::bail!("the consume command requires the 'kafka' feature")
}

fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            let _ = tx.send(true);
        }
    });
    rx
}

fn print_summary(stats: &ConsumerStats) {
    println!(
        "processed={} succeeded={} failed={} skipped={}",
        stats.processed, stats.succeeded, stats.failed, stats.skipped
    );
}
