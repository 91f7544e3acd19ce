//! ViettelPay partner CLI
//!
//! Account checks, disbursements and batch queries against the partner API.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use protocol::{BatchStatusCode, CallStatus, KeyStore, Outcome, QuerySelector, DEFAULT_KEY_BITS};
use tracing_subscriber::EnvFilter;
use viettelpay::api::{
    generate_order_id, CheckAccount, Disbursement, DisbursementResult, PartnerApi,
};
use viettelpay::config::Config;
use viettelpay::soap::SoapTransport;

/// ViettelPay partner tools.
#[derive(Parser, Debug)]
#[command(name = "viettelpay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Verify a ViettelPay account
    Verify {
        /// Subscriber number
        #[arg(long, short)]
        msisdn: String,

        /// Customer name as registered
        #[arg(long, short)]
        name: String,
    },

    /// Pay one subscriber
    Disburse {
        /// Subscriber number
        #[arg(long, short)]
        msisdn: String,

        /// Customer name as registered
        #[arg(long, short)]
        name: String,

        /// Amount in VND
        #[arg(long, short)]
        amount: u64,

        /// Batch description
        #[arg(long, default_value = "Disbursement")]
        content: String,

        /// Note attached to the transfer
        #[arg(long, default_value = "")]
        note: String,

        /// SMS text sent to the subscriber
        #[arg(long, default_value = "")]
        sms: String,
    },

    /// Query the result of a disbursement
    Query {
        /// Order id of the batch
        #[arg(long, short)]
        order_id: String,

        #[command(flatten)]
        selector: SelectorArgs,
    },

    /// Generate a partner RSA key pair
    Genkeys {
        /// Key size in bits
        #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
        bits: usize,

        /// Directory to write private.pem and public.pem into
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

/// Narrows a query to one transaction or one subscriber.
#[derive(Args, Debug, Clone, Default)]
#[group(multiple = false)]
pub struct SelectorArgs {
    /// Partner transaction id
    #[arg(long)]
    pub trans_id: Option<String>,

    /// Subscriber number
    #[arg(long = "msisdn")]
    pub msisdn: Option<String>,
}

impl SelectorArgs {
    fn into_selector(self) -> Option<QuerySelector> {
        match (self.trans_id, self.msisdn) {
            (Some(id), _) => Some(QuerySelector::TransactionId(id)),
            (None, Some(msisdn)) => Some(QuerySelector::Msisdn(msisdn)),
            (None, None) => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };
    config.apply_env_overrides();

    // Initialize tracing
    let filter = log_directive(
        cli.verbose,
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        &config.logging.level,
    );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Genkeys { bits, out_dir } => generate_keys(bits, &out_dir),
        Commands::Verify { msisdn, name } => {
            let api = connect(&config)?;
            let order_id = generate_order_id();
            tracing::info!("Order id: {}", order_id);

            let outcome = api
                .check_account(
                    &order_id,
                    &[CheckAccount {
                        msisdn,
                        customer_name: name,
                    }],
                )
                .await?;

            for r in outcome.result.iter().flatten() {
                println!("{} - {}: {}", r.msisdn, r.error_code, r.error_msg);
            }
            report_status(&outcome.status)
        }
        Commands::Disburse {
            msisdn,
            name,
            amount,
            content,
            note,
            sms,
        } => {
            let api = connect(&config)?;
            let order_id = generate_order_id();
            println!("Order id: {}", order_id);

            let item = Disbursement {
                trans_id: generate_order_id(),
                msisdn,
                customer_name: name,
                amount,
                sms_content: sms,
                note,
            };
            let outcome = api.request_disbursement(&order_id, &content, &[item]).await?;
            print_results(&outcome);
            report_status(&outcome.status)
        }
        Commands::Query { order_id, selector } => {
            let api = connect(&config)?;
            let outcome = api
                .query_requests(&order_id, selector.into_selector())
                .await?;
            print_results(&outcome);
            report_status(&outcome.status)
        }
    }
}

/// `--verbose` wins, then `RUST_LOG`, then the configured level.
fn log_directive(verbose: bool, rust_log: Option<String>, configured: &str) -> String {
    if verbose {
        return "debug".to_string();
    }
    rust_log
        .filter(|directive| !directive.trim().is_empty())
        .unwrap_or_else(|| configured.to_lowercase())
}

fn connect(config: &Config) -> anyhow::Result<PartnerApi<SoapTransport>> {
    config.validate()?;

    let keys = Arc::new(config.load_key_store()?);
    let transport = SoapTransport::new(config.endpoint.base_url.clone(), config.timeout())
        .context("Failed to create HTTP client")?;

    Ok(PartnerApi::new(keys, transport, config.processor_options())?)
}

fn print_results(outcome: &Outcome<Vec<DisbursementResult>>) {
    for r in outcome.result.iter().flatten() {
        println!("{} - {} - {}", r.trans_id, r.error_code, r.error_msg);
    }
}

/// Prints the final status line; anything but success or a successful batch fails.
fn report_status(status: &CallStatus) -> anyhow::Result<()> {
    match status {
        CallStatus::Success => Ok(()),
        CallStatus::Batch(batch) if batch.status() == BatchStatusCode::Succeeded => {
            println!("Chi thành công");
            Ok(())
        }
        CallStatus::Batch(batch) if !batch.status().is_final() => {
            println!("Batch {}: {}", batch.code, batch.desc);
            Ok(())
        }
        CallStatus::Batch(batch) => anyhow::bail!("Batch ended with {}: {}", batch.code, batch.desc),
        CallStatus::Rejected(err) => anyhow::bail!("Unable to query result. Error: {}", err),
    }
}

fn generate_keys(bits: usize, out_dir: &Path) -> anyhow::Result<()> {
    let pair = KeyStore::generate_pem(bits).context("Failed to generate key pair")?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create directory: {}", out_dir.display()))?;

    let private_path = out_dir.join("private.pem");
    let public_path = out_dir.join("public.pem");
    fs::write(&private_path, &pair.private_key)
        .with_context(|| format!("Failed to write {}", private_path.display()))?;
    fs::write(&public_path, &pair.public_key)
        .with_context(|| format!("Failed to write {}", public_path.display()))?;

    println!("Private key: {}", private_path.display());
    println!("Public key:  {}", public_path.display());
    Ok(())
}
