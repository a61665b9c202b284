//! # MxRPC CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Generate a self-signed certificate pair (server.crt / server.key)
//! mxrpc gen-cert
//!
//! # Start three workers
//! PORT=5001 mxrpc worker
//! mxrpc worker -b 127.0.0.1:5002
//! mxrpc worker -b 127.0.0.1:5003 --processing-delay-ms 500
//!
//! # Start the dispatcher
//! mxrpc dispatcher -w 127.0.0.1:5001 -w 127.0.0.1:5002 -w 127.0.0.1:5003
//!
//! # Submit a job
//! mxrpc submit multiply '[[1,2],[3,4]]' '[[5,6],[7,8]]'
//!
//! # Inspect the pool
//! mxrpc status
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use mxrpc_cli::config::{worker_bind_addr, TlsArgs, PORT_ENV};
use mxrpc_common::protocol::{Matrix, MatrixRequest};
use mxrpc_common::transport::tls::{DEFAULT_CERT_PATH, DEFAULT_KEY_PATH};
use mxrpc_common::transport::TlsConnector;

#[derive(FromArgs)]
/// mxrpc: matrix jobs dispatched over a pool of TLS workers
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Worker(WorkerArgs),
    Dispatcher(DispatcherArgs),
    Submit(SubmitArgs),
    Status(StatusArgs),
    GenCert(GenCertArgs),
}

/// Starts a worker that executes `add`, `multiply` and `transpose` jobs.
///
/// ```bash
/// PORT=5001 mxrpc worker --id worker-1
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "worker")]
/// start a matrix worker
struct WorkerArgs {
    /// address to bind to; falls back to 0.0.0.0:$PORT
    #[argh(option, short = 'b')]
    bind: Option<String>,

    /// identifier reported with every result; defaults to the bound port
    #[argh(option)]
    id: Option<String>,

    /// artificial delay before each job, in milliseconds
    #[argh(option, long = "processing-delay-ms", default = "0")]
    processing_delay_ms: u64,

    /// certificate file (PEM); env MXRPC_CERT, default server.crt
    #[argh(option)]
    cert: Option<String>,

    /// private key file (PEM); env MXRPC_KEY, default server.key
    #[argh(option)]
    key: Option<String>,

    /// CA file (PEM) client certificates must chain to; env MXRPC_CA
    #[argh(option)]
    ca: Option<String>,
}

/// Starts the dispatcher in front of a static list of workers.
///
/// Jobs go to the least-busy connected worker. A worker that fails a call is
/// evicted and redialled; if every worker stays down for the all-down timeout
/// the waiting jobs fail.
///
/// ```bash
/// mxrpc dispatcher -b 0.0.0.0:5000 -w 127.0.0.1:5001 -w 127.0.0.1:5002
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "dispatcher")]
/// start the job dispatcher
struct DispatcherArgs {
    /// address clients connect to
    #[argh(option, short = 'b', default = "\"0.0.0.0:5000\".into()")]
    bind: String,

    /// worker endpoint (host:port); repeat for each worker
    #[argh(option, short = 'w', long = "worker")]
    workers: Vec<String>,

    /// pause between reconnect attempts, in milliseconds
    #[argh(option, long = "backoff-ms", default = "2000")]
    backoff_ms: u64,

    /// how long the pool may stay empty before jobs fail, in seconds
    #[argh(option, long = "all-down-timeout-secs", default = "60")]
    all_down_timeout_secs: u64,

    /// certificate file (PEM); env MXRPC_CERT, default server.crt
    #[argh(option)]
    cert: Option<String>,

    /// private key file (PEM); env MXRPC_KEY, default server.key
    #[argh(option)]
    key: Option<String>,

    /// CA file (PEM) used for both clients and workers; env MXRPC_CA
    #[argh(option)]
    ca: Option<String>,

    /// name expected in worker certificates; defaults to each worker's host
    #[argh(option, long = "server-name")]
    server_name: Option<String>,
}

/// Submits one job and prints the result rows and the worker that ran it.
///
/// Matrices are JSON arrays of rows. Logging is off so stdout stays clean.
///
/// ```bash
/// mxrpc submit add '[[1,2],[3,4]]' '[[5,6],[7,8]]'
/// mxrpc submit transpose '[[1,2,3],[4,5,6]]' --json | jq .result
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "submit")]
/// submit a matrix job to a dispatcher
struct SubmitArgs {
    /// operation: add, multiply or transpose
    #[argh(positional)]
    operation: String,

    /// first matrix as JSON
    #[argh(positional)]
    matrix_a: String,

    /// second matrix as JSON, for add and multiply
    #[argh(positional)]
    matrix_b: Option<String>,

    /// dispatcher address
    #[argh(option, short = 'd', default = "\"127.0.0.1:5000\".into()")]
    dispatcher: String,

    /// print the raw JSON response instead
    #[argh(switch)]
    json: bool,

    /// certificate file (PEM); env MXRPC_CERT, default server.crt
    #[argh(option)]
    cert: Option<String>,

    /// private key file (PEM); env MXRPC_KEY, default server.key
    #[argh(option)]
    key: Option<String>,

    /// CA file (PEM) to verify the dispatcher with; env MXRPC_CA
    #[argh(option)]
    ca: Option<String>,

    /// name expected in the dispatcher's certificate
    #[argh(option, long = "server-name")]
    server_name: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "status")]
/// print a dispatcher's worker pool as JSON
struct StatusArgs {
    /// dispatcher address
    #[argh(option, short = 'd', default = "\"127.0.0.1:5000\".into()")]
    dispatcher: String,

    /// certificate file (PEM); env MXRPC_CERT, default server.crt
    #[argh(option)]
    cert: Option<String>,

    /// private key file (PEM); env MXRPC_KEY, default server.key
    #[argh(option)]
    key: Option<String>,

    /// CA file (PEM) to verify the dispatcher with; env MXRPC_CA
    #[argh(option)]
    ca: Option<String>,

    /// name expected in the dispatcher's certificate
    #[argh(option, long = "server-name")]
    server_name: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "gen-cert")]
/// write a self-signed certificate and key
struct GenCertArgs {
    /// certificate output path
    #[argh(option, default = "DEFAULT_CERT_PATH.into()")]
    cert: String,

    /// private key output path
    #[argh(option, default = "DEFAULT_KEY_PATH.into()")]
    key: String,

    /// DNS name or IP the certificate is valid for; repeatable
    #[argh(option, short = 'n', long = "name")]
    names: Vec<String>,

    /// overwrite existing files
    #[argh(switch)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // submit/status print results to stdout; keep it clean for piping
    if !matches!(cli.command, Commands::Submit(_) | Commands::Status(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Worker(args) => run_worker(args).await,
        Commands::Dispatcher(args) => run_dispatcher(args).await,
        Commands::Submit(args) => run_submit(args).await,
        Commands::Status(args) => run_status(args).await,
        Commands::GenCert(args) => {
            let cert = PathBuf::from(&args.cert);
            let key = PathBuf::from(&args.key);
            mxrpc_cli::certgen::write_pair(&cert, &key, &args.names, args.force)?;
            tracing::info!("Wrote {} and {}", cert.display(), key.display());
            Ok(())
        }
    }
}

async fn run_worker(args: WorkerArgs) -> Result<()> {
    let bind = worker_bind_addr(args.bind, std::env::var(PORT_ENV).ok())?;
    let tls = TlsArgs {
        cert: args.cert,
        key: args.key,
        ca: args.ca,
        server_name: None,
    }
    .resolve();

    let mut config = mxrpc_worker::NodeConfig::new(bind, tls)
        .with_processing_delay(Duration::from_millis(args.processing_delay_ms));
    if let Some(id) = args.id {
        config = config.with_worker_id(id);
    }

    let server = mxrpc_worker::WorkerServer::bind(&config).await?;
    tracing::info!(
        "Worker '{}' ready (processing delay {}ms)",
        server.node().worker_id(),
        args.processing_delay_ms
    );
    server.run().await?;
    Ok(())
}

async fn run_dispatcher(args: DispatcherArgs) -> Result<()> {
    tracing::info!("Starting MxRPC dispatcher");
    tracing::info!("Binding to: {}", args.bind);
    tracing::info!("Workers: {:?}", args.workers);

    if args.workers.is_empty() {
        tracing::warn!("No workers specified! Use --worker <host:port> to add workers.");
    }

    let tls = TlsArgs {
        cert: args.cert,
        key: args.key,
        ca: args.ca,
        server_name: args.server_name,
    }
    .resolve();

    let connector = Arc::new(TlsConnector::new(tls.clone())?);
    let registry = mxrpc_dispatcher::WorkerRegistry::new(args.workers, connector);
    let config = mxrpc_dispatcher::DispatchConfig {
        backoff: Duration::from_millis(args.backoff_ms),
        all_down_timeout: Duration::from_secs(args.all_down_timeout_secs),
    };

    let dispatcher = Arc::new(mxrpc_dispatcher::Dispatcher::new(registry, config));
    dispatcher.connect_all().await;

    let server = mxrpc_dispatcher::DispatcherServer::bind(&args.bind, &tls, dispatcher).await?;
    server.run().await?;
    Ok(())
}

async fn run_submit(args: SubmitArgs) -> Result<()> {
    let job = parse_job(&args.operation, &args.matrix_a, args.matrix_b.as_deref())?;
    let tls = TlsArgs {
        cert: args.cert,
        key: args.key,
        ca: args.ca,
        server_name: args.server_name,
    }
    .resolve();

    let client = mxrpc_client::MxrpcClient::new(args.dispatcher, tls)?;
    let response = client.submit(job).await?;

    if args.json {
        println!("{}", serde_json::to_string(&response)?);
    } else {
        print!("{}", response.result);
        println!("worker: {}", response.worker);
    }
    Ok(())
}

async fn run_status(args: StatusArgs) -> Result<()> {
    let tls = TlsArgs {
        cert: args.cert,
        key: args.key,
        ca: args.ca,
        server_name: args.server_name,
    }
    .resolve();

    let client = mxrpc_client::MxrpcClient::new(args.dispatcher, tls)?;
    let status = client.status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn parse_matrix(raw: &str, which: &str) -> Result<Matrix> {
    serde_json::from_str(raw).with_context(|| format!("Invalid JSON in {}", which))
}

/// Builds a job from the `submit` positionals. Shape checks are left to the
/// worker.
fn parse_job(operation: &str, matrix_a: &str, matrix_b: Option<&str>) -> Result<MatrixRequest> {
    let matrix_a = parse_matrix(matrix_a, "matrix_a")?;
    let matrix_b = matrix_b.map(|raw| parse_matrix(raw, "matrix_b")).transpose()?;
    Ok(MatrixRequest::new(operation, matrix_a, matrix_b))
}
