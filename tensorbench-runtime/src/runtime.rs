//! Command line runtime
//!
//! Loads a JSON payload, runs a benchmark against a TensorFlow Serving REST endpoint and prints
//! the final report.
use crate::display::ProgressDisplay;
use crate::error::RuntimeError;
use crate::http::HttpGateway;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tensorbench::core::{
    BenchmarkConfig, BenchmarkReport, ModelSpec, PredictRequest, DEFAULT_CLIENTS,
    DEFAULT_CONCURRENCY, DEFAULT_MODEL_NAME, DEFAULT_RUNS,
};
use tensorbench::{BenchmarkRequest, RunEvent};
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn};

const DEFAULT_INPUT: &str = "test.json";

#[derive(Parser, Debug)]
#[command(about = "Benchmark a TensorFlow Serving predict endpoint.")]
struct TensorbenchCli {
    /// Server address, e.g. `localhost:8501` or `http://serving:8501`.
    #[arg(long)]
    host: String,

    /// Target model name.
    #[arg(long, default_value = DEFAULT_MODEL_NAME)]
    model: String,

    /// Signature to call. Uses the model's default signature if omitted.
    #[arg(long)]
    signature: Option<String>,

    /// Pin a model version.
    #[arg(long)]
    version: Option<u64>,

    /// JSON file mapping input names to nested arrays.
    #[arg(long, default_value = DEFAULT_INPUT)]
    input: PathBuf,

    /// Number of clients, each with its own connection.
    #[arg(short('c'), long, default_value_t = DEFAULT_CLIENTS)]
    clients: usize,

    /// Concurrent requests per client.
    #[arg(short('C'), long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Total number of calls.
    #[arg(short('N'), long, default_value_t = DEFAULT_RUNS)]
    runs: usize,

    /// Per-call timeout, e.g. `500ms` or `2s`.
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Serve Prometheus metrics on this address while the benchmark runs.
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// Print the report as JSON instead of text.
    #[arg(long)]
    json: bool,
}

/// Default tensorbench runtime.
///
/// # Example
///
/// ```no_run
/// use tensorbench_runtime::BenchRuntime;
///
/// #[tokio::main]
/// async fn main() {
///     if let Err(err) = BenchRuntime::new().with_args().run().await {
///         eprintln!("{err}");
///         std::process::exit(1);
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BenchRuntime {
    config: BenchmarkConfig,
    model_spec: ModelSpec,
    input: Option<PathBuf>,
    metrics_addr: Option<SocketAddr>,
    json: bool,
}

impl Default for BenchRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl BenchRuntime {
    pub fn new() -> Self {
        BenchRuntime {
            config: BenchmarkConfig::new(""),
            model_spec: ModelSpec::default(),
            input: None,
            metrics_addr: None,
            json: false,
        }
    }

    /// Use the command line arguments.
    ///
    /// ```ignore
    /// $ tensorbench --host localhost:8501 --model mnist --input mnist.json -c 4 -C 16 -N 100000
    /// ```
    pub fn with_args(self) -> Self {
        let args = TensorbenchCli::parse();
        self.apply(args)
    }

    fn apply(mut self, args: TensorbenchCli) -> Self {
        self.config.target = args.host;
        self.config.runs = args.runs;
        self.config.clients = args.clients;
        self.config.concurrency = args.concurrency;
        self.config.max_timeout = args.timeout;

        let mut model_spec = ModelSpec::new(&args.model);
        if let Some(signature) = &args.signature {
            model_spec = model_spec.signature_name(signature);
        }
        if let Some(version) = args.version {
            model_spec = model_spec.version(version);
        }
        self.model_spec = model_spec;

        self.input = Some(args.input);
        self.metrics_addr = args.metrics_addr;
        self.json = args.json;
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.config.target = host.to_string();
        self
    }

    pub fn model(mut self, model_spec: ModelSpec) -> Self {
        self.model_spec = model_spec;
        self
    }

    pub fn input(mut self, input: impl AsRef<Path>) -> Self {
        self.input = Some(input.as_ref().to_path_buf());
        self
    }

    pub fn config(mut self, config: BenchmarkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_addr = Some(addr);
        self
    }

    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Run the benchmark to completion and print its report to stdout.
    #[instrument(name = "tensorbench", skip_all, fields(host = %self.config.target))]
    pub async fn run(self) -> Result<BenchmarkReport, RuntimeError> {
        self.config.validate()?;

        let input = self.input.as_deref().ok_or(RuntimeError::NoInput)?;
        let payload = load_request(self.model_spec.clone(), input).await?;

        if let Some(addr) = self.metrics_addr {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|err| RuntimeError::Metrics(err.to_string()))?;
            info!("Serving metrics on {addr}");
        }

        if !self.json {
            println!("Benchmark settings:");
            println!("- Server: {}", self.config.target);
            println!("- Model: {}", self.model_spec.name);
            println!("- Input file: {}", input.display());
            println!("- Runs: {}", self.config.runs);
            println!("- Clients: {}", self.config.clients);
            println!("- Concurrency: {}", self.config.concurrency);
            println!();
        }

        let mut summary =
            BenchmarkRequest::from_config(self.config.clone(), payload).run(HttpGateway::new())?;

        let display = ProgressDisplay::new(self.config.runs, !self.json);
        while let Some(event) = summary.recv().await {
            match event {
                RunEvent::Progress(pct) => display.update(
                    pct,
                    summary.runs(),
                    summary.errors(),
                    summary.calculate_rps(),
                ),
                RunEvent::Done => break,
            }
        }
        display.finish();

        let outcome = summary.wait().await?;
        for failure in &outcome.connection_failures {
            warn!(
                "Client {} never connected, {} runs skipped: {}",
                failure.client_index, failure.assigned_runs, failure.error
            );
        }

        let report = outcome.report();
        if self.json {
            let text = serde_json::to_string_pretty(&report).map_err(RuntimeError::Report)?;
            println!("{text}");
        } else {
            println!("{report}");
        }

        Ok(report)
    }
}

/// Read a JSON payload file and encode it for `model_spec`.
pub async fn load_request(
    model_spec: ModelSpec,
    path: &Path,
) -> Result<PredictRequest, RuntimeError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| RuntimeError::ReadInput {
            path: path.to_path_buf(),
            source,
        })?;

    let value: Value =
        serde_json::from_slice(&bytes).map_err(|source| RuntimeError::ParseInput {
            path: path.to_path_buf(),
            source,
        })?;

    let request = PredictRequest::from_json(model_spec, &value)?;
    debug!("Loaded {} inputs from {}", request.inputs().len(), path.display());

    Ok(request)
}
