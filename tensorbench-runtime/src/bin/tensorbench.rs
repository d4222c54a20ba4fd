use tensorbench_runtime::BenchRuntime;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_FILTER: &str = "tensorbench=info,tensorbench_runtime=info";

#[tokio::main]
async fn main() {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = BenchRuntime::new().with_args().run().await {
        error!("{err}");
        std::process::exit(1);
    }
}
