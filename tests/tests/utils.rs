use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

/// Install logging once per test binary and start a fresh mock service on a local port.
#[allow(unused)]
pub async fn init() -> SocketAddr {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter("tensorbench=debug,tensorbench_runtime=debug,mock_service=debug")
            .try_init();
    });

    mock_service::spawn()
        .await
        .expect("Failed to start mock service")
}
