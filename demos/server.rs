use argh::FromArgs;
use scanroute::{ExtractionEngine, GeminiConfig, GeminiModel, RetryPolicy, server};
use std::{sync::Arc, time::Duration};

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_ATTEMPTS: u32 = scanroute::DEFAULT_MAX_ATTEMPTS;
const DEFAULT_BASE_DELAY_MS: u64 = scanroute::DEFAULT_BASE_DELAY.as_millis() as u64;

#[derive(FromArgs)]
/// Scanroute extracts postal addresses from photos.
struct ServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// the Gemini model to call (overrides GEMINI_MODEL)
    #[argh(option, short = 'm')]
    model: Option<String>,

    /// how many times to call the model before giving up
    #[argh(option, default = "DEFAULT_MAX_ATTEMPTS")]
    max_attempts: u32,

    /// delay before the first retry, doubled on every further retry
    #[argh(option, default = "DEFAULT_BASE_DELAY_MS")]
    base_delay_ms: u64,

    /// optional timeout for a single model call, in seconds
    #[argh(option)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ServerArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let mut config = GeminiConfig::from_env()?;
    if let Some(model) = args.model {
        config = config.with_model(model);
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    let model_name = config.model.clone();

    let policy = RetryPolicy::new(args.max_attempts, Duration::from_millis(args.base_delay_ms));
    let engine = Arc::new(ExtractionEngine::with_policy(GeminiModel::new(config)?, policy));

    let app = server::router(engine);

    log::info!("Starting the server with model {}", model_name);
    log::info!(
        "Retrying up to {} times, first backoff {:?}",
        policy.max_attempts(),
        policy.base_delay()
    );
    log::info!("Listening on: {}", addr);
    log::info!("Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
