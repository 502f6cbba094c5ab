use genwatch_api::config::Config;
use genwatch_api::routes;
use genwatch_api::routes::api::generation::JOB_ID_HEADER;
use genwatch_api::watch::WatchEvent;
use genwatch_api::{Error, InnerAppState, Result, SharedAppState};

use axum::http::{HeaderName, HeaderValue};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::cors::{Any, CorsLayer};
use tracing::Level;
use tracing::Span;
use tracing_subscriber::{field::MakeExt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(version = "0.1.0", about = "Streams generated images as they appear")]
pub struct Opts {
    #[arg(short, long, default_value = "./config.yaml")]
    /// Path to the configuration file
    pub config: PathBuf,
    #[command(subcommand)]
    /// Subcommand to run
    pub command: Command,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Run the HTTP server
    Serve,
    /// Generate images for one prompt and print each one as it appears
    Watch {
        #[arg(short, long)]
        prompt: String,
        #[arg(short, long)]
        /// Overrides `num_images` from the configuration
        num_images: Option<usize>,
    },
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(JOB_ID_HEADER)]);

    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(e)) => {
            log::warn!("invalid cors origin, allowing any - {e}");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}

async fn shutdown_signal(state: SharedAppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for ctrl+c - {e}");
        return;
    }
    log::info!("shutting down");
    for (id, job_state) in state.jobs.stop_all().await {
        log::info!("[{id}] {}", job_state.as_ref());
    }
}

async fn serve(state: SharedAppState) -> Result<()> {
    let listen = (state.config.listen_addr, state.config.listen_port);
    let cors = cors_layer(state.config.cors_origin.as_deref());

    let app = routes::router()
        .with_state(state.clone())
        .layer(cors)
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_failure(
                    |_error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {},
                )
                .on_response(
                    |rsp: &axum::response::Response, latency: Duration, _span: &Span| {
                        tracing::info!("{} {}ms", rsp.status(), latency.as_millis());
                    },
                ),
        );

    tracing::info!("listening on {}:{}", listen.0, listen.1);
    Ok(axum::Server::bind(&listen.into())
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(state))
        .await?)
}

async fn watch(state: SharedAppState, prompt: &str) -> Result<()> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(Error::InvalidPrompt);
    }
    let (handle, mut events) = state.start_generation(prompt).await?;
    println!("Generating images for prompt: {prompt}");

    let mut interrupted = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                handle.request_stop();
            }
            event = events.recv() => match event {
                Some(WatchEvent::File(file)) => {
                    println!("Image available at: {}", file.path.display());
                }
                Some(WatchEvent::End(end)) => {
                    println!("Generation {}", end.state.as_ref());
                    return match end.error {
                        Some(e) => Err(e.into()),
                        None => Ok(()),
                    };
                }
                None => return Ok(()),
            }
        }
    }
}

async fn inner() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genwatch_api=debug,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .map_fmt_fields(|f| f.display_messages())
                .event_format(tracing_subscriber::fmt::format::Format::default()),
        )
        .init();

    let opts = Opts::parse();
    let mut config = Config::read(&opts.config)?;

    match opts.command {
        Command::Serve => serve(SharedAppState::from(Arc::new(InnerAppState::new(config)))).await,
        Command::Watch { prompt, num_images } => {
            if let Some(num_images) = num_images {
                config.num_images = num_images.max(1);
            }
            let state = SharedAppState::from(Arc::new(InnerAppState::new(config)));
            watch(state, &prompt).await
        }
    }
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime - {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(inner()) {
        eprintln!("Execution failed - {}", e);
        std::process::exit(1);
    }
}
