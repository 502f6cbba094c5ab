pub use errors::Error;
pub use genwatch_core::api_response::{ApiResponse, ApiVersion};

use crate::captions::CaptionStore;
use crate::config::Config;
use crate::diversify::DiversifyClient;
use crate::history::{HistoryEntry, HistoryLog};
use crate::id::JobId;
use crate::process::CommandLauncher;
use crate::prompt::{FilePromptSink, PromptSink};
use crate::registry::JobRegistry;
use crate::watch::{EventStream, JobHandle, Notifier};

use axum::http::StatusCode;
use axum::response::Response;
use std::ops::Deref;
use std::sync::Arc;

pub mod captions;
pub mod config;
pub mod diversify;
pub mod errors;
pub mod history;
pub mod id;
pub mod process;
pub mod prompt;
pub mod registry;
pub mod routes;
pub mod watch;

pub type Result<T> = core::result::Result<T, errors::Error>;

pub struct InnerAppState {
    pub config: Config,
    pub notifier: Notifier,
    pub jobs: JobRegistry,
    pub history: HistoryLog,
    pub captions: CaptionStore,
    pub prompt_sink: Arc<FilePromptSink>,
    pub diversifier: Option<DiversifyClient>,
}

impl InnerAppState {
    pub fn new(config: Config) -> Self {
        let diversifier = if config.diversify.enabled {
            match DiversifyClient::from_config(&config.diversify) {
                Ok(client) => Some(client),
                Err(e) => {
                    log::error!("prompt diversification disabled - {e}");
                    None
                }
            }
        } else {
            None
        };

        Self {
            notifier: Notifier::new(config.watch_settings()),
            jobs: JobRegistry::new(),
            history: HistoryLog::new(&config.history_dir, chrono::Local::now()),
            captions: CaptionStore::new(&config.selected_captions_file),
            prompt_sink: Arc::new(FilePromptSink::new(
                &config.prompt_file,
                config.generator.stop_sentinel.clone(),
            )),
            diversifier,
            config,
        }
    }

    /// Prompts handed to the generator for one user prompt. Falls back to
    /// repeating the user prompt when diversification is off or fails.
    pub async fn plan_prompts(&self, prompt: &str) -> Vec<String> {
        let num_images = self.config.num_images;
        let Some(diversifier) = &self.diversifier else {
            return crate::prompt::fan_out(prompt, num_images);
        };

        let selected = self.captions.load().unwrap_or_else(|e| {
            log::warn!("ignoring selected captions - {e}");
            Vec::new()
        });
        let result = if selected.is_empty() {
            diversifier.diversify(prompt).await
        } else {
            diversifier.iterate_selected(prompt, &selected).await
        };

        match result {
            Ok(mut prompts) if !prompts.is_empty() => {
                prompts.truncate(num_images);
                prompts
            }
            Ok(_) => {
                log::warn!("diversification returned no prompts, using the user prompt");
                crate::prompt::fan_out(prompt, num_images)
            }
            Err(e) => {
                log::warn!("diversification failed, using the user prompt - {e}");
                crate::prompt::fan_out(prompt, num_images)
            }
        }
    }

    /// Claims the output directory, hands the prompts to the generator and
    /// starts watching for its images.
    pub async fn start_generation(&self, prompt: &str) -> Result<(JobHandle, EventStream)> {
        let reservation = self.jobs.reserve(self.config.output_dir.clone())?;

        if let Err(e) = self.history.record(HistoryEntry::UserPrompt, prompt) {
            log::warn!("{e}");
        }
        let prompts = self.plan_prompts(prompt).await;
        if let Err(e) = self
            .history
            .record(HistoryEntry::DiversifiedPrompts, format!("{prompts:?}"))
        {
            log::warn!("{e}");
        }

        self.prompt_sink
            .write(&prompts)
            .map_err(|e| Error::PromptWriteFailed(self.prompt_sink.path().to_path_buf(), e))?;

        let id = JobId::new_v4();
        let launcher =
            CommandLauncher::new(self.config.generator.clone()).with_label(id.to_string());
        let sink: Arc<dyn PromptSink> = self.prompt_sink.clone();
        let (handle, events) = reservation.start(&self.notifier, id, launcher, sink);
        log::info!(
            "[{id}] generating {} image(s) into `{}`",
            prompts.len(),
            self.config.output_dir.display()
        );
        Ok((handle, events))
    }
}

#[derive(Clone)]
pub struct SharedAppState(Arc<InnerAppState>);

impl Deref for SharedAppState {
    type Target = InnerAppState;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Arc<InnerAppState>> for SharedAppState {
    fn from(value: Arc<InnerAppState>) -> Self {
        Self(value)
    }
}

pub trait ToAxumResponse: Sized {
    fn into_response(self, code: StatusCode) -> Response;

    fn ok(self) -> Response {
        self.into_response(StatusCode::OK)
    }

    fn bad_request(self) -> Response {
        self.into_response(StatusCode::BAD_REQUEST)
    }

    fn not_found(self) -> Response {
        self.into_response(StatusCode::NOT_FOUND)
    }

    fn conflict(self) -> Response {
        self.into_response(StatusCode::CONFLICT)
    }

    fn internal_server_error(self) -> Response {
        self.into_response(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl ToAxumResponse for ApiResponse {
    fn into_response(self, code: StatusCode) -> Response {
        use axum::response::IntoResponse;
        (code, axum::Json(self)).into_response()
    }
}
