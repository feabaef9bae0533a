//! Action orchestration: preconditions, prompt, completion, render, store

use crate::prompt;
use crate::provider::{Completion, CompletionClient, CompletionFailure};
use crate::render::{escape_html, extract_diagram, markdown_to_html, render_diagram};
use crate::session::{Session, SessionError};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Text shown in the diagram region when nothing could be drawn
pub const DIAGRAM_FAILED_TEXT: &str = "Failed to generate ERD diagram.";

/// User-triggered actions that call the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Overview,
    Diagram,
    Convert,
    Verify,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Overview, Action::Diagram, Action::Convert, Action::Verify];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Overview => "overview",
            Action::Diagram => "diagram",
            Action::Convert => "convert",
            Action::Verify => "verify",
        }
    }

    /// Loading text shown while the request is in flight
    pub fn placeholder(&self) -> &'static str {
        match self {
            Action::Overview => "Generating overview...",
            Action::Diagram => "Generating ERD diagram...",
            Action::Convert => "Converting to PostgreSQL...",
            Action::Verify => "Verifying the converted code...",
        }
    }

    fn missing_script_message(&self) -> &'static str {
        match self {
            Action::Diagram => "No SQL Server code to analyze for ERD generation.",
            Action::Convert => "No SQL Server code to convert.",
            _ => "No SQL Server code to summarize.",
        }
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "overview" => Ok(Action::Overview),
            "diagram" | "erd" => Ok(Action::Diagram),
            "convert" => Ok(Action::Convert),
            "verify" => Ok(Action::Verify),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced to the user as a blocking alert
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Please upload a valid .sql file.")]
    InvalidFile(String),

    #[error("The file is not valid UTF-8 text.")]
    InvalidEncoding,

    #[error("Failed to load sample data. Please try again later.")]
    SampleUnavailable(#[source] std::io::Error),

    #[error("{}", .0.missing_script_message())]
    MissingScript(Action),

    #[error("No converted PostgreSQL code to verify.")]
    MissingConversion,

    #[error("A newer {0} request replaced this one")]
    Superseded(Action),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Uploaded script prepared for the accordion
#[derive(Debug, Clone, Serialize)]
pub struct ScriptView {
    pub file_name: String,
    pub script_html: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Rendered,
    Failed,
}

/// What the page puts into an action's display region
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub action: Action,
    pub status: OutcomeStatus,
    pub html: String,
    /// Plain text behind `html`: the reply, the diagram body, or the failure message
    #[serde(skip)]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Failure reason tag when `status` is failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ActionOutcome {
    fn rendered(action: Action, html: String, text: &str, warning: Option<&str>) -> Self {
        Self {
            action,
            status: OutcomeStatus::Rendered,
            html,
            text: text.to_string(),
            warning: warning.map(str::to_string),
            failure: None,
        }
    }

    fn failed(action: Action, text: &str, reason: &str) -> Self {
        Self {
            action,
            status: OutcomeStatus::Failed,
            html: format!("<p>{}</p>", escape_html(text)),
            text: text.to_string(),
            warning: None,
            failure: Some(reason.to_string()),
        }
    }
}

fn failure_tag(failure: &CompletionFailure) -> &'static str {
    match failure {
        CompletionFailure::EmptyResponse => "empty_response",
        CompletionFailure::Transport(_) => "transport",
        CompletionFailure::Status { .. } => "status",
        CompletionFailure::Malformed(_) => "malformed",
    }
}

/// The assistant: owns the completion client and runs actions against a session
pub struct Assistant {
    client: CompletionClient,
    sample_path: PathBuf,
}

impl Assistant {
    pub fn new(client: CompletionClient, sample_path: impl Into<PathBuf>) -> Self {
        Self {
            client,
            sample_path: sample_path.into(),
        }
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Store an uploaded file. Only names ending in `.sql` with UTF-8 content are accepted.
    pub fn load_script(
        &self,
        session: &Session,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<ScriptView, ControllerError> {
        if !file_name.ends_with(".sql") {
            warn!(file_name, "Rejected upload with wrong extension");
            return Err(ControllerError::InvalidFile(file_name.to_string()));
        }
        let text = std::str::from_utf8(bytes).map_err(|_| ControllerError::InvalidEncoding)?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        session.state().set_script(text);
        info!(file_name, bytes = bytes.len(), "Loaded script");

        Ok(ScriptView {
            file_name: file_name.to_string(),
            script_html: escape_html(text),
        })
    }

    /// Store the bundled sample script
    pub async fn load_sample(&self, session: &Session) -> Result<ScriptView, ControllerError> {
        let bytes = tokio::fs::read(&self.sample_path).await.map_err(|e| {
            warn!(path = %self.sample_path.display(), error = %e, "Sample script unavailable");
            ControllerError::SampleUnavailable(e)
        })?;
        let file_name = self
            .sample_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sample.sql".to_string());
        self.load_script(session, &file_name, &bytes)
    }

    /// Build the prompt for `action` from the session, checking its precondition
    fn prepare(&self, session: &Session, action: Action) -> Result<(String, String), ControllerError> {
        let state = session.state();
        let script = state
            .script()
            .ok_or(ControllerError::MissingScript(action))?
            .to_string();
        let prompt = match action {
            Action::Overview => prompt::build_overview_prompt(&script),
            Action::Diagram => prompt::build_erd_prompt(&script),
            Action::Convert => prompt::build_convert_prompt(&script),
            Action::Verify => {
                let converted = state.converted().ok_or(ControllerError::MissingConversion)?;
                prompt::build_verify_prompt(&script, converted)
            }
        };
        Ok((script, prompt))
    }

    /// Run one action. A newer run of the same action in the same session cancels this one.
    pub async fn run(&self, session: &Session, action: Action) -> Result<ActionOutcome, ControllerError> {
        if action == Action::Verify && session.state().converted().is_none() {
            return Err(ControllerError::MissingConversion);
        }
        let (script, prompt) = self.prepare(session, action)?;

        let ticket = session.begin(action);
        info!(%action, prompt_len = prompt.len(), "Starting action");

        let completion = tokio::select! {
            _ = ticket.token().cancelled() => None,
            completion = self.client.complete(&prompt) => Some(completion),
        };
        session.finish(&ticket);

        let Some(completion) = completion else {
            debug!(%action, "Action superseded while waiting for completion");
            return Err(ControllerError::Superseded(action));
        };

        let mut state = session.state();
        if ticket.token().is_cancelled() || state.script() != Some(script.as_str()) {
            debug!(%action, "Discarding stale completion");
            return Err(ControllerError::Superseded(action));
        }

        let outcome = match completion {
            Completion::Failed(ref failure) => {
                ActionOutcome::failed(action, completion.display_text(), failure_tag(failure))
            }
            Completion::Text(text) => match action {
                Action::Overview => {
                    state.set_overview(text.as_str());
                    ActionOutcome::rendered(action, markdown_to_html(&text), &text, None)
                }
                Action::Convert => {
                    state.set_converted(text.as_str());
                    ActionOutcome::rendered(action, markdown_to_html(&text), &text, None)
                }
                Action::Verify => {
                    ActionOutcome::rendered(action, markdown_to_html(&text), &text, None)
                }
                Action::Diagram => match extract_diagram(&text) {
                    Some(source) => {
                        if let Some(warning) = source.warning {
                            warn!(%action, warning, "Diagram reply needed fallback handling");
                        }
                        ActionOutcome::rendered(
                            action,
                            render_diagram(&source.body),
                            &source.body,
                            source.warning,
                        )
                    }
                    None => ActionOutcome::failed(action, DIAGRAM_FAILED_TEXT, "empty_diagram"),
                },
            },
        };

        info!(%action, status = ?outcome.status, "Finished action");
        Ok(outcome)
    }
}
