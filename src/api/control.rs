//! Conversation control endpoints
//!
//! A thin HTTP skin over `ControllerHandle`: commands are queued and
//! acknowledged with 202; the view is read from the latest snapshot.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};

use crate::controller::{Command, ControllerHandle, ViewState};

/// Build control router
pub fn router(handle: ControllerHandle) -> Router {
    Router::new()
        .route("/view", get(view))
        .route("/listen", post(start_listening).delete(stop_listening))
        .route("/transcript", put(edit_transcript))
        .route("/display-mode", post(toggle_display_mode))
        .with_state(handle)
}

/// Current view snapshot
async fn view(State(handle): State<ControllerHandle>) -> Json<ViewState> {
    Json(handle.view())
}

async fn start_listening(
    State(handle): State<ControllerHandle>,
) -> Result<StatusCode, ControlError> {
    submit(&handle, Command::Start)
}

async fn stop_listening(
    State(handle): State<ControllerHandle>,
) -> Result<StatusCode, ControlError> {
    submit(&handle, Command::Stop)
}

/// Transcript edit request
#[derive(Debug, Deserialize)]
pub struct TranscriptRequest {
    pub text: String,
}

async fn edit_transcript(
    State(handle): State<ControllerHandle>,
    Json(request): Json<TranscriptRequest>,
) -> Result<StatusCode, ControlError> {
    submit(&handle, Command::EditTranscript(request.text))
}

async fn toggle_display_mode(
    State(handle): State<ControllerHandle>,
) -> Result<StatusCode, ControlError> {
    submit(&handle, Command::ToggleDisplayMode)
}

fn submit(handle: &ControllerHandle, command: Command) -> Result<StatusCode, ControlError> {
    tracing::debug!(?command, "control command");
    handle
        .send(command)
        .map(|()| StatusCode::ACCEPTED)
        .map_err(|_| ControlError::ControllerGone)
}

/// Control API errors
#[derive(Debug)]
pub enum ControlError {
    ControllerGone,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::ControllerGone => (
                StatusCode::SERVICE_UNAVAILABLE,
                "controller_gone",
                "voice controller is not running".to_string(),
            ),
        };

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}
