use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
};
use tracing::{debug, error, warn};

use pubvote_types::api::{
    ActionForm, BlockActionPayload, END_ACTION, NO_ACTION, Reply, SlashCommand, YES_ACTION,
};
use pubvote_types::outcome::Outcome;

use crate::coordinator::RoundError;
use crate::reply;
use crate::state::AppState;

/// `/pub` slash command: open a round in the calling channel.
pub async fn command(
    State(state): State<AppState>,
    Form(cmd): Form<SlashCommand>,
) -> Json<Reply> {
    debug!("{} from {} in {}", cmd.command, cmd.user_id, cmd.channel_id);

    let result = state.coordinator.start(&cmd.channel_id, &cmd.user_id).await;
    Json(into_reply(result))
}

/// Button clicks on the poll message.
pub async fn action(
    State(state): State<AppState>,
    Form(form): Form<ActionForm>,
) -> Result<Json<Reply>, StatusCode> {
    let payload: BlockActionPayload = serde_json::from_str(&form.payload).map_err(|e| {
        warn!("Malformed action payload: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let action = payload.actions.first().ok_or(StatusCode::BAD_REQUEST)?;
    let channel_id = action.value.as_str();
    if channel_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user = &payload.user;
    let coordinator = &state.coordinator;
    let result = match action.action_id.as_str() {
        YES_ACTION => coordinator.vote(channel_id, &user.id, user.display_name()).await,
        NO_ACTION => coordinator.unvote(channel_id, &user.id).await,
        END_ACTION => coordinator.end(channel_id, &user.id).await,
        other => {
            warn!("Unknown action '{}' from {}", other, user.id);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let reply = into_reply(result);

    // The platform ignores the body of an interactive request and only shows
    // what is posted to `response_url`. The body still carries the reply for
    // callers that send no URL.
    if let Some(url) = payload.response_url.clone() {
        tokio::spawn(deliver(state.http.clone(), url, reply.clone()));
    }

    Ok(Json(reply))
}

fn into_reply(result: Result<Outcome, RoundError>) -> Reply {
    match result {
        Ok(outcome) => reply::render(&outcome),
        Err(e) => {
            error!("Round operation failed: {}", e);
            reply::failure()
        }
    }
}

/// Post the reply to the platform's response URL.
async fn deliver(http: reqwest::Client, url: String, reply: Reply) {
    let sent = http
        .post(&url)
        .json(&reply)
        .send()
        .await
        .and_then(|res| res.error_for_status());

    match sent {
        Ok(_) => debug!("Reply delivered to response_url"),
        Err(e) => warn!("Failed to deliver reply: {}", e),
    }
}
