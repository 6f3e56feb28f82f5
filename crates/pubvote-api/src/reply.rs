use serde_json::json;

use pubvote_types::api::{END_ACTION, NO_ACTION, Reply, ResponseType, YES_ACTION};
use pubvote_types::outcome::Outcome;

const FAILURE_TEXT: &str = "Something went wrong, try again";

/// Turn an outcome into the message the platform posts back.
pub fn render(outcome: &Outcome) -> Reply {
    let text = outcome.text();

    match outcome {
        Outcome::Started { channel_id } => Reply {
            response_type: ResponseType::InChannel,
            replace_original: None,
            blocks: poll_blocks(&text, channel_id),
            text,
        },
        _ if outcome.ends_round() => Reply {
            response_type: ResponseType::InChannel,
            replace_original: Some(true),
            text,
            blocks: vec![],
        },
        _ => Reply {
            response_type: ResponseType::Ephemeral,
            replace_original: Some(false),
            text,
            blocks: vec![],
        },
    }
}

/// Generic reply when the store could not be reached.
pub fn failure() -> Reply {
    Reply {
        response_type: ResponseType::Ephemeral,
        replace_original: Some(false),
        text: FAILURE_TEXT.to_string(),
        blocks: vec![],
    }
}

fn poll_blocks(text: &str, channel_id: &str) -> Vec<serde_json::Value> {
    vec![
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": text },
        }),
        json!({
            "type": "actions",
            "elements": [
                button(YES_ACTION, "Yes", channel_id),
                button(NO_ACTION, "No", channel_id),
                button(END_ACTION, "End Round", channel_id),
            ],
        }),
    ]
}

fn button(action_id: &str, label: &str, channel_id: &str) -> serde_json::Value {
    json!({
        "type": "button",
        "action_id": action_id,
        "text": { "type": "plain_text", "emoji": true, "text": label },
        "value": channel_id,
    })
}
