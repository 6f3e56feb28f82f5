use serde::{Deserialize, Serialize};

// -- Action ids --

pub const YES_ACTION: &str = "yes_action";
pub const NO_ACTION: &str = "no_action";
pub const END_ACTION: &str = "end_action";

// -- Slash command --

/// Form body of a `/pub` slash command. The platform sends many more
/// fields; only these are read.
#[derive(Debug, Clone, Deserialize)]
pub struct SlashCommand {
    pub channel_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub response_url: Option<String>,
}

// -- Block actions --

/// Form body of an interactive request: a single `payload` field holding JSON.
#[derive(Debug, Deserialize)]
pub struct ActionForm {
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockActionPayload {
    pub user: ActionUser,
    pub response_url: Option<String>,
    #[serde(default)]
    pub actions: Vec<ButtonAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionUser {
    pub id: String,
    pub name: Option<String>,
    pub username: Option<String>,
}

impl ActionUser {
    /// Name shown back to the user, falling back to the raw id.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ButtonAction {
    pub action_id: String,
    /// Channel id of the round the button belongs to.
    #[serde(default)]
    pub value: String,
}

// -- Replies --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    InChannel,
    Ephemeral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub response_type: ResponseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_original: Option<bool>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<serde_json::Value>,
}
