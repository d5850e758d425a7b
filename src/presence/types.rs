use serde::{Deserialize, Serialize};

/// Longest `state` / `details` text Discord accepts
pub const MAX_TEXT_LEN: usize = 128;
/// Longest asset key or hover text
pub const MAX_ASSET_LEN: usize = 256;
/// Longest join / spectate / match secret
pub const MAX_SECRET_LEN: usize = 128;
/// Longest button label
pub const MAX_BUTTON_LABEL_LEN: usize = 32;
/// Buttons per presence
pub const MAX_BUTTONS: usize = 2;

/// Rich Presence data shown by the Discord client
///
/// The client treats this as an opaque value: it is validated for size and
/// format, then copied verbatim into `SET_ACTIVITY`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Timestamps>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<Assets>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<Party>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Secrets>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<Button>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<bool>,
}

/// Elapsed / remaining time, in Unix seconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

/// Image keys and their hover texts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// `[current, max]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<[u32; 2]>,
}

/// Secrets Discord hands back in `ACTIVITY_JOIN` / `ACTIVITY_SPECTATE`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secrets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectate: Option<String>,

    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub url: String,
}

fn check_len(field: &str, value: Option<&String>, max: usize) -> Result<(), String> {
    match value {
        Some(text) if text.chars().count() > max => Err(format!(
            "{} is {} characters long (maximum {})",
            field,
            text.chars().count(),
            max
        )),
        _ => Ok(()),
    }
}

impl Presence {
    /// Check the size and format limits Discord enforces
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        check_len("state", self.state.as_ref(), MAX_TEXT_LEN)?;
        check_len("details", self.details.as_ref(), MAX_TEXT_LEN)?;

        if let Some(assets) = &self.assets {
            check_len("large_image", assets.large_image.as_ref(), MAX_ASSET_LEN)?;
            check_len("large_text", assets.large_text.as_ref(), MAX_ASSET_LEN)?;
            check_len("small_image", assets.small_image.as_ref(), MAX_ASSET_LEN)?;
            check_len("small_text", assets.small_text.as_ref(), MAX_ASSET_LEN)?;
        }

        if let Some(Timestamps {
            start: Some(start),
            end: Some(end),
        }) = &self.timestamps
        {
            if end < start {
                return Err(format!("end timestamp {} is before start {}", end, start));
            }
        }

        if let Some(Party {
            size: Some([current, max]),
            ..
        }) = &self.party
        {
            if *max == 0 || current > max {
                return Err(format!("invalid party size {}/{}", current, max));
            }
        }

        if let Some(secrets) = &self.secrets {
            check_len("join secret", secrets.join.as_ref(), MAX_SECRET_LEN)?;
            check_len("spectate secret", secrets.spectate.as_ref(), MAX_SECRET_LEN)?;
            check_len("match secret", secrets.match_secret.as_ref(), MAX_SECRET_LEN)?;
        }

        if let Some(buttons) = &self.buttons {
            if buttons.len() > MAX_BUTTONS {
                return Err(format!(
                    "{} buttons given (maximum {})",
                    buttons.len(),
                    MAX_BUTTONS
                ));
            }
            for button in buttons {
                if button.label.is_empty() {
                    return Err("button label is empty".to_string());
                }
                check_len("button label", Some(&button.label), MAX_BUTTON_LABEL_LEN)?;
                if !(button.url.starts_with("https://") || button.url.starts_with("http://")) {
                    return Err(format!("button url {:?} is not http(s)", button.url));
                }
            }
        }

        Ok(())
    }
}
