//! Rich presence data model

mod builder;
mod types;

pub use builder::PresenceBuilder;
pub use types::{
    Assets, Button, Party, Presence, Secrets, Timestamps, MAX_ASSET_LEN, MAX_BUTTONS,
    MAX_BUTTON_LABEL_LEN, MAX_SECRET_LEN, MAX_TEXT_LEN,
};
