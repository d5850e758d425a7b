use crate::error::{PresenceError, Result};
use crate::presence::types::{Assets, Button, Party, Presence, Secrets, Timestamps};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch; a clock set before the epoch yields `0`
fn unix_seconds(at: SystemTime) -> i64 {
    at.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

/// Fluent construction of [`Presence`] values
///
/// [`build`](Self::build) hands back whatever was set;
/// [`try_build`](Self::try_build) also applies the limits
/// [`PresenceClient::set_presence`](crate::PresenceClient::set_presence)
/// enforces, so a bad value is caught where it is made.
///
/// A builder can also start from an existing presence, which is the usual way
/// to change one field of the presence currently shown:
///
/// ```
/// use presence_link::PresenceBuilder;
///
/// let lobby = PresenceBuilder::new().state("In lobby").party("p1", 1, 4).build();
/// let full = PresenceBuilder::from(lobby).party("p1", 4, 4).try_build()?;
/// assert_eq!(full.party.and_then(|p| p.size), Some([4, 4]));
/// # Ok::<(), presence_link::PresenceError>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct PresenceBuilder {
    presence: Presence,
}

impl From<Presence> for PresenceBuilder {
    fn from(presence: Presence) -> Self {
        Self { presence }
    }
}

impl PresenceBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, edit: impl FnOnce(&mut Presence)) -> Self {
        edit(&mut self.presence);
        self
    }

    fn with_assets(self, edit: impl FnOnce(&mut Assets)) -> Self {
        self.with(|p| edit(p.assets.get_or_insert_with(Assets::default)))
    }

    fn with_secrets(self, edit: impl FnOnce(&mut Secrets)) -> Self {
        self.with(|p| edit(p.secrets.get_or_insert_with(Secrets::default)))
    }

    fn with_timestamps(self, edit: impl FnOnce(&mut Timestamps)) -> Self {
        self.with(|p| edit(p.timestamps.get_or_insert_with(Timestamps::default)))
    }

    /// Second line of the presence, e.g. "In a group"
    pub fn state(self, state: impl Into<String>) -> Self {
        let state = state.into();
        self.with(|p| p.state = Some(state))
    }

    /// First line of the presence, e.g. "Ranked match"
    pub fn details(self, details: impl Into<String>) -> Self {
        let details = details.into();
        self.with(|p| p.details = Some(details))
    }

    pub fn start_timestamp(self, timestamp: i64) -> Self {
        self.with_timestamps(|t| t.start = Some(timestamp))
    }

    pub fn end_timestamp(self, timestamp: i64) -> Self {
        self.with_timestamps(|t| t.end = Some(timestamp))
    }

    /// Show time elapsed since now
    pub fn start_timestamp_now(self) -> Self {
        self.elapsed_since(SystemTime::now())
    }

    /// Show time elapsed since `started`
    pub fn elapsed_since(self, started: SystemTime) -> Self {
        self.start_timestamp(unix_seconds(started))
    }

    /// Show a countdown that reaches zero `remaining` from now
    pub fn ends_in(self, remaining: Duration) -> Self {
        let end = SystemTime::now()
            .checked_add(remaining)
            .map_or(i64::MAX, unix_seconds);
        self.end_timestamp(end)
    }

    /// Remove both timestamps
    pub fn clear_timestamps(self) -> Self {
        self.with(|p| p.timestamps = None)
    }

    pub fn large_image(self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.with_assets(|a| a.large_image = Some(key))
    }

    pub fn large_text(self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.with_assets(|a| a.large_text = Some(text))
    }

    pub fn small_image(self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.with_assets(|a| a.small_image = Some(key))
    }

    pub fn small_text(self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.with_assets(|a| a.small_text = Some(text))
    }

    /// Party id with `[current, max]` size; replaces any previous party
    pub fn party(self, id: impl Into<String>, current: u32, max: u32) -> Self {
        let id = id.into();
        self.with(|p| {
            p.party = Some(Party {
                id: Some(id),
                size: Some([current, max]),
            })
        })
    }

    /// Append a link button; Discord shows at most two
    pub fn button(self, label: impl Into<String>, url: impl Into<String>) -> Self {
        let button = Button {
            label: label.into(),
            url: url.into(),
        };
        self.with(|p| p.buttons.get_or_insert_with(Vec::new).push(button))
    }

    pub fn clear_buttons(self) -> Self {
        self.with(|p| p.buttons = None)
    }

    /// Secret handed back in `ACTIVITY_JOIN` when someone joins
    pub fn join_secret(self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.with_secrets(|s| s.join = Some(secret))
    }

    pub fn spectate_secret(self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.with_secrets(|s| s.spectate = Some(secret))
    }

    pub fn match_secret(self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.with_secrets(|s| s.match_secret = Some(secret))
    }

    pub fn instance(self, instance: bool) -> Self {
        self.with(|p| p.instance = Some(instance))
    }

    /// The presence as set, without validation
    pub fn build(self) -> Presence {
        self.presence
    }

    /// The presence, once it passes [`Presence::validate`]
    ///
    /// # Errors
    ///
    /// [`PresenceError::InvalidPresence`] with the first limit that was broken.
    pub fn try_build(self) -> Result<Presence> {
        self.presence
            .validate()
            .map_err(PresenceError::InvalidPresence)?;
        Ok(self.presence)
    }
}
