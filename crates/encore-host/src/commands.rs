//! Line-oriented console that stands in for the player UI.
//!
//! Each line is one [`Command`]. Playback and selection drive the headless
//! collaborators while settings commands write the store; the orchestrator
//! sees both through its usual notifications.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use encore_extension::{Entry, EntryId, ExtensionSummary, Headless, Player};
use encore_settings::SettingsStore;
use tokio::sync::{mpsc, oneshot};

use crate::error::CommandError;
use crate::orchestrator::HostEvent;
use crate::session::LastfmConnector;

pub const HELP: &str = "\
commands:
  play <id> <artist> - <title> [@ <path>]   load and play an entry
  pause | resume | stop                     control playback
  select <id> [<id> ...]                    select previously played entries
  auth [<token>]                            print the auth URL, or exchange a token
  connect | disconnect                      toggle the Last.fm connection
  enable <name> | disable <name>            toggle an extension
  loved on|off                              auto-rate loved tracks
  fingerprint on|off                        toggle the fingerprinter
  action <name>                             activate a UI action
  status                                    show the current state
  help                                      show this text
  quit                                      exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play {
        id: String,
        artist: String,
        title: String,
        location: Option<PathBuf>,
    },
    Pause,
    Resume,
    Stop,
    Select(Vec<String>),
    Auth(Option<String>),
    Connect,
    Disconnect,
    Enable(String),
    Disable(String),
    Loved(bool),
    Fingerprint(bool),
    Action(String),
    Status,
    Help,
    Quit,
}

/// Parse one console line. Blank lines and `#` comments yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let command = match word.to_ascii_lowercase().as_str() {
        "play" => parse_play(rest)?,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "stop" => Command::Stop,
        "select" => {
            if rest.is_empty() {
                return Err(CommandError::Usage("select <id> [<id> ...]"));
            }
            Command::Select(rest.split_whitespace().map(str::to_string).collect())
        }
        "auth" => Command::Auth((!rest.is_empty()).then(|| rest.to_string())),
        "connect" => Command::Connect,
        "disconnect" => Command::Disconnect,
        "enable" => Command::Enable(single(rest, "enable <name>")?),
        "disable" => Command::Disable(single(rest, "disable <name>")?),
        "loved" => Command::Loved(switch(rest, "loved on|off")?),
        "fingerprint" => Command::Fingerprint(switch(rest, "fingerprint on|off")?),
        "action" => Command::Action(single(rest, "action <name>")?),
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_play(rest: &str) -> Result<Command, CommandError> {
    const USAGE: &str = "play <id> <artist> - <title> [@ <path>]";

    let (id, track) = rest
        .split_once(char::is_whitespace)
        .ok_or(CommandError::Usage(USAGE))?;
    let (track, location) = match track.rsplit_once(" @ ") {
        Some((track, path)) if !path.trim().is_empty() => {
            (track, Some(PathBuf::from(path.trim())))
        }
        _ => (track, None),
    };
    let (artist, title) = track.split_once(" - ").ok_or(CommandError::Usage(USAGE))?;

    Ok(Command::Play {
        id: id.to_string(),
        artist: artist.trim().to_string(),
        title: title.trim().to_string(),
        location,
    })
}

fn single(rest: &str, usage: &'static str) -> Result<String, CommandError> {
    let mut words = rest.split_whitespace();
    match (words.next(), words.next()) {
        (Some(word), None) => Ok(word.to_string()),
        _ => Err(CommandError::Usage(usage)),
    }
}

fn switch(rest: &str, usage: &'static str) -> Result<bool, CommandError> {
    match rest.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        _ => Err(CommandError::Usage(usage)),
    }
}

// ─── Execution ──────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue(Option<String>),
    Quit,
}

pub struct Console {
    settings: Arc<SettingsStore>,
    headless: Headless,
    connector: Arc<LastfmConnector>,
    events: mpsc::UnboundedSender<HostEvent>,
    /// Every entry played so far, so `select` can refer to them by id.
    library: HashMap<EntryId, Entry>,
}

impl Console {
    pub fn new(
        settings: Arc<SettingsStore>,
        headless: Headless,
        connector: Arc<LastfmConnector>,
        events: mpsc::UnboundedSender<HostEvent>,
    ) -> Self {
        Self {
            settings,
            headless,
            connector,
            events,
            library: HashMap::new(),
        }
    }

    pub async fn execute(&mut self, command: Command) -> Result<Outcome, CommandError> {
        let reply = match command {
            Command::Play {
                id,
                artist,
                title,
                location,
            } => {
                let mut entry = Entry::new(id, artist, title);
                if let Some(location) = location {
                    entry = entry.with_location(location);
                }
                let reply = format!("playing {} - {}", entry.artist, entry.title);
                self.library.insert(entry.id.clone(), entry.clone());
                self.headless.player.play(entry);
                Some(reply)
            }
            Command::Pause => {
                self.headless.player.pause();
                None
            }
            Command::Resume => {
                self.headless.player.resume();
                None
            }
            Command::Stop => {
                self.headless.player.stop();
                None
            }
            Command::Select(ids) => {
                let mut selected = Vec::with_capacity(ids.len());
                let mut unknown = Vec::new();
                for id in ids {
                    match self.library.get(&EntryId::from(id.as_str())) {
                        Some(entry) => selected.push(entry.clone()),
                        None => unknown.push(id),
                    }
                }
                let mut reply = format!("{} selected", selected.len());
                if !unknown.is_empty() {
                    let _ = write!(reply, "; unknown: {}", unknown.join(", "));
                }
                self.headless.ui.set_selection(selected);
                Some(reply)
            }
            Command::Auth(None) => Some(format!(
                "authorize at {} then run `auth <token>`",
                self.connector.auth_url(None)?
            )),
            Command::Auth(Some(token)) => {
                let session = self.connector.authenticate(&token).await?;
                let reply = format!("authenticated as {}", session.username);
                self.settings.set_session(Some(session))?;
                self.settings.set_connected(true)?;
                Some(reply)
            }
            Command::Connect => {
                self.settings.set_connected(true)?;
                None
            }
            Command::Disconnect => {
                self.settings.set_connected(false)?;
                None
            }
            Command::Enable(name) => {
                self.settings.update_extension(&name, |e| e.enabled = true)?;
                None
            }
            Command::Disable(name) => {
                self.settings.update_extension(&name, |e| e.enabled = false)?;
                None
            }
            Command::Loved(on) => {
                self.settings.set_loved(on)?;
                None
            }
            Command::Fingerprint(on) => {
                self.settings.set_fingerprinter(on)?;
                None
            }
            Command::Action(name) => {
                self.events
                    .send(HostEvent::ActionActivated(name))
                    .map_err(|_| CommandError::HostGone)?;
                None
            }
            Command::Status => Some(self.status().await),
            Command::Help => Some(HELP.to_string()),
            Command::Quit => return Ok(Outcome::Quit),
        };
        Ok(Outcome::Continue(reply))
    }

    /// Ask the owner loop what it has loaded. `None` once it is gone.
    async fn loaded_extensions(&self) -> Option<Vec<ExtensionSummary>> {
        let (tx, rx) = oneshot::channel();
        self.events.send(HostEvent::Describe(tx)).ok()?;
        rx.await.ok()
    }

    async fn status(&self) -> String {
        let settings = self.settings.snapshot();
        let mut out = String::new();

        let user = settings
            .session
            .as_ref()
            .map_or("no session", |s| s.username.as_str());
        let _ = writeln!(out, "connected: {} ({user})", settings.connected);
        let _ = writeln!(out, "loved: {}", settings.loved);
        let _ = writeln!(out, "fingerprinter: {}", settings.fingerprinter);
        for (name, ext) in &settings.extensions {
            let _ = writeln!(out, "extension {name}: {}", if ext.enabled { "on" } else { "off" });
        }
        for summary in self.loaded_extensions().await.unwrap_or_default() {
            let state = if summary.active { "active" } else { "inactive" };
            let _ = writeln!(out, "loaded {} ({state}): {}", summary.name, summary.description);
        }
        match self.headless.player.playing_entry() {
            Some(entry) => {
                let state = if self.headless.player.is_playing() { "playing" } else { "paused" };
                let _ = writeln!(out, "{state}: {} - {}", entry.artist, entry.title);
            }
            None => {
                let _ = writeln!(out, "stopped");
            }
        }
        let _ = write!(out, "actions: {}", self.headless.ui.action_names().join(", "));
        out
    }
}
