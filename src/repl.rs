use crate::model::{ParticipantInfo, RoomInfo};
use crate::panel::{PanelId, SubPanelId};
use crate::participant::{
    can_mute, resolve_color, resolve_display_name, resolve_hand_raised_at, resolve_is_room_admin,
};
use crate::pip::HeadlessPipHost;
use crate::room_view::RoomView;
use crate::tracks::{CaptureOptions, LivekitTrackFactory, PreviewTracks};
use livekit::Room;
use log::{error, info};
use prettytable::{row, Table};
use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use rustyline::Editor;
use std::sync::{mpsc as std_mpsc, Arc};
use tokio::sync::mpsc::{self, UnboundedReceiver};

type CommandError = Box<dyn std::error::Error + Send + Sync>;

const HELP: &str = "\
Commands:
  help                         this text
  status                       room, panels, PiP and preview state
  participants                 participant table
  panel <id> [sub]             open a main panel (participants, effects, chat, tools, admin, info)
  toggle <id>                  toggle a main panel
  back                         leave the current sub-panel
  close-panel                  close the main panel
  pip-panel <id>               open a panel inside the PiP window
  pip open|close|toggle|dismiss
  promote|demote|remove <identity>
  mute <identity> | mute-all
  lower-hand <identity> | lower-all-hands
  preview [stop]               acquire or release local preview tracks
  exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipAction {
    Open,
    Close,
    Toggle,
    Dismiss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Participants,
    Panel(PanelId, Option<SubPanelId>),
    TogglePanel(PanelId),
    Back,
    ClosePanel,
    PipPanel(PanelId),
    Pip(PipAction),
    Promote(String),
    Demote(String),
    Remove(String),
    Mute(String),
    MuteAll,
    LowerHand(String),
    LowerAllHands,
    Preview,
    PreviewStop,
    Exit,
}

impl Command {
    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return Ok(None);
        };
        let arg = parts.next();

        let identity = |usage: &str| {
            arg.map(str::to_string)
                .ok_or_else(|| format!("Usage: {usage} <identity>"))
        };
        let panel = |usage: &str| -> Result<PanelId, String> {
            arg.ok_or_else(|| format!("Usage: {usage} <panel>"))?
                .parse()
                .map_err(|e| format!("{e}"))
        };

        let parsed = match command {
            "help" => Command::Help,
            "status" => Command::Status,
            "participants" => Command::Participants,
            "panel" => {
                let sub_panel = match parts.next() {
                    Some(sub) => Some(sub.parse::<SubPanelId>().map_err(|e| format!("{e}"))?),
                    None => None,
                };
                Command::Panel(panel("panel")?, sub_panel)
            }
            "toggle" => Command::TogglePanel(panel("toggle")?),
            "back" => Command::Back,
            "close-panel" => Command::ClosePanel,
            "pip-panel" => Command::PipPanel(panel("pip-panel")?),
            "pip" => match arg {
                Some("open") => Command::Pip(PipAction::Open),
                Some("close") => Command::Pip(PipAction::Close),
                Some("toggle") => Command::Pip(PipAction::Toggle),
                Some("dismiss") => Command::Pip(PipAction::Dismiss),
                _ => return Err("Usage: pip open|close|toggle|dismiss".to_string()),
            },
            "promote" => Command::Promote(identity("promote")?),
            "demote" => Command::Demote(identity("demote")?),
            "remove" => Command::Remove(identity("remove")?),
            "mute" => Command::Mute(identity("mute")?),
            "mute-all" => Command::MuteAll,
            "lower-hand" => Command::LowerHand(identity("lower-hand")?),
            "lower-all-hands" => Command::LowerAllHands,
            "preview" => match arg {
                None => Command::Preview,
                Some("stop") => Command::PreviewStop,
                Some(_) => return Err("Usage: preview [stop]".to_string()),
            },
            "exit" | "quit" => Command::Exit,
            _ => return Err(format!("Unknown command: {line}")),
        };
        Ok(Some(parsed))
    }
}

pub struct ReplContext {
    pub room: Arc<Room>,
    pub view: RoomView,
    pub previews: PreviewTracks<LivekitTrackFactory>,
    pub pip_host: Arc<HeadlessPipHost>,
}

impl ReplContext {
    fn participants(&self) -> RoomInfo {
        RoomInfo::from_room(&self.room)
    }

    fn find(&self, identity: &str) -> Result<ParticipantInfo, CommandError> {
        self.participants()
            .find(identity)
            .cloned()
            .ok_or_else(|| format!("No participant with identity {identity}").into())
    }

    fn remote_participants(&self) -> Vec<ParticipantInfo> {
        self.participants().remote_participants
    }

    async fn execute(&self, command: Command) -> Result<(), CommandError> {
        let view = &self.view;
        let moderation = view.moderation();

        match command {
            Command::Help => println!("{HELP}"),
            Command::Status => self.print_status(),
            Command::Participants => self.print_participants(),
            Command::Panel(panel, sub_panel) => view.panels().open(panel, sub_panel),
            Command::TogglePanel(panel) => view.panels().toggle(panel),
            Command::Back => view.panels().go_back(),
            Command::ClosePanel => view.panels().close(),
            Command::PipPanel(panel) => view.pip_panels().open(panel, None),
            Command::Pip(PipAction::Open) => view.pip().open().await?,
            Command::Pip(PipAction::Close) => view.pip().close().await,
            Command::Pip(PipAction::Toggle) => view.pip().toggle().await?,
            Command::Pip(PipAction::Dismiss) => {
                if !self.pip_host.dismiss() {
                    println!("No PiP window to dismiss");
                }
            }
            Command::Promote(identity) => moderation.promote(&self.find(&identity)?).await?,
            Command::Demote(identity) => moderation.demote(&self.find(&identity)?).await?,
            Command::Remove(identity) => moderation.remove(&self.find(&identity)?).await?,
            Command::Mute(identity) => {
                let target = self.find(&identity)?;
                if !can_mute(&target, view.is_admin_or_owner()) {
                    return Err(format!("Not allowed to mute {identity}").into());
                }
                if !moderation.mute(&target).await? {
                    println!("{} has no microphone", resolve_display_name(&target));
                }
            }
            Command::MuteAll => {
                let muted = moderation.mute_all(&self.remote_participants()).await?;
                println!("Muted {muted} participant(s)");
            }
            Command::LowerHand(identity) => moderation.lower_hand(&self.find(&identity)?).await?,
            Command::LowerAllHands => {
                let lowered = moderation.lower_all_hands(&self.remote_participants()).await?;
                println!("Lowered {lowered} hand(s)");
            }
            Command::Preview => {
                let options = CaptureOptions::from_user_choices(&view.stores().user_choices.get());
                let mut effect = self.previews.acquire(options);
                effect.join().await;
            }
            Command::PreviewStop => self.previews.release().await,
            Command::Exit => {}
        }
        Ok(())
    }

    fn print_status(&self) {
        let view = &self.view;
        let room_name = view
            .room()
            .read(|room| room.as_ref().map(|room| room.name.clone()))
            .unwrap_or_else(|| "<not loaded>".to_string());
        let panels = view.panels().state();
        let pip_panels = view.pip_panels().state();
        let preview = self.previews.state().get();

        println!(
            "Room: {} ({}), admin: {}, listening for role changes: {}",
            room_name,
            view.room_id(),
            view.is_admin_or_owner(),
            view.is_listening_for_role_changes()
        );
        println!(
            "Main panel: {:?} / {:?}, PiP panel: {:?}",
            panels.active_panel_id(),
            panels.active_sub_panel_id(),
            pip_panels.active_panel_id()
        );
        println!(
            "PiP: {:?} (supported: {}), preview: audio {} video {}",
            view.pip().phase(),
            view.pip().is_supported(),
            preview.audio.is_some(),
            preview.video.is_some()
        );
    }

    fn print_participants(&self) {
        let room_info = self.participants();
        let mut table = Table::new();

        table.add_row(row![
            "Identity",
            "Name",
            "Color",
            "Admin",
            "Hand raised",
            "Microphone",
            "Speaking"
        ]);
        for p in std::iter::once(&room_info.local_participant).chain(&room_info.remote_participants) {
            table.add_row(row![
                if p.is_local {
                    format!("{} (you)", p.identity)
                } else {
                    p.identity.clone()
                },
                resolve_display_name(p),
                resolve_color(&p.attributes),
                resolve_is_room_admin(&p.attributes).to_string(),
                resolve_hand_raised_at(&p.attributes).unwrap_or("-"),
                p.microphone_track_sid.as_deref().unwrap_or("-"),
                format!("{} ({:.2})", p.is_speaking, p.audio_level),
            ]);
        }

        table.printstd();
    }
}

enum Input {
    Line(String),
    Eof,
    Failed(String),
}

// rustyline blocks, so it lives on its own thread and waits for an ack
// before printing the next prompt.
fn spawn_reader() -> (UnboundedReceiver<Input>, std_mpsc::Sender<()>) {
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (ack_tx, ack_rx) = std_mpsc::channel::<()>();

    std::thread::spawn(move || {
        let mut rl = match Editor::<(), FileHistory>::new() {
            Ok(rl) => rl,
            Err(e) => {
                let _ = input_tx.send(Input::Failed(e.to_string()));
                return;
            }
        };

        loop {
            let input = match rl.readline(">> ") {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    Input::Line(line)
                }
                Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => Input::Eof,
                Err(e) => Input::Failed(e.to_string()),
            };

            let last = !matches!(input, Input::Line(_));
            if input_tx.send(input).is_err() || last || ack_rx.recv().is_err() {
                break;
            }
        }
    });

    (input_rx, ack_tx)
}

pub async fn start_repl(context: ReplContext) {
    println!("Starting REPL. Type 'help' for commands.");
    let (mut inputs, ack) = spawn_reader();

    while let Some(input) = inputs.recv().await {
        let line = match input {
            Input::Line(line) => line,
            Input::Eof => {
                println!("Leaving room.");
                break;
            }
            Input::Failed(e) => {
                error!("Error reading input: {}", e);
                println!("Error reading input. Exiting REPL.");
                break;
            }
        };

        match Command::parse(&line) {
            Ok(Some(Command::Exit)) => {
                println!("Leaving room.");
                break;
            }
            Ok(Some(command)) => {
                info!("Running command {:?}", command);
                if let Err(e) = context.execute(command).await {
                    println!("Error: {}", e);
                }
            }
            Ok(None) => {}
            Err(usage) => println!("{}", usage),
        }

        if ack.send(()).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_panel_commands() {
        assert_eq!(
            Command::parse("panel tools transcript"),
            Ok(Some(Command::Panel(PanelId::Tools, Some(SubPanelId::Transcript))))
        );
        assert_eq!(
            Command::parse("  panel chat "),
            Ok(Some(Command::Panel(PanelId::Chat, None)))
        );
        assert_eq!(
            Command::parse("pip-panel participants"),
            Ok(Some(Command::PipPanel(PanelId::Participants)))
        );
        assert!(Command::parse("panel lobby").is_err());
        assert!(Command::parse("panel").is_err());
    }

    #[test]
    fn parses_moderation_commands() {
        assert_eq!(
            Command::parse("mute ada"),
            Ok(Some(Command::Mute("ada".into())))
        );
        assert_eq!(Command::parse("lower-all-hands"), Ok(Some(Command::LowerAllHands)));
        assert_eq!(
            Command::parse("promote"),
            Err("Usage: promote <identity>".to_string())
        );
    }

    #[test]
    fn parses_pip_and_preview() {
        assert_eq!(Command::parse("pip dismiss"), Ok(Some(Command::Pip(PipAction::Dismiss))));
        assert!(Command::parse("pip maximize").is_err());
        assert_eq!(Command::parse("preview stop"), Ok(Some(Command::PreviewStop)));
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert_eq!(Command::parse("   "), Ok(None));
        assert_eq!(
            Command::parse("dance now"),
            Err("Unknown command: dance now".to_string())
        );
    }
}
