//! Command-line arguments and the interactive REPL

use crate::engine::EngineHandle;
use crate::learn::LearnState;
use crate::mapping::{Action, ChannelTarget, ControlNumber, EventShape, MappingKey, MAX_SOURCE_CHANNEL};
use crate::persistence::MixerSnapshot;
use crate::target::{LogicalId, TargetKind};
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing::debug;

/// Surface Mixer - drive per-application volume from a MIDI control surface
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (defaults to the run mode's location)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// List available MIDI ports and exit
    #[arg(long)]
    pub list_ports: bool,

    /// Run without a control surface
    #[arg(long)]
    pub no_surface: bool,

    /// Start the interactive command prompt
    #[arg(long)]
    pub repl: bool,
}

/// One parsed REPL line
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    Learn { action: Action, target: ChannelTarget },
    Cancel,
    Status,
    Targets,
    Channels,
    Mappings,
    Assign { id: LogicalId, channel: usize },
    Unassign { id: LogicalId },
    Manual { process: String, display_name: Option<String> },
    Special(TargetKind),
    Remove { id: LogicalId },
    Unmap(MappingKey),
    Clear,
    Export(PathBuf),
    Import(PathBuf),
    Quit,
}

const HELP: &str = "\
  learn <action> [channel]      arm learn (actions: volume mute solo record select play pause next previous)
  cancel                        disarm learn
  status                        show the learn state
  targets | channels | mappings list state
  assign <target> <channel>     put a target on a channel
  unassign <target>             take a target off its channel
  manual <process> [name]       add a target for a process that is not running
  special <focused|unmapped>    add a special target
  remove <target>               forget a target
  unmap <source> <control> <shape>  delete a mapping (control: number or pb)
  clear                         delete every mapping
  export <path> | import <path> write or restore a JSON snapshot
  quit";

/// Parse one REPL line; empty lines are an error the caller skips
pub fn parse_command(line: &str) -> Result<ReplCommand> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        bail!("empty command");
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("help" | "?", []) => ReplCommand::Help,
        ("learn", [action]) => {
            let action = parse_action(action)?;
            if !action.is_transport() {
                bail!("{} needs a channel: learn {} <channel>", action, action);
            }
            ReplCommand::Learn {
                action,
                target: ChannelTarget::Global,
            }
        }
        ("learn", [action, channel]) => ReplCommand::Learn {
            action: parse_action(action)?,
            target: ChannelTarget::Channel(parse_index(channel, "channel")?),
        },
        ("cancel", []) => ReplCommand::Cancel,
        ("status", []) => ReplCommand::Status,
        ("targets", []) => ReplCommand::Targets,
        ("channels", []) => ReplCommand::Channels,
        ("mappings", []) => ReplCommand::Mappings,
        ("assign", [id, channel]) => ReplCommand::Assign {
            id: parse_id(id)?,
            channel: parse_index(channel, "channel")?,
        },
        ("unassign", [id]) => ReplCommand::Unassign { id: parse_id(id)? },
        ("manual", [process, name @ ..]) => ReplCommand::Manual {
            process: process.to_string(),
            display_name: (!name.is_empty()).then(|| name.join(" ")),
        },
        ("special", [kind]) => ReplCommand::Special(match kind.to_ascii_lowercase().as_str() {
            "focused" => TargetKind::SpecialFocusedApp,
            "unmapped" => TargetKind::SpecialUnmapped,
            other => bail!("unknown special target '{}' (focused, unmapped)", other),
        }),
        ("remove", [id]) => ReplCommand::Remove { id: parse_id(id)? },
        ("unmap", [source, control, shape]) => {
            let source = parse_index(source, "source channel")?;
            if source > MAX_SOURCE_CHANNEL as usize {
                bail!("source channel must be 0-{}", MAX_SOURCE_CHANNEL);
            }
            let shape = EventShape::parse(shape).ok_or_else(|| anyhow!("unknown shape '{}'", shape))?;
            ReplCommand::Unmap(MappingKey::new(source as u8, parse_control(control)?, shape))
        }
        ("clear", []) => ReplCommand::Clear,
        ("export", [path]) => ReplCommand::Export(PathBuf::from(path)),
        ("import", [path]) => ReplCommand::Import(PathBuf::from(path)),
        ("quit" | "exit", []) => ReplCommand::Quit,
        (verb, _) => bail!("unknown or malformed command '{}' (try help)", verb),
    };
    Ok(command)
}

fn parse_action(s: &str) -> Result<Action> {
    Action::parse(s).ok_or_else(|| anyhow!("unknown action '{}'", s))
}

fn parse_index(s: &str, what: &str) -> Result<usize> {
    s.parse().with_context(|| format!("invalid {} '{}'", what, s))
}

fn parse_id(s: &str) -> Result<LogicalId> {
    let raw = s.trim_start_matches('#');
    Ok(LogicalId(raw.parse().with_context(|| format!("invalid target id '{}'", s))?))
}

fn parse_control(s: &str) -> Result<ControlNumber> {
    if s.eq_ignore_ascii_case("pb") {
        return Ok(ControlNumber::PitchBend);
    }
    let number: u8 = s.parse().with_context(|| format!("invalid control '{}'", s))?;
    if number > 127 {
        bail!("control number must be 0-127 or pb");
    }
    Ok(ControlNumber::Number(number))
}

/// Run the prompt until quit or end of input.
///
/// rustyline blocks, so this must run on a blocking thread; engine calls are
/// driven through the runtime handle.
pub fn run_repl(engine: EngineHandle, runtime: tokio::runtime::Handle) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("{}", "Surface Mixer - type 'help' for commands".bold().cyan());

    loop {
        let line = match rl.readline("mixer> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line.as_str());

        match parse_command(&line) {
            Ok(ReplCommand::Quit) => break,
            Ok(command) => {
                debug!(?command, "REPL command");
                if let Err(e) = runtime.block_on(execute(&engine, command)) {
                    println!("{} {:#}", "error:".red(), e);
                }
            }
            Err(e) => println!("{} {:#}", "error:".red(), e),
        }
    }

    Ok(())
}

async fn execute(engine: &EngineHandle, command: ReplCommand) -> Result<()> {
    match command {
        ReplCommand::Help => println!("{}", HELP),
        ReplCommand::Learn { action, target } => {
            engine.request_learn(action, target).await?;
            println!("Learning {} for {} - move or press a control", action, target);
        }
        ReplCommand::Cancel => match engine.cancel_learn().await? {
            Some(session) => println!("Cancelled learn of {}", session.action),
            None => println!("{}", "Learn was not armed".dimmed()),
        },
        ReplCommand::Status => match engine.learn_state().await {
            LearnState::Idle => println!("Learn idle"),
            LearnState::Armed(session) => {
                println!("Learn armed: {} -> {}", session.action, session.target)
            }
        },
        ReplCommand::Targets => {
            let targets = engine.list_targets().await;
            if targets.is_empty() {
                println!("{}", "No targets".dimmed());
            }
            for t in targets {
                let status = if t.is_online() { "online".green() } else { "offline".dimmed() };
                let channel = t
                    .assigned_channel
                    .map(|c| format!("ch{}", c))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  #{:<4} {:<24} {:<20} {:<8} {}",
                    t.logical_id.0,
                    t.display_name.bright_white(),
                    t.kind.as_str(),
                    channel,
                    status
                );
            }
        }
        ReplCommand::Channels => {
            for ch in engine.list_channels().await {
                let ids: Vec<String> = ch.assigned_targets.iter().map(|id| id.to_string()).collect();
                println!(
                    "  ch{:<3} vol {:>5.1}%  {}{}{}{}  [{}]",
                    ch.index,
                    ch.volume * 100.0,
                    flag(ch.is_muted, "M"),
                    flag(ch.is_soloed, "S"),
                    flag(ch.is_recording, "R"),
                    flag(ch.is_selected, "*"),
                    ids.join(", ")
                );
            }
        }
        ReplCommand::Mappings => {
            let mappings = engine.list_mappings().await;
            if mappings.is_empty() {
                println!("{}", "No mappings".dimmed());
            }
            for m in mappings {
                println!(
                    "  {:<16} -> {} {}{}",
                    m.key().to_string().yellow(),
                    m.action,
                    m.target,
                    if m.inverted { " (inverted)" } else { "" }
                );
            }
        }
        ReplCommand::Assign { id, channel } => {
            match engine.assign_target(id, channel).await? {
                Some(previous) if previous != channel => {
                    println!("Moved {} from ch{} to ch{}", id, previous, channel)
                }
                _ => println!("Assigned {} to ch{}", id, channel),
            }
        }
        ReplCommand::Unassign { id } => match engine.unassign_target(id).await? {
            Some(channel) => println!("Removed {} from ch{}", id, channel),
            None => println!("{}", "Target was not assigned".dimmed()),
        },
        ReplCommand::Manual { process, display_name } => {
            let id = engine.add_manual_target(process, display_name).await?;
            println!("Added target {}", id);
        }
        ReplCommand::Special(kind) => {
            let id = engine.add_special_target(kind).await?;
            println!("Added {} target {}", kind, id);
        }
        ReplCommand::Remove { id } => {
            let target = engine.remove_target(id).await?;
            println!("Removed {} ({})", id, target.display_name);
        }
        ReplCommand::Unmap(key) => match engine.remove_mapping(key).await {
            Some(entry) => println!("Removed mapping {} ({})", key, entry.action),
            None => println!("{}", "No such mapping".dimmed()),
        },
        ReplCommand::Clear => {
            let removed = engine.clear_mappings().await;
            println!("Removed {} mappings", removed);
        }
        ReplCommand::Export(path) => {
            let snapshot = engine
                .snapshot()
                .await
                .ok_or_else(|| anyhow!("engine is not running"))?;
            snapshot.save_to_file(&path).await?;
            println!("Exported to {}", path.display());
        }
        ReplCommand::Import(path) => {
            let snapshot = MixerSnapshot::load_from_file(&path).await?;
            let summary = engine.restore_snapshot(snapshot).await?;
            println!(
                "Imported {}: {} mappings, {} targets, {} assignments",
                path.display(),
                summary.mappings,
                summary.targets,
                summary.assignments
            );
        }
        ReplCommand::Quit => {}
    }
    Ok(())
}

fn flag(on: bool, label: &str) -> ColoredString {
    if on {
        label.bold().yellow()
    } else {
        "-".dimmed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learn_needs_channel_except_transport() {
        assert_eq!(
            parse_command("learn volume 2").unwrap(),
            ReplCommand::Learn {
                action: Action::Volume,
                target: ChannelTarget::Channel(2),
            }
        );
        assert_eq!(
            parse_command("learn play").unwrap(),
            ReplCommand::Learn {
                action: Action::TransportPlay,
                target: ChannelTarget::Global,
            }
        );
        assert!(parse_command("learn mute").is_err());
        assert!(parse_command("learn dance 1").is_err());
    }

    #[test]
    fn test_target_commands() {
        assert_eq!(
            parse_command("assign #3 1").unwrap(),
            ReplCommand::Assign {
                id: LogicalId(3),
                channel: 1,
            }
        );
        assert_eq!(
            parse_command("manual Discord.exe Voice Chat").unwrap(),
            ReplCommand::Manual {
                process: "Discord.exe".to_string(),
                display_name: Some("Voice Chat".to_string()),
            }
        );
        assert_eq!(
            parse_command("manual obs").unwrap(),
            ReplCommand::Manual {
                process: "obs".to_string(),
                display_name: None,
            }
        );
        assert_eq!(
            parse_command("special Focused").unwrap(),
            ReplCommand::Special(TargetKind::SpecialFocusedApp)
        );
        assert!(parse_command("special manual").is_err());
        assert!(parse_command("remove abc").is_err());
    }

    #[test]
    fn test_unmap_parses_key() {
        assert_eq!(
            parse_command("unmap 0 pb continuous").unwrap(),
            ReplCommand::Unmap(MappingKey::new(0, ControlNumber::PitchBend, EventShape::Continuous))
        );
        assert_eq!(
            parse_command("unmap 2 16 d").unwrap(),
            ReplCommand::Unmap(MappingKey::new(2, ControlNumber::Number(16), EventShape::Discrete))
        );
        assert!(parse_command("unmap 16 16 d").is_err());
        assert!(parse_command("unmap 0 200 d").is_err());
        assert!(parse_command("unmap 0 16").is_err());
    }

    #[test]
    fn test_misc_commands() {
        assert_eq!(parse_command("  QUIT ").unwrap(), ReplCommand::Quit);
        assert_eq!(parse_command("exit").unwrap(), ReplCommand::Quit);
        assert_eq!(
            parse_command("export /tmp/mix.json").unwrap(),
            ReplCommand::Export(PathBuf::from("/tmp/mix.json"))
        );
        assert!(parse_command("").is_err());
        assert!(parse_command("clear everything").is_err());
    }

    #[test]
    fn test_cli_args() {
        let cli = Cli::parse_from(["surface-mixer", "--no-surface", "--repl", "-c", "mixer.yaml"]);
        assert!(cli.no_surface);
        assert!(cli.repl);
        assert_eq!(cli.config, Some(PathBuf::from("mixer.yaml")));
        assert!(!cli.list_ports);
    }
}
