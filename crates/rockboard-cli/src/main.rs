//! Terminal participant for a Rockboard live feedback session.
//!
//! Joins a session on the relay, then reads commands from stdin:
//!
//! ```text
//! arm hand|foot|miss|pin
//! place <x> <y>
//! reset
//! resize <width> <height>
//! show
//! quit
//! ```

use clap::Parser;
use rockboard_core::{
    BroadcastError, ConfigError, FeedbackOverlay, MarkerKind, OverlayConfig, OverlayUpdate,
    RelayChannel, RelayEvent, RenderedMarker,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Interval between relay pumps.
const PUMP_INTERVAL: Duration = Duration::from_millis(50);
/// How long to wait for the relay to confirm the join.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "rockboard", about = "Place live feedback markers on a climbing session", version)]
struct Args {
    /// Relay WebSocket URL
    #[arg(long, default_value = "ws://localhost:3030/ws")]
    server: String,

    /// Session to join
    #[arg(long)]
    session: String,

    /// Local canvas width in pixels
    #[arg(long, default_value_t = 640.0)]
    width: f64,

    /// Local canvas height in pixels
    #[arg(long, default_value_t = 360.0)]
    height: f64,

    /// Overlay config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("relay: {0}")]
    Relay(String),
}

/// A line typed by the user.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Arm(MarkerKind),
    Place(f64, f64),
    Reset,
    Resize(f64, f64),
    Show,
    Quit,
}

fn parse_pair(args: &[&str], usage: &str) -> Result<(f64, f64), String> {
    match args {
        [a, b] => {
            let a = a.parse().map_err(|_| format!("not a number: {}", a))?;
            let b = b.parse().map_err(|_| format!("not a number: {}", b))?;
            Ok((a, b))
        }
        _ => Err(format!("usage: {}", usage)),
    }
}

impl std::str::FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, rest)) = words.split_first() else {
            return Err("empty command".to_string());
        };
        match head {
            "arm" => match rest {
                [kind] => kind.parse().map(Command::Arm).map_err(|e| format!("{}", e)),
                _ => Err("usage: arm <hand|foot|miss|pin>".to_string()),
            },
            "place" => parse_pair(rest, "place <x> <y>").map(|(x, y)| Command::Place(x, y)),
            "resize" => {
                parse_pair(rest, "resize <width> <height>").map(|(w, h)| Command::Resize(w, h))
            }
            "reset" => Ok(Command::Reset),
            "show" => Ok(Command::Show),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command: {}", other)),
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<OverlayConfig, ConfigError> {
    match path.or_else(OverlayConfig::default_path) {
        Some(path) => OverlayConfig::load_or_default(&path),
        None => Ok(OverlayConfig::default()),
    }
}

/// Connect and wait until the relay confirms the session.
fn join_session(relay: &mut RelayChannel, server: &str, session: &str) -> Result<(), CliError> {
    relay.connect(server).map_err(CliError::Relay)?;
    relay
        .join(session)
        .map_err(|e| CliError::Relay(e.to_string()))?;

    let deadline = Instant::now() + JOIN_TIMEOUT;
    while Instant::now() < deadline {
        for event in relay.poll_events() {
            match event {
                RelayEvent::Joined {
                    session,
                    connection_id,
                    participant_count,
                } => {
                    println!(
                        "joined {} as {} ({} participants)",
                        session, connection_id, participant_count
                    );
                    return Ok(());
                }
                RelayEvent::Error { message } => return Err(CliError::Relay(message)),
                RelayEvent::Disconnected => {
                    return Err(CliError::Relay("connection closed".to_string()));
                }
                _ => {}
            }
        }
        thread::sleep(PUMP_INTERVAL);
    }
    Err(CliError::Relay("timed out joining session".to_string()))
}

/// Forward stdin lines to the main loop.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Name of a rendered marker's kind; foreign glyphs show as `other`.
fn kind_name(marker: &RenderedMarker) -> &'static str {
    marker.kind.map_or("other", MarkerKind::name)
}

fn print_update(update: &OverlayUpdate) {
    match update {
        OverlayUpdate::Placed(marker) => println!(
            "+ {} {} at ({:.1}, {:.1}) {}",
            marker.glyph(),
            kind_name(marker),
            marker.position.x,
            marker.position.y,
            marker.color.to_hex()
        ),
        OverlayUpdate::Deferred => println!("~ marker waiting for canvas layout"),
        OverlayUpdate::Cleared { removed } => println!("- cleared {} markers", removed),
        OverlayUpdate::Dropped(e) => log::warn!("Ignored signal: {}", e),
    }
}

fn show(overlay: &FeedbackOverlay<'_, RelayChannel>) {
    let glyph_size = overlay.overlay().glyph_size();
    println!("armed: {} {}", overlay.armed().glyph(), overlay.armed());
    if overlay.overlay().is_empty() {
        println!("no markers");
    }
    for (i, marker) in overlay.markers().enumerate() {
        let bounds = marker.bounds(glyph_size);
        println!(
            "{:>3}. {} {:<4} ({:.1}, {:.1}) box [{:.1}, {:.1}, {:.1}, {:.1}] {}",
            i + 1,
            marker.glyph(),
            kind_name(marker),
            marker.position.x,
            marker.position.y,
            bounds.x0,
            bounds.y0,
            bounds.x1,
            bounds.y1,
            marker.color.to_hex()
        );
    }
}

fn report(result: Result<(), BroadcastError>) {
    if let Err(e) = result {
        println!("! {}", e);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let config = load_config(args.config)?;
    let mut relay = RelayChannel::new();
    join_session(&mut relay, &args.server, &args.session)?;

    let lines = spawn_stdin_reader();
    let mut overlay = FeedbackOverlay::open(&mut relay, &config);
    overlay.measure(args.width, args.height);

    loop {
        match lines.recv_timeout(PUMP_INTERVAL) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => match line.parse::<Command>() {
                Ok(Command::Arm(kind)) => {
                    overlay.arm(kind);
                    println!("armed {} {}", kind.glyph(), kind);
                }
                Ok(Command::Place(x, y)) => report(overlay.place_marker(x, y).map(|_| ())),
                Ok(Command::Reset) => report(overlay.reset_all()),
                Ok(Command::Resize(w, h)) => {
                    let rendered = overlay.measure(w, h);
                    if rendered > 0 {
                        println!("rendered {} waiting markers", rendered);
                    }
                    show(&overlay);
                }
                Ok(Command::Show) => show(&overlay),
                Ok(Command::Quit) => break,
                Err(e) => println!("! {}", e),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        for update in overlay.pump() {
            print_update(&update);
        }

        for event in overlay.channel().poll_events() {
            match event {
                RelayEvent::ParticipantJoined { connection_id } => {
                    println!("* {} joined", connection_id)
                }
                RelayEvent::ParticipantLeft { connection_id } => {
                    println!("* {} left", connection_id)
                }
                RelayEvent::Error { message } => log::warn!("Relay error: {}", message),
                RelayEvent::Disconnected => {
                    overlay.close();
                    return Err(CliError::Relay("connection closed".to_string()));
                }
                _ => {}
            }
        }
    }

    overlay.close();
    drop(overlay);
    relay.disconnect();
    Ok(())
}

fn main() {
    env_logger::init();
    log::info!("Starting Rockboard");

    if let Err(e) = run(Args::parse()) {
        eprintln!("rockboard: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rockboard_core::{AnnotationOverlay, LocalCanvasSurface, WireMessage};

    #[test]
    fn test_parse_commands() {
        assert_eq!("arm foot".parse::<Command>(), Ok(Command::Arm(MarkerKind::Foot)));
        assert_eq!("place 150 100".parse::<Command>(), Ok(Command::Place(150.0, 100.0)));
        assert_eq!("  resize 600 100 ".parse::<Command>(), Ok(Command::Resize(600.0, 100.0)));
        assert_eq!("reset".parse::<Command>(), Ok(Command::Reset));
        assert_eq!("show".parse::<Command>(), Ok(Command::Show));
        assert_eq!("quit".parse::<Command>(), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("".parse::<Command>().is_err());
        assert!("arm".parse::<Command>().is_err());
        assert!("arm elbow".parse::<Command>().is_err());
        assert!("place 1".parse::<Command>().is_err());
        assert!("place x 2".parse::<Command>().is_err());
        assert!("jump".parse::<Command>().is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["rockboard", "--session", "wall-3"]);
        assert_eq!(args.server, "ws://localhost:3030/ws");
        assert_eq!(args.session, "wall-3");
        assert_eq!((args.width, args.height), (640.0, 360.0));
        assert!(args.config.is_none());
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let path = std::env::temp_dir().join("rockboard-cli-test-missing").join("overlay.json");
        assert_eq!(load_config(Some(path)).unwrap(), OverlayConfig::default());
    }

    fn render(glyph: &str) -> RenderedMarker {
        let json = format!(
            r#"{{"type":"drawingSignal","data":{{"x":1,"y":1,"width":2,"height":2,"imoji":"{glyph}"}}}}"#
        );
        let mut overlay = AnnotationOverlay::new(LocalCanvasSurface::with_size(4.0, 4.0));
        match overlay.on_message(&WireMessage::from_json(&json).unwrap()) {
            OverlayUpdate::Placed(marker) => marker,
            other => panic!("expected a placed marker, got {other:?}"),
        }
    }

    #[test]
    fn test_kind_name_of_foreign_glyph() {
        assert_eq!(kind_name(&render("🦶🏻")), "foot");
        assert_eq!(kind_name(&render("🧗")), "other");
    }
}
