//! Standalone CLI tool for dispatching one CUP action, a keyboard combo, or
//! an app launch against the current foreground snapshot.

use clap::{Parser, Subcommand};

use cup_core::actions::Action;
use cup_core::dispatch::Direction;
use cup_core::schema::NodeId;
use cup_core::session::{Session, SnapshotOptions};

#[derive(Parser)]
#[command(name = "cup-action", about = "Dispatch one CUP action against the foreground window")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dispatch a canonical action against a captured element id (e.g. "e14").
    Element {
        /// Element id from a prior `cup-tree` capture.
        id: String,
        /// Wire name of the action, e.g. "click", "type", "setvalue".
        action: String,
        /// Text payload for `type`/`setvalue`.
        #[arg(long)]
        text: Option<String>,
        /// Key combo for `press_keys`, e.g. "ctrl+shift+s".
        #[arg(long)]
        combo: Option<String>,
        /// Scroll direction for `scroll`: "up", "down", "left", or "right".
        #[arg(long)]
        direction: Option<String>,
    },
    /// Send a keyboard shortcut to the focused window.
    Press {
        /// Key combo, e.g. "ctrl+c".
        combo: String,
    },
    /// Fuzzy-match and launch an installed application.
    Open {
        /// Application name or fragment thereof.
        name: String,
    },
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let session = match Session::new(None) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cup-action: {e}");
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Command::Element { id, action, text, combo, direction } => {
            let Ok(id) = id.parse::<NodeId>() else {
                eprintln!("cup-action: malformed element id '{id}', expected form 'e<n>'");
                std::process::exit(2);
            };
            let Some(action) = Action::from_wire_name(&action) else {
                eprintln!("cup-action: unknown action '{action}'");
                std::process::exit(2);
            };
            let direction = match direction {
                Some(d) => match Direction::from_wire_name(&d) {
                    Some(d) => Some(d),
                    None => {
                        eprintln!("cup-action: unknown direction '{d}'");
                        std::process::exit(2);
                    }
                },
                None => None,
            };
            // Elements only resolve against the most recent capture, so take
            // one foreground snapshot first (spec §9 ref table lifecycle).
            if let Err(e) = session.snapshot(&SnapshotOptions::default()) {
                eprintln!("cup-action: {e}");
                std::process::exit(1);
            }
            session.action(id, action, text, combo, direction)
        }
        Command::Press { combo } => session.press(&combo),
        Command::Open { name } => session.open_app(&name),
    };

    match result {
        Ok(r) => println!("{}", serde_json::to_string_pretty(&r).expect("result always serialises")),
        Err(e) => {
            eprintln!("cup-action: {e}");
            std::process::exit(1);
        }
    }
}
