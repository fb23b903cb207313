//! Standalone CLI tool for dumping a CUP accessibility snapshot.

use clap::{Parser, ValueEnum};

use cup_core::format::Detail;
use cup_core::schema::Scope;
use cup_core::session::{Session, Snapshot, SnapshotOptions};

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Overview,
    Foreground,
    Desktop,
    Full,
}

impl From<ScopeArg> for Scope {
    fn from(s: ScopeArg) -> Self {
        match s {
            ScopeArg::Overview => Scope::Overview,
            ScopeArg::Foreground => Scope::Foreground,
            ScopeArg::Desktop => Scope::Desktop,
            ScopeArg::Full => Scope::Full,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DetailArg {
    Compact,
    Full,
}

impl From<DetailArg> for Detail {
    fn from(d: DetailArg) -> Self {
        match d {
            DetailArg::Compact => Detail::Compact,
            DetailArg::Full => Detail::Full,
        }
    }
}

#[derive(Parser)]
#[command(name = "cup-tree", about = "Dump a CUP accessibility snapshot")]
struct Args {
    /// Which windows to capture.
    #[arg(long, value_enum, default_value_t = ScopeArg::Foreground)]
    scope: ScopeArg,

    /// Title substring filter, `--scope full` only.
    #[arg(long)]
    app: Option<String>,

    /// Maximum tree depth per window.
    #[arg(long, default_value_t = 999)]
    max_depth: usize,

    /// Tree shaping: prune/clip to the viewport, or emit everything.
    #[arg(long, value_enum, default_value_t = DetailArg::Compact)]
    detail: DetailArg,

    /// Emit the full JSON envelope instead of the compact text grammar.
    #[arg(long)]
    json: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let session = match Session::new(None) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cup-tree: {e}");
            std::process::exit(1);
        }
    };

    let opts = SnapshotOptions {
        scope: args.scope.into(),
        app: args.app,
        max_depth: args.max_depth,
        compact: !args.json,
        detail: args.detail.into(),
    };

    match session.snapshot(&opts) {
        Ok(Snapshot::Text(text)) => println!("{text}"),
        Ok(Snapshot::Envelope(envelope)) => {
            println!("{}", serde_json::to_string_pretty(&envelope).expect("envelope always serialises"));
        }
        Err(e) => {
            eprintln!("cup-tree: {e}");
            std::process::exit(1);
        }
    }
}
