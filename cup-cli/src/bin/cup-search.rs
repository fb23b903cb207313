//! Standalone CLI tool for searching the foreground window's accessibility
//! tree (auto-captures it if nothing has been captured yet).

use clap::Parser;

use cup_core::search::SearchQuery;
use cup_core::session::Session;
use cup_core::states::State;

#[derive(Parser)]
#[command(name = "cup-search", about = "Search a CUP accessibility tree by role/name/state")]
struct Args {
    /// Free-text query, matched against node names (and role synonyms).
    query: Option<String>,

    #[arg(long)]
    role: Option<String>,

    #[arg(long)]
    name: Option<String>,

    /// One of the 16 CUP state wire names, e.g. "focused".
    #[arg(long)]
    state: Option<String>,

    #[arg(long, default_value_t = 20)]
    limit: usize,

    #[arg(long, default_value_t = 0.15)]
    threshold: f64,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let state = match args.state.as_deref() {
        Some(s) => match State::from_wire_name(s) {
            Some(state) => Some(state),
            None => {
                eprintln!("cup-search: unknown state '{s}'");
                std::process::exit(2);
            }
        },
        None => None,
    };

    let session = match Session::new(None) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cup-search: {e}");
            std::process::exit(1);
        }
    };

    let query = SearchQuery {
        query: args.query,
        role: args.role,
        name: args.name,
        state,
        limit: args.limit,
        threshold: args.threshold,
    };

    match session.find(&query) {
        Ok(results) => println!("{}", serde_json::to_string_pretty(&results).expect("results always serialise")),
        Err(e) => {
            eprintln!("cup-search: {e}");
            std::process::exit(1);
        }
    }
}
