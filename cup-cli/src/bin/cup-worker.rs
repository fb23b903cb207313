//! Line-delimited JSON-RPC worker process wrapping a [`cup_core::Session`].
//!
//! Reads one JSON request per line from stdin, dispatches it against a
//! single long-lived session, writes one JSON response per line to stdout --
//! keeping OS-isolated accessibility work out of the calling process.

use std::io::{self, BufRead, Write};

use clap::Parser;
use serde::{Deserialize, Serialize};

use cup_core::actions::Action;
use cup_core::dispatch::Direction;
use cup_core::schema::NodeId;
use cup_core::search::SearchQuery;
use cup_core::session::{BatchItem, Session, Snapshot, SnapshotOptions};
use cup_core::states::State;

#[derive(Parser)]
#[command(name = "cup-worker", about = "CUP IPC worker process")]
struct Args {
    /// Enable verbose logging to stderr.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Deserialize)]
struct Request {
    id: u64,
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Serialize)]
struct Response {
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn dispatch(session: &Session, method: &str, params: &serde_json::Value) -> Result<serde_json::Value, String> {
    match method {
        "ping" => Ok(serde_json::Value::String("pong".to_owned())),
        "snapshot" => {
            let opts: SnapshotOptions = snapshot_options_from_json(params)?;
            match session.snapshot(&opts).map_err(|e| e.to_string())? {
                Snapshot::Text(text) => Ok(serde_json::Value::String(text)),
                Snapshot::Envelope(envelope) => serde_json::to_value(envelope).map_err(|e| e.to_string()),
            }
        }
        "find" => {
            let query = search_query_from_json(params)?;
            let results = session.find(&query).map_err(|e| e.to_string())?;
            serde_json::to_value(results).map_err(|e| e.to_string())
        }
        "action" => {
            let id: NodeId = params
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or("'action' requires an 'id' string")?
                .parse()
                .map_err(|_| "malformed element id".to_string())?;
            let action_name = params.get("action").and_then(|v| v.as_str()).ok_or("'action' requires 'action'")?;
            let action = Action::from_wire_name(action_name).ok_or_else(|| format!("unknown action '{action_name}'"))?;
            let text = params.get("text").and_then(|v| v.as_str()).map(str::to_owned);
            let combo = params.get("combo").and_then(|v| v.as_str()).map(str::to_owned);
            let direction = params
                .get("direction")
                .and_then(|v| v.as_str())
                .map(|s| Direction::from_wire_name(s).ok_or_else(|| format!("unknown direction '{s}'")))
                .transpose()?;
            let result = session.action(id, action, text, combo, direction).map_err(|e| e.to_string())?;
            serde_json::to_value(result).map_err(|e| e.to_string())
        }
        "press" => {
            let combo = params.get("combo").and_then(|v| v.as_str()).ok_or("'press' requires 'combo'")?;
            let result = session.press(combo).map_err(|e| e.to_string())?;
            serde_json::to_value(result).map_err(|e| e.to_string())
        }
        "open_app" => {
            let name = params.get("name").and_then(|v| v.as_str()).ok_or("'open_app' requires 'name'")?;
            let result = session.open_app(name).map_err(|e| e.to_string())?;
            serde_json::to_value(result).map_err(|e| e.to_string())
        }
        "batch" => {
            let items: Vec<BatchItem> = params
                .get("items")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| format!("malformed batch items: {e}"))?
                .ok_or("'batch' requires 'items'")?;
            let results = session.batch(&items);
            serde_json::to_value(results).map_err(|e| e.to_string())
        }
        _ => Err(format!("unknown method: {method}")),
    }
}

fn snapshot_options_from_json(params: &serde_json::Value) -> Result<SnapshotOptions, String> {
    use cup_core::format::Detail;
    use cup_core::schema::Scope;

    let mut opts = SnapshotOptions::default();
    if let Some(scope) = params.get("scope").and_then(|v| v.as_str()) {
        opts.scope = match scope {
            "overview" => Scope::Overview,
            "foreground" => Scope::Foreground,
            "desktop" => Scope::Desktop,
            "full" => Scope::Full,
            other => return Err(format!("unknown scope '{other}'")),
        };
    }
    if let Some(app) = params.get("app").and_then(|v| v.as_str()) {
        opts.app = Some(app.to_owned());
    }
    if let Some(depth) = params.get("max_depth").and_then(|v| v.as_u64()) {
        opts.max_depth = depth as usize;
    }
    if let Some(compact) = params.get("compact").and_then(|v| v.as_bool()) {
        opts.compact = compact;
    }
    if let Some(detail) = params.get("detail").and_then(|v| v.as_str()) {
        opts.detail = match detail {
            "compact" => Detail::Compact,
            "full" => Detail::Full,
            other => return Err(format!("unknown detail '{other}'")),
        };
    }
    Ok(opts)
}

fn search_query_from_json(params: &serde_json::Value) -> Result<SearchQuery, String> {
    let mut query = SearchQuery::new();
    query.query = params.get("query").and_then(|v| v.as_str()).map(str::to_owned);
    query.role = params.get("role").and_then(|v| v.as_str()).map(str::to_owned);
    query.name = params.get("name").and_then(|v| v.as_str()).map(str::to_owned);
    if let Some(state) = params.get("state").and_then(|v| v.as_str()) {
        query.state = Some(State::from_wire_name(state).ok_or_else(|| format!("unknown state '{state}'"))?);
    }
    if let Some(limit) = params.get("limit").and_then(|v| v.as_u64()) {
        query.limit = limit as usize;
    }
    if let Some(threshold) = params.get("threshold").and_then(|v| v.as_f64()) {
        query.threshold = threshold;
    }
    Ok(query)
}

fn main() {
    let args = Args::parse();
    env_logger::init();

    let session = match Session::new(None) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cup-worker: failed to start: {e}");
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    if args.verbose {
        eprintln!("cup-worker: ready on platform {}", session.platform());
    }

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                if args.verbose {
                    eprintln!("cup-worker: stdin read error: {e}");
                }
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let req: Request = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                let resp = Response { id: 0, result: None, error: Some(format!("invalid JSON: {e}")) };
                if let Ok(json) = serde_json::to_string(&resp) {
                    let _ = writeln!(stdout, "{json}");
                    let _ = stdout.flush();
                }
                continue;
            }
        };

        let resp = match dispatch(&session, &req.method, &req.params) {
            Ok(result) => Response { id: req.id, result: Some(result), error: None },
            Err(error) => Response { id: req.id, result: None, error: Some(error) },
        };

        match serde_json::to_string(&resp) {
            Ok(json) => {
                let _ = writeln!(stdout, "{json}");
            }
            Err(_) => {
                let _ = writeln!(stdout, r#"{{"id":{},"error":"response serialization failed"}}"#, req.id);
            }
        }
        let _ = stdout.flush();
    }
}
