// cgi: fresh per-request handler invoked by the host web server for each
// smajax-style query. Reads the active-message journal directly, or
// round-trips through the WTC queue for anything only the dispatcher's
// in-memory device state can answer (spec.md 4.H).

use banner_cgi::{actions, config, form};
use std::io::Read;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let request = read_request_body();
    let fields = form::parse(&request);

    let response = actions::dispatch(&cfg, &fields);
    print!("{response}");
}

/// Request input is the query string for GET, or the whole stdin body for
/// POST, per spec.md 4.H; this binary is invoked once per HTTP request by
/// the host's CGI gateway, which sets `QUERY_STRING`/forwards stdin.
fn read_request_body() -> String {
    if let Ok(query) = std::env::var("QUERY_STRING") {
        if !query.is_empty() {
            return query;
        }
    }
    let mut buf = String::new();
    let _ = std::io::stdin().read_to_string(&mut buf);
    buf
}
