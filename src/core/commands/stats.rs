// src/core/commands/stats.rs

//! Implements the `stats` command and the text/HTML renderings of a
//! `StatsSnapshot`.

use super::registry::{Request, RequestContext, RequestOutcome};
use crate::core::NetShellError;
use crate::core::state::{ConnectionSnapshot, StatsSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

const DATE_FORMAT: &str = "%d %b %H:%M:%S";

/// The fixed column header of the per-connection table.
pub const CONNECTION_HEADER: &str =
    "OPEN-DATE        THREAD  STATE NLINE  LAST-ACTIVITY  U SHEL QZ E PENDG";

pub const STATS_SUMMARY: &str = "Print some diagnostic statistics about the server.";

/// The help text of `stats`, which doubles as the legend of the HTML page.
pub const STATS_LEGEND: &str = "Usage: stats\n\n\
The current date in UTC is printed, followed by:\n\
\x20 up-since: the date when the server was started.\n\
\x20 last: the date when the most recent connection was opened.\n\
\x20 tot-cnct: grand total number of network connections opened.\n\
\x20 cur-open-socks: number of currently open connections.\n\
\x20 num-open-fds: number of open file descriptors.\n\
\x20 stalls: times that open stalled due to hitting max-open-cnt.\n\
\x20 tot-lines: total number of newlines received by all shells.\n\
\x20 cpu user sys: number of CPU seconds used by server.\n\
\x20 maxrss: resident set size, in KB. Taken from `getrusage`.\n\
\n\
The table shows a list of the currently open connections.\n\
The table header has the following form:\n\
OPEN-DATE THREAD STATE NLINE LAST-ACTIVITY U SHEL QZ E PENDG\n\
The columns are:\n\
\x20 OPEN-DATE -- when the connection was opened.\n\
\x20 THREAD -- the session id of the connection.\n\
\x20 STATE -- several states possible; `iwait` means waiting for input.\n\
\x20 NLINE -- number of newlines received by the shell.\n\
\x20 LAST-ACTIVITY -- the last time anything was received.\n\
\x20 U -- use count. The number of active handlers for the socket.\n\
\x20 SHEL -- the current shell processor for the socket.\n\
\x20 QZ -- size of the unprocessed (pending) request queue.\n\
\x20 E -- `T` if the shell evaluator is running, else `F`.\n\
\x20 PENDG -- number of bytes of output not yet sent.\n\
\n";

fn short_date(t: DateTime<Utc>) -> String {
    t.format(DATE_FORMAT).to_string()
}

/// Formats one row of the connection table.
pub fn render_connection(row: &ConnectionSnapshot) -> String {
    format!(
        "{} {:>8} {} {:>5} {} {:>2} {:<4} {:>2} {} {:>5}",
        short_date(row.opened),
        row.session_id,
        row.state.label(),
        row.line_count,
        short_date(row.last_activity),
        row.use_count,
        row.shell_name,
        row.queue_size,
        if row.eval_running { 'T' } else { 'F' },
        row.pending_bytes,
    )
}

/// The plain-text report printed by `stats`.
pub fn render_text(snapshot: &StatsSnapshot) -> String {
    let agg = &snapshot.aggregate;
    let last = agg
        .last_connection
        .map(short_date)
        .unwrap_or_else(|| "never".to_string());

    let mut out = format!("{}\n", agg.now.format("%Y-%m-%d %H:%M:%S UTC"));
    out.push_str(&format!(
        "up-since: {}  last: {}  tot-cnct: {}\n",
        short_date(agg.up_since),
        last,
        agg.total_connections
    ));
    out.push_str(&format!(
        "cur-open-socks: {}  num-open-fds: {}  stalls: {}  tot-lines: {}\n",
        agg.open_connections, agg.open_fds, agg.stalls, agg.total_lines
    ));
    out.push_str(&format!(
        "cpu user sys: {:.2} {:.2}  maxrss: {} KB\n\n",
        agg.usage.user_secs, agg.usage.sys_secs, agg.usage.max_rss_kb
    ));

    out.push_str(CONNECTION_HEADER);
    out.push('\n');
    for row in &snapshot.connections {
        out.push_str(&render_connection(row));
        out.push('\n');
    }
    out
}

/// A complete HTTP response carrying the report as an HTML page.
pub fn render_html_response(snapshot: &StatsSnapshot) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Server: NetShell\r\n\
         Content-Type: text/html\r\n\
         \r\n\
         <!DOCTYPE html><html>\
         <head><title>NetShell Stats</title><meta charset=\"UTF-8\"></head>\
         <body><h2>NetShell Stats</h2><pre>\n{}</pre>\
         <h2>Stats Legend</h2><pre>{}</pre></body></html>",
        html_escape(&render_text(snapshot)),
        html_escape(STATS_LEGEND)
    )
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

/// `stats`: pings idle peers, then prints the report.
#[derive(Debug, Default)]
pub struct StatsRequest;

#[async_trait]
impl Request for StatsRequest {
    async fn execute(
        &mut self,
        ctx: &RequestContext,
        _args: &str,
    ) -> Result<RequestOutcome, NetShellError> {
        ctx.state.half_ping();
        Ok(RequestOutcome::text(render_text(&ctx.state.stats.snapshot())))
    }
}
