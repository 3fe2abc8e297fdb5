//! Connection descriptor parsing
//!
//! Tokenizes `key=value;` connection strings, recognizes hosted endpoints,
//! and reads/rewrites the server and database literals of live-connection
//! M expressions such as `AnalysisServices.Database("srv", "db", [...])`.

use super::{CloudConnectionType, SwapTarget};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Substrings identifying a hosted analytical endpoint
pub const CLOUD_MARKERS: &[&str] = &[
    "powerbi://",
    "pbiazure://",
    "asazure://",
    "api.powerbi.com",
    "analysis.windows.net",
];

/// Path segment preceding the workspace name in a hosted URL
pub const WORKSPACE_MARKER: &str = "/myorg/";

/// Connectors whose `.Database(...)` call is a live analytical connection
const LIVE_CONNECTORS: &[&str] = &["AnalysisServices", "AzureAnalysisServices"];

const DEFAULT_PROVIDER: &str = "MSOLAP";

static DATABASE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\b(?P<connector>[A-Za-z][A-Za-z0-9]*)\.Database\(\s*"(?P<server>(?:[^"]|"")*)"\s*,\s*"(?P<database>(?:[^"]|"")*)""#,
    )
    .expect("valid database call pattern")
});

static LIVE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#""(?P<server>(?:powerbi|pbiazure|asazure)://[^"]+)"(?:\s*,\s*"(?P<database>(?:[^"]|"")*)")?"#,
    )
    .expect("valid live url pattern")
});

/// Parsed pieces of a connection string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStringParts {
    pub provider: Option<String>,
    pub server: Option<String>,
    pub database: Option<String>,
    pub perspective: Option<String>,
    pub pairs: Vec<(String, String)>,
}

/// Split on `;` outside of quotes, then on the first `=`
pub fn parse_connection_string(input: &str) -> ConnectionStringParts {
    let mut parts = ConnectionStringParts::default();

    for token in split_tokens(input) {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = unquote(value.trim());
        if key.is_empty() {
            continue;
        }

        match key.to_ascii_lowercase().as_str() {
            "provider" => parts.provider = Some(value.clone()),
            "data source" | "server" | "address" | "addr" | "location" => {
                parts.server = Some(value.clone())
            }
            "initial catalog" | "database" | "catalog" => parts.database = Some(value.clone()),
            "cube" | "perspective" => parts.perspective = Some(value.clone()),
            _ => {}
        }
        parts.pairs.push((key.to_string(), value));
    }

    parts
}

fn split_tokens(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match (ch, quote) {
            ('"' | '\'', None) => {
                quote = Some(ch);
                current.push(ch);
            }
            (c, Some(q)) if c == q => {
                quote = None;
                current.push(ch);
            }
            (';', None) => {
                if !current.trim().is_empty() {
                    tokens.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// True when the provider or descriptor carries the analysis-engine signature
pub fn has_analysis_signature(provider: Option<&str>, descriptor: &str) -> bool {
    let matches = |s: &str| {
        let s = s.to_ascii_lowercase();
        s.contains("msolap") || s.contains("analysis-services") || s.contains("analysisservices")
    };
    provider.map(matches).unwrap_or(false) || matches(descriptor)
}

pub fn is_cloud_endpoint(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    CLOUD_MARKERS.iter().any(|m| lower.contains(m))
}

/// Workspace name from the path segment after `/myorg/`
pub fn workspace_from_url(server: &str) -> Option<String> {
    let lower = server.to_ascii_lowercase();
    let start = lower.find(WORKSPACE_MARKER)? + WORKSPACE_MARKER.len();
    let rest = &server[start..];
    let segment = rest
        .split(['/', '?', ';', '"'])
        .next()
        .unwrap_or_default()
        .replace("%20", " ");
    if segment.is_empty() {
        None
    } else {
        Some(segment)
    }
}

pub fn cloud_type_of(server: &str) -> CloudConnectionType {
    let lower = server.to_ascii_lowercase();
    if lower.starts_with("powerbi://") || lower.starts_with("asazure://") {
        CloudConnectionType::Xmla
    } else {
        CloudConnectionType::SemanticModel
    }
}

/// Descriptor for `target`, keeping the caller's provider when known
pub fn build_connection_string(target: &SwapTarget, provider: Option<&str>) -> String {
    let provider = provider
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_PROVIDER);
    let mut out = format!(
        "Provider={};Data Source={};Initial Catalog={}",
        provider,
        quote_if_needed(&target.server),
        quote_if_needed(&target.database)
    );
    if let Some(perspective) = &target.perspective {
        out.push_str(&format!(";Cube={}", quote_if_needed(perspective)));
    }
    out
}

/// Quote a descriptor value the parser would otherwise split or trim
pub(crate) fn quote_if_needed(value: &str) -> String {
    let needs_quotes = value.contains([';', '=', '"', '\''])
        || value.trim() != value;
    if !needs_quotes {
        value.to_string()
    } else if value.contains('"') {
        format!("'{}'", value)
    } else {
        format!("\"{}\"", value)
    }
}

/// Server/database pair found inside an M expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionEndpoint {
    pub connector: Option<String>,
    pub server: String,
    pub database: String,
}

fn m_unescape(value: &str) -> String {
    value.replace("\"\"", "\"")
}

fn m_escape(value: &str) -> String {
    value.replace('"', "\"\"")
}

/// Live endpoint referenced by an expression body, if any
pub fn parse_live_expression(body: &str) -> Option<ExpressionEndpoint> {
    for caps in DATABASE_CALL.captures_iter(body) {
        let connector = &caps["connector"];
        let server = m_unescape(&caps["server"]);
        if LIVE_CONNECTORS.contains(&connector) || is_cloud_endpoint(&server) {
            return Some(ExpressionEndpoint {
                connector: Some(connector.to_string()),
                server,
                database: m_unescape(&caps["database"]),
            });
        }
    }

    LIVE_URL.captures(body).map(|caps| ExpressionEndpoint {
        connector: None,
        server: caps["server"].to_string(),
        database: caps
            .name("database")
            .map(|m| m_unescape(m.as_str()))
            .unwrap_or_default(),
    })
}

fn splice(body: &str, caps: &Captures<'_>, server: &str, database: &str) -> String {
    let mut out = String::with_capacity(body.len() + server.len() + database.len());
    let server_span = caps.name("server").map(|m| m.range());
    let database_span = caps.name("database").map(|m| m.range());
    let mut cursor = 0;

    for (span, value) in [(server_span, server), (database_span, database)] {
        if let Some(span) = span {
            out.push_str(&body[cursor..span.start]);
            out.push_str(&m_escape(value));
            cursor = span.end;
        }
    }
    out.push_str(&body[cursor..]);
    out
}

/// Rewrite the live endpoint literals in place, preserving everything else.
///
/// Returns `None` when the body holds no recognizable live endpoint.
pub fn replace_expression_endpoint(body: &str, server: &str, database: &str) -> Option<String> {
    for caps in DATABASE_CALL.captures_iter(body) {
        let connector = &caps["connector"];
        if LIVE_CONNECTORS.contains(&connector) || is_cloud_endpoint(&m_unescape(&caps["server"])) {
            return Some(splice(body, &caps, server, database));
        }
    }
    LIVE_URL
        .captures(body)
        .map(|caps| splice(body, &caps, server, database))
}
