//! W3C WebSub helpers: link discovery and handshake payloads.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HyperResult, TransportError};

/// Header carrying the agent's WebID on focus requests.
pub const AGENT_WEB_ID_HEADER: &str = "X-Agent-WebID";

/// Hub and topic advertised by a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSubLinks {
    pub hub: String,
    pub topic: String,
}

static LINK_PART: OnceLock<Regex> = OnceLock::new();
static LINK_SEPARATOR: OnceLock<Regex> = OnceLock::new();
static HTML_HUB: OnceLock<Regex> = OnceLock::new();
static HTML_SELF: OnceLock<Regex> = OnceLock::new();

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| unreachable!("static link pattern is valid: {e}"))
}

fn link_part_regex() -> &'static Regex {
    LINK_PART.get_or_init(|| compile(r#"^\s*<([^>]*)>\s*;\s*rel="([^"]*)"\s*$"#))
}

/// A comma only separates links when the next one opens with `<`; URLs may
/// contain commas themselves.
fn link_separator_regex() -> &'static Regex {
    LINK_SEPARATOR.get_or_init(|| compile(r",\s*<"))
}

fn html_link_regex(rel: &str) -> &'static Regex {
    if rel == "hub" {
        HTML_HUB.get_or_init(|| compile(r#"<link rel="hub" href="([^"]+)">"#))
    } else {
        HTML_SELF.get_or_init(|| compile(r#"<link rel="self" href="([^"]+)">"#))
    }
}

/// Parses one `Link` header value into its `hub` and `self` relations.
/// Other relations are ignored.
#[must_use]
pub fn parse_link_header(value: &str) -> HashMap<String, String> {
    link_separator_regex()
        .split(value)
        .enumerate()
        .map(|(i, part)| if i == 0 { part.to_string() } else { format!("<{part}") })
        .filter_map(|part| {
            let c = link_part_regex().captures(&part)?;
            let rel = c.get(2)?.as_str();
            let url = c.get(1)?.as_str();
            matches!(rel, "hub" | "self").then(|| (rel.to_string(), url.to_string()))
        })
        .collect()
}

/// Finds the WebSub hub and topic of a resource.
///
/// `Link` headers are checked first; the `<link>` elements of an HTML body
/// are the fallback. Both relations must come from the same source.
#[must_use]
pub fn discover<'a, I>(link_headers: I, html_body: Option<&str>) -> Option<WebSubLinks>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hub = None;
    let mut topic = None;
    for value in link_headers {
        let mut links = parse_link_header(value);
        if let Some(h) = links.remove("hub") {
            hub = Some(h);
        }
        if let Some(t) = links.remove("self") {
            topic = Some(t);
        }
        if hub.is_some() && topic.is_some() {
            break;
        }
    }
    if let (Some(hub), Some(topic)) = (hub, topic) {
        return Some(WebSubLinks { hub, topic });
    }

    let body = html_body?;
    let find = |rel: &str| {
        html_link_regex(rel)
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };
    Some(WebSubLinks {
        hub: find("hub")?,
        topic: find("self")?,
    })
}

/// Extracts the topic of an inbound push from its `Link: <topic>; rel="self"`
/// header.
///
/// # Errors
/// `MissingSelfLink` when no header carries a self relation.
pub fn self_topic<'a, I>(link_headers: I) -> HyperResult<String>
where
    I: IntoIterator<Item = &'a str>,
{
    link_headers
        .into_iter()
        .filter_map(|v| parse_link_header(v).remove("self"))
        .last()
        .ok_or_else(|| TransportError::MissingSelfLink.into())
}

/// Body of a WebSub subscribe request.
#[must_use]
pub fn subscribe_body(topic: &str, callback: &str) -> serde_json::Value {
    serde_json::json!({
        "hub.mode": "subscribe",
        "hub.topic": topic,
        "hub.callback": callback,
    })
}

/// Body of a workspace focus request.
#[must_use]
pub fn focus_body(artifact_name: &str, callback: &str) -> serde_json::Value {
    serde_json::json!({
        "artifactName": artifact_name,
        "callbackIri": callback,
    })
}

/// Focus endpoint of a workspace.
#[must_use]
pub fn focus_url(workspace: &str) -> String {
    format!("{}/focus", workspace.trim_end_matches('/'))
}
