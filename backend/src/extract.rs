//! Pulls labelled SQL queries out of free-form assistant replies.
//!
//! Replies come in one of a few shapes. The shape is detected from its
//! markers first ([`QueryFormat::detect`]) and then handed to the matching
//! strategy; nothing here guesses by trying every parser in turn.

use indexmap::IndexMap;
use regex::Regex;
use shared::ContentBlock;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Ordered label -> SQL map handed to the executor
pub type QueryMap = IndexMap<String, String>;

/// One labelled query found in a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedQuery {
    pub label: String,
    pub sql: String,
}

impl NamedQuery {
    pub fn new(label: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sql: sql.into(),
        }
    }
}

/// Layout of the queries inside a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFormat {
    /// `"Label": """SELECT ..."""`
    TripleQuoted,
    /// A fenced code block holding `queries = [ { Label: "SELECT ..." } ]`
    FencedArray,
    /// The whole reply is an array of `{ "Label": "SELECT ..." }` records
    BareArray,
}

impl QueryFormat {
    pub fn detect(text: &str) -> Option<Self> {
        if text.contains(r#"""""#) {
            Some(QueryFormat::TripleQuoted)
        } else if text.contains("```") {
            Some(QueryFormat::FencedArray)
        } else if text.trim_start().starts_with('[') {
            Some(QueryFormat::BareArray)
        } else {
            None
        }
    }
}

static TRIPLE_QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"([^"\n]+)"\s*:\s*"""(.*?)""""#).expect("valid triple-quote pattern")
});

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```[ \t]*(?:sql|json|javascript|js)?[ \t]*\r?\n?(.*?)```")
        .expect("valid fence pattern")
});

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(?:(?:const|let|var)\s+)?queries\s*=\s*(\[.*\])")
        .expect("valid assignment pattern")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Extract every labelled query from the text blocks of a reply, in order.
///
/// An empty result means "nothing to run", never an error.
pub fn extract_queries(content: &[ContentBlock]) -> Vec<NamedQuery> {
    content
        .iter()
        .filter_map(ContentBlock::as_text)
        .flat_map(extract_from_text)
        .collect()
}

pub fn extract_from_text(text: &str) -> Vec<NamedQuery> {
    let Some(format) = QueryFormat::detect(text) else {
        return Vec::new();
    };
    debug!("Detected query format {:?}", format);

    match format {
        QueryFormat::TripleQuoted => extract_triple_quoted(text),
        QueryFormat::FencedArray => extract_fenced_arrays(text),
        QueryFormat::BareArray => extract_bare_array(text),
    }
}

pub fn extract_triple_quoted(text: &str) -> Vec<NamedQuery> {
    TRIPLE_QUOTED
        .captures_iter(text)
        .map(|caps| {
            let sql = WHITESPACE.replace_all(&caps[2], " ");
            NamedQuery::new(caps[1].trim(), sql.trim())
        })
        .collect()
}

pub fn extract_fenced_arrays(text: &str) -> Vec<NamedQuery> {
    let mut found = Vec::new();

    for (index, caps) in FENCED_BLOCK.captures_iter(text).enumerate() {
        let body = caps[1].trim();
        let array = match ASSIGNMENT.captures(body) {
            Some(assignment) => assignment.get(1).map(|m| m.as_str()),
            None if body.starts_with('[') => Some(body),
            None => None,
        };
        let Some(array) = array else {
            debug!("Fenced block {} holds no query array", index);
            continue;
        };

        match parse_query_array(array) {
            Ok(queries) => found.extend(queries),
            Err(e) => warn!("Skipping unparseable query block {}: {}", index, e),
        }
    }

    found
}

pub fn extract_bare_array(text: &str) -> Vec<NamedQuery> {
    let trimmed = text.trim();
    let end = trimmed.rfind(']').map(|i| i + 1).unwrap_or(trimmed.len());

    match parse_query_array(&trimmed[..end]) {
        Ok(queries) => queries,
        Err(e) => {
            warn!("Reply looked like a query array but did not parse: {}", e);
            Vec::new()
        }
    }
}

/// Parse a JS-ish array of single-key records into labelled queries
fn parse_query_array(raw: &str) -> Result<Vec<NamedQuery>, serde_json::Error> {
    let repaired = normalize_js_object(raw);
    let records: Vec<IndexMap<String, serde_json::Value>> = serde_json::from_str(&repaired)?;

    Ok(records
        .into_iter()
        .flat_map(|record| record.into_iter())
        .filter_map(|(label, value)| match value {
            serde_json::Value::String(sql) => Some(NamedQuery::new(label.trim(), sql.trim())),
            other => {
                debug!("Ignoring non-string query value for {:?}: {}", label, other);
                None
            }
        })
        .collect())
}

/// Merge extracted queries into one map; a repeated label keeps the last query
pub fn flatten(queries: Vec<NamedQuery>) -> QueryMap {
    let mut map = QueryMap::new();
    for query in queries {
        map.insert(query.label, query.sql);
    }
    map
}

/// Rewrite a JavaScript object/array literal into JSON.
///
/// Quotes bare object keys, turns single-quoted strings into double-quoted
/// ones and drops trailing commas. Content of string literals is left alone.
pub fn normalize_js_object(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 16);
    let mut last_significant: Option<char> = None;
    let mut pending_comma: Option<usize> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                let end = (i + 1).min(chars.len());
                out.extend(&chars[start..end]);
                last_significant = Some('"');
                pending_comma = None;
            }
            '\'' => {
                out.push('"');
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    match chars[i] {
                        '\\' if i + 1 < chars.len() && chars[i + 1] == '\'' => {
                            out.push('\'');
                            i += 1;
                        }
                        '\\' if i + 1 < chars.len() => {
                            out.push('\\');
                            out.push(chars[i + 1]);
                            i += 1;
                        }
                        '"' => out.push_str("\\\""),
                        other => out.push(other),
                    }
                    i += 1;
                }
                out.push('"');
                last_significant = Some('"');
                pending_comma = None;
            }
            ']' | '}' => {
                if let Some(pos) = pending_comma.take() {
                    out.remove(pos);
                }
                out.push(c);
                last_significant = Some(c);
            }
            ',' => {
                pending_comma = Some(out.len());
                out.push(c);
                last_significant = Some(c);
            }
            c if c.is_whitespace() => out.push(c),
            c if is_ident_start(c) && matches!(last_significant, Some('{') | Some(',')) => {
                let start = i;
                while i + 1 < chars.len() && is_ident_char(chars[i + 1]) {
                    i += 1;
                }
                let ident: String = chars[start..=i].iter().collect();
                let mut look = i + 1;
                while look < chars.len() && chars[look].is_whitespace() {
                    look += 1;
                }
                if look < chars.len() && chars[look] == ':' {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
                last_significant = Some('a');
                pending_comma = None;
            }
            other => {
                out.push(other);
                last_significant = Some(other);
                pending_comma = None;
            }
        }
        i += 1;
    }

    out
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}
