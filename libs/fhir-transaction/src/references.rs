//! Reference traversal over arbitrarily shaped resource payloads.
//!
//! Rather than reflecting over a typed schema, payloads travel as JSON and
//! a tagged-variant walker visits every reference-bearing element kind:
//! typed references (`{"reference": "..."}`), bare URI-valued members, and
//! reference attributes embedded in narrative markup. This keeps the
//! visitor exhaustive without an open-ended reflection pass.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::Result;

lazy_static! {
    /// `href`/`src` attributes in narrative xhtml. Anything this does not
    /// match is left exactly as it was.
    static ref NARRATIVE_ATTR: Regex =
        Regex::new(r#"(?:href|src)\s*=\s*"([^"]*)""#).expect("narrative attribute pattern");
}

/// The kinds of reference-bearing elements a payload can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// A typed reference element: an object with a string `reference` member.
    Reference,
    /// A bare URI-valued member (`url`, `uri`, `fullUrl`).
    Uri,
    /// An `href`/`src` attribute inside narrative markup (`div`).
    Narrative,
}

const URI_MEMBERS: [&str; 3] = ["url", "uri", "fullUrl"];

/// Visit every reference occurrence in `value`, replacing an occurrence
/// whenever the callback returns `Some`. Errors from the callback abort
/// the walk; malformed narrative markup never does.
pub fn visit_references<F>(value: &mut JsonValue, f: &mut F) -> Result<()>
where
    F: FnMut(RefKind, &str) -> Result<Option<String>>,
{
    match value {
        JsonValue::Object(map) => {
            for (member, child) in map.iter_mut() {
                match child {
                    JsonValue::String(s) if member == "reference" => {
                        if let Some(updated) = f(RefKind::Reference, s)? {
                            *s = updated;
                        }
                    }
                    JsonValue::String(s) if URI_MEMBERS.contains(&member.as_str()) => {
                        if let Some(updated) = f(RefKind::Uri, s)? {
                            *s = updated;
                        }
                    }
                    JsonValue::String(s) if member == "div" => {
                        if let Some(updated) = rewrite_narrative(s, f)? {
                            *s = updated;
                        }
                    }
                    _ => visit_references(child, f)?,
                }
            }
        }
        JsonValue::Array(items) => {
            for item in items.iter_mut() {
                visit_references(item, f)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Rewrite `href`/`src` attribute values in a narrative blob. Markup the
/// pattern cannot make sense of is returned unchanged.
fn rewrite_narrative<F>(div: &str, f: &mut F) -> Result<Option<String>>
where
    F: FnMut(RefKind, &str) -> Result<Option<String>>,
{
    let mut out = String::with_capacity(div.len());
    let mut last = 0;
    let mut changed = false;

    for caps in NARRATIVE_ATTR.captures_iter(div) {
        let Some(attr) = caps.get(1) else { continue };
        if let Some(replacement) = f(RefKind::Narrative, attr.as_str())? {
            out.push_str(&div[last..attr.start()]);
            out.push_str(&replacement);
            last = attr.end();
            changed = true;
        }
    }

    if !changed {
        return Ok(None);
    }
    out.push_str(&div[last..]);
    Ok(Some(out))
}
