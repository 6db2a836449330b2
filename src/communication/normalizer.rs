//! Rewrites firmware dialect replies into the vocabulary the rest of the
//! host parses.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

const BUSY_REPLY: &str = "echo:busy processing";
const POSITION_LABEL: &str = "C: ";

/// Kind of rewrite applied to a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rewrite {
    Busy,
    Identifier,
    Position,
    Start,
}

impl fmt::Display for Rewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rewrite::Busy => "wait",
            Rewrite::Identifier => "identifier",
            Rewrite::Position => "M114",
            Rewrite::Start => "start",
        };
        f.write_str(name)
    }
}

/// Apply every rewrite category in order and report which ones fired.
pub fn normalize(raw: &str, default_version: &str) -> (String, Vec<Rewrite>) {
    let mut applied = Vec::new();

    if raw.starts_with("wait") {
        applied.push(Rewrite::Busy);
        return (BUSY_REPLY.to_string(), applied);
    }

    let mut text = raw.to_string();

    for dialect in ["CBD", "ZWLF"] {
        let needle = format!("{dialect} make it");
        if text.contains(&needle) {
            let canonical =
                format!("FIRMWARE_NAME:{dialect} made it PROTOCOL_VERSION:{default_version}");
            text = text.replace(&needle, &canonical);
            applied.push(Rewrite::Identifier);
            break;
        }
    }

    if text.contains("C: X:") {
        text = text.replace(POSITION_LABEL, "");
        applied.push(Rewrite::Position);
    }

    if text.starts_with("ok V") {
        text = format!("ok start{text}");
        applied.push(Rewrite::Start);
    }

    (text, applied)
}

/// Stateful wrapper over [`normalize`] that logs each rewrite kind loudly
/// once and quietly afterwards.
#[derive(Debug)]
pub struct ResponseNormalizer {
    default_version: String,
    logged: Mutex<HashSet<Rewrite>>,
}

impl ResponseNormalizer {
    pub fn new(default_version: impl Into<String>) -> Self {
        Self {
            default_version: default_version.into(),
            logged: Mutex::new(HashSet::new()),
        }
    }

    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    pub fn normalize(&self, raw: &str) -> String {
        let (fixed, applied) = normalize(raw, &self.default_version);
        if !applied.is_empty() {
            let mut logged = self.logged.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            for kind in applied {
                if logged.insert(kind) {
                    tracing::info!("Replacing {}: '{}' -> '{}'", kind, raw, fixed);
                } else {
                    tracing::debug!("Replacing {}: '{}' -> '{}'", kind, raw, fixed);
                }
            }
        }
        fixed
    }
}
