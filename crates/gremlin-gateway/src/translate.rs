//! Turns engine and transport failures into user-facing messages.
//!
//! Engine statuses are the typed path. Some upstream errors only survive as
//! prose with a status block embedded in it; those are picked apart with
//! patterns as a best-effort fallback.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::Value;

use crate::error::GatewayError;
use crate::protocol::ResponseStatus;

/// A failure as shown to the caller.
///
/// `diagnostic` is advisory (stack traces, exception lists) and must not be
/// parsed further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedError {
    pub message: String,
    pub diagnostic: String,
}

static READ_LOOP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)E0502: error in read loop, error message '(.*)'\. statusCode")
        .expect("read loop pattern compiles")
});

static STATUS_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{code:(\d+) message:(.*) attributes:map\[(.*)\]\}")
        .expect("status block pattern compiles")
});

static RESPONSE_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)responseStatus=\{\d+ (.*) map\[(.*)\]\}")
        .expect("response status pattern compiles")
});

/// Translate any gateway error.
pub fn translate(err: &GatewayError) -> TranslatedError {
    match err {
        GatewayError::EngineQuery { status } => translate_status(status),
        GatewayError::PartialBatchFailure { source, .. } => translate(source),
        other => translate_text(&other.to_string()),
    }
}

/// Translate a structured engine status.
pub fn translate_status(status: &ResponseStatus) -> TranslatedError {
    if let Some(embedded) = extract_embedded(&status.message) {
        return embedded;
    }

    let message = if status.message.is_empty() {
        format!("gremlin server returned status {}", status.code)
    } else {
        status.message.clone()
    };

    TranslatedError {
        message,
        diagnostic: render_attributes(status),
    }
}

/// Translate free error text.
pub fn translate_text(raw: &str) -> TranslatedError {
    extract_embedded(raw).unwrap_or_else(|| TranslatedError {
        message: raw.to_string(),
        diagnostic: String::new(),
    })
}

fn extract_embedded(raw: &str) -> Option<TranslatedError> {
    if raw.split(':').next() == Some("E0502") {
        let mut message = READ_LOOP
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .unwrap_or(raw)
            .to_string();
        let mut diagnostic = String::new();

        if let Some(block) = STATUS_BLOCK.captures(&message) {
            let inner = block.get(2).map(|m| m.as_str()).unwrap_or_default();
            let attributes = block.get(3).map(|m| m.as_str()).unwrap_or_default();
            diagnostic = attributes.to_string();
            if !inner.is_empty() {
                message = unquote(inner).to_string();
            }
        }

        return Some(TranslatedError {
            message,
            diagnostic,
        });
    }

    let captures = RESPONSE_STATUS.captures(raw)?;
    let message = captures
        .get(1)
        .map(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .unwrap_or(raw);
    let diagnostic = captures.get(2).map(|m| m.as_str()).unwrap_or_default();

    Some(TranslatedError {
        message: unquote(message).to_string(),
        diagnostic: diagnostic.to_string(),
    })
}

fn unquote(s: &str) -> &str {
    let trimmed = s.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed)
}

/// Render status attributes as `key:value` pairs. A stack trace, when
/// present, is shown on its own.
fn render_attributes(status: &ResponseStatus) -> String {
    if let Some(Value::String(trace)) = status.attributes.get("stackTrace") {
        return trace.clone();
    }
    status
        .attributes
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{}:{}", k, s),
            other => format!("{}:{}", k, other),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
