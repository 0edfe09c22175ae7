//! Event normalizer
//!
//! Converts an arbitrary SDK event payload into the canonical exception
//! shape. This transform is deliberately lossy: producers vary wildly, so
//! unrecognized values degrade to defaults instead of failing the job.

use faultline_entities::exceptions::StackFrame;
use faultline_entities::types::{Environment, HttpMethod, Platform};
use serde_json::Value;

/// HTTP request context extracted from an event payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpContext {
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub status: Option<String>,
    pub status_code: Option<i32>,
    pub client_ip: Option<String>,
    pub response_body: Option<String>,
}

/// Canonical exception record produced by `normalize`.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedEvent {
    pub environment: Environment,
    pub platform: Option<Platform>,
    pub name: String,
    pub message: String,
    pub details: Option<String>,
    pub frames: Vec<StackFrame>,
    pub stack_trace: Option<String>,
    pub http: Option<HttpContext>,
}

/// Normalize a raw SDK payload. Never fails; every field has a fallback.
pub fn normalize(payload: &Value) -> NormalizedEvent {
    let environment = payload
        .get("environment")
        .and_then(Value::as_str)
        .and_then(Environment::from_sdk_value)
        .unwrap_or(Environment::Production);

    let platform = payload
        .get("platform")
        .and_then(Value::as_str)
        .and_then(Platform::from_sdk_value);

    let primary_exception = primary_exception(payload);

    let name = primary_exception
        .and_then(|exc| exc.get("type"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("Error")
        .to_string();

    let message = extract_message(payload, primary_exception);
    let details = extract_details(payload);

    let frames = primary_exception
        .and_then(|exc| exc.get("stacktrace"))
        .and_then(|st| st.get("frames"))
        .and_then(Value::as_array)
        .map(|raw| extract_frames(raw))
        .unwrap_or_default();

    let stack_trace = if frames.is_empty() {
        None
    } else {
        Some(render_stack_trace(&frames))
    };

    let http = extract_http_context(payload);

    NormalizedEvent {
        environment,
        platform,
        name,
        message,
        details,
        frames,
        stack_trace,
        http,
    }
}

/// First entry of `exception.values`, tolerating `exception` being the array
/// itself (older SDKs).
fn primary_exception(payload: &Value) -> Option<&Value> {
    let exception = payload.get("exception")?;
    match exception {
        Value::Array(values) => values.first(),
        Value::Object(_) => exception.get("values").and_then(Value::as_array)?.first(),
        _ => None,
    }
}

/// Message precedence: primary exception value, top-level message string,
/// formatted message object, formatted log entry. Defaults to
/// "Unknown error".
fn extract_message(payload: &Value, primary_exception: Option<&Value>) -> String {
    let from_exception = primary_exception
        .and_then(|exc| exc.get("value"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    if let Some(message) = from_exception {
        return message.to_string();
    }

    match payload.get("message") {
        Some(Value::String(message)) if !message.is_empty() => return message.clone(),
        Some(Value::Object(map)) => {
            if let Some(formatted) = map.get("formatted").and_then(Value::as_str) {
                if !formatted.is_empty() {
                    return formatted.to_string();
                }
            }
        }
        _ => {}
    }

    if let Some(formatted) = payload
        .get("logentry")
        .and_then(|entry| entry.get("formatted"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        return formatted.to_string();
    }

    "Unknown error".to_string()
}

fn extract_details(payload: &Value) -> Option<String> {
    if let Some(formatted) = payload
        .get("logentry")
        .and_then(|entry| entry.get("formatted"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        return Some(formatted.to_string());
    }

    payload
        .get("extra")
        .filter(|extra| extra.is_object() && !extra.as_object().is_some_and(|m| m.is_empty()))
        .and_then(|extra| serde_json::to_string(extra).ok())
}

fn extract_frames(raw_frames: &[Value]) -> Vec<StackFrame> {
    raw_frames
        .iter()
        .enumerate()
        .map(|(index, frame)| StackFrame {
            index: index as i32,
            function: frame
                .get("function")
                .and_then(Value::as_str)
                .map(str::to_string),
            filename: frame
                .get("filename")
                .and_then(Value::as_str)
                .map(str::to_string),
            abs_path: frame
                .get("abs_path")
                .and_then(Value::as_str)
                .map(str::to_string),
            module: frame
                .get("module")
                .and_then(Value::as_str)
                .map(str::to_string),
            lineno: frame.get("lineno").and_then(Value::as_i64),
            colno: frame.get("colno").and_then(Value::as_i64),
            in_app: frame.get("in_app").and_then(Value::as_bool),
            platform: frame
                .get("platform")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
        .collect()
}

/// Render frames into a plain-text trace, one line per frame:
/// `    at <function> (<location>[:line][:column])`
fn render_stack_trace(frames: &[StackFrame]) -> String {
    frames
        .iter()
        .map(|frame| {
            let function = frame.function.as_deref().unwrap_or("<anonymous>");
            let location = frame
                .filename
                .as_deref()
                .or(frame.abs_path.as_deref())
                .or(frame.module.as_deref())
                .unwrap_or("<unknown>");

            let mut line = format!("    at {} ({}", function, location);
            if let Some(lineno) = frame.lineno {
                line.push_str(&format!(":{}", lineno));
                if let Some(colno) = frame.colno {
                    line.push_str(&format!(":{}", colno));
                }
            }
            line.push(')');
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Derive the HTTP context from the `request` sub-object. Omitted entirely
/// when neither method nor url can be resolved.
fn extract_http_context(payload: &Value) -> Option<HttpContext> {
    let request = payload.get("request");

    let url = request
        .and_then(|r| r.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let method = request
        .and_then(|r| r.get("method"))
        .and_then(Value::as_str)
        .and_then(HttpMethod::from_sdk_value);

    if url.is_none() && method.is_none() {
        return None;
    }

    let response = payload
        .get("contexts")
        .and_then(|contexts| contexts.get("response"));

    let status_code = response
        .and_then(|r| r.get("status_code"))
        .and_then(Value::as_i64)
        .map(|code| code as i32);

    let status = response
        .and_then(|r| r.get("status"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let response_body = response.and_then(|r| r.get("data")).and_then(|data| {
        if let Some(s) = data.as_str() {
            Some(s.to_string())
        } else {
            serde_json::to_string(data).ok()
        }
    });

    let client_ip = extract_client_ip(payload, request);

    Some(HttpContext {
        url,
        method,
        status,
        status_code,
        client_ip,
        response_body,
    })
}

/// Client IP precedence: explicit user IP, first forwarded-for entry, then
/// the remote address from the request env.
fn extract_client_ip(payload: &Value, request: Option<&Value>) -> Option<String> {
    if let Some(ip) = payload
        .get("user")
        .and_then(|user| user.get("ip_address"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        return Some(ip.to_string());
    }

    if let Some(forwarded) = request
        .and_then(|r| r.get("headers"))
        .and_then(header_lookup)
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }

    request
        .and_then(|r| r.get("env"))
        .and_then(|env| env.get("REMOTE_ADDR"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Find `X-Forwarded-For` case-insensitively in a headers map or an array of
/// `[name, value]` pairs.
fn header_lookup(headers: &Value) -> Option<&str> {
    match headers {
        Value::Object(map) => map
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("x-forwarded-for"))
            .and_then(|(_, value)| value.as_str()),
        Value::Array(pairs) => pairs.iter().find_map(|pair| {
            let pair = pair.as_array()?;
            let name = pair.first()?.as_str()?;
            if name.eq_ignore_ascii_case("x-forwarded-for") {
                pair.get(1)?.as_str()
            } else {
                None
            }
        }),
        _ => None,
    }
}
