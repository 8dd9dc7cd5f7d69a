//! Reader for the Prometheus text format (0.0.4, and the OpenMetrics subset
//! that shares its line syntax).
//!
//! Only gauges are kept: a sample survives when a `# TYPE <name> gauge` line
//! names it exactly. Counters, histograms, summaries and untyped samples are
//! skipped. Scrape timestamps are dropped.

use std::collections::HashMap;

use crate::error::{Result, SvcMetricsError};
use crate::model::{Labels, Sample};

/// Parse an exposition body into gauge samples, in input order.
pub fn parse_gauges(text: &str) -> Result<Vec<Sample>> {
    let mut types: HashMap<&str, &str> = HashMap::new();
    let mut out = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            let mut parts = comment.split_whitespace();
            match parts.next() {
                Some("TYPE") => {
                    let (Some(name), Some(kind)) = (parts.next(), parts.next()) else {
                        return Err(malformed(idx, "TYPE line needs a name and a type"));
                    };
                    types.insert(name, kind);
                }
                Some("EOF") => break,
                _ => {}
            }
            continue;
        }

        let (name, labels, value) = parse_sample(line).map_err(|reason| malformed(idx, reason))?;
        if types.get(name) == Some(&"gauge") {
            out.push(Sample::gauge(name, labels, Some(value)));
        }
    }
    Ok(out)
}

fn malformed(idx: usize, reason: impl Into<String>) -> SvcMetricsError {
    SvcMetricsError::MalformedExposition {
        line: idx + 1,
        reason: reason.into(),
    }
}

fn parse_sample(line: &str) -> std::result::Result<(&str, Labels, f64), String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .ok_or("sample has no value")?;
    let name = &line[..name_end];
    if name.is_empty() {
        return Err("sample has no name".into());
    }

    let mut rest = &line[name_end..];
    let mut labels = Labels::new();
    if let Some(body) = rest.strip_prefix('{') {
        let (parsed, after) = parse_labels(body)?;
        labels = parsed;
        rest = after;
    }

    let value = rest
        .split_whitespace()
        .next()
        .ok_or("sample has no value")?;
    Ok((name, labels, parse_value(value)?))
}

/// Parses `a="x",b="y"}` and returns the labels plus whatever follows `}`.
fn parse_labels(mut s: &str) -> std::result::Result<(Labels, &str), String> {
    let mut labels = Labels::new();
    loop {
        s = s.trim_start();
        if let Some(after) = s.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = s.find('=').ok_or("label without '='")?;
        let name = s[..eq].trim();
        if name.is_empty() {
            return Err("empty label name".into());
        }
        s = s[eq + 1..].trim_start();
        s = s.strip_prefix('"').ok_or("label value must be quoted")?;

        let mut value = String::new();
        let mut chars = s.char_indices();
        let close = loop {
            match chars.next() {
                Some((i, '"')) => break i,
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, c)) => value.push(c),
                    None => return Err("dangling escape in label value".into()),
                },
                Some((_, c)) => value.push(c),
                None => return Err("unterminated label value".into()),
            }
        };
        labels.insert(name, value);

        s = s[close + 1..].trim_start();
        if let Some(after) = s.strip_prefix(',') {
            s = after;
        } else if !s.starts_with('}') {
            return Err("expected ',' or '}' after label value".into());
        }
    }
}

fn parse_value(token: &str) -> std::result::Result<f64, String> {
    match token {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        other => other
            .parse()
            .map_err(|_| format!("invalid sample value {other:?}")),
    }
}
