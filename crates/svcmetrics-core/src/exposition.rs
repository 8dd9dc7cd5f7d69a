//! Prometheus text exposition (format 0.0.4).
//!
//! Families render in name order; labels keep each sample's own insertion
//! order, so identical input always yields identical bytes. Each family is
//! rendered into a private buffer and validated first: a malformed family is
//! logged and dropped without leaving half a family in the output.

use std::fmt::Write as _;
use std::io;

use crate::model::{Families, MetricFamily, Sample};

/// Content type for the rendered body.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Group flat samples into families keyed by metric name.
pub fn group_into_families(samples: impl IntoIterator<Item = Sample>) -> Families {
    let mut families = Families::new();
    for sample in samples {
        families
            .entry(sample.metric_name.clone())
            .or_insert_with(|| MetricFamily::gauge(sample.metric_name.clone()))
            .samples
            .push(sample);
    }
    families
}

/// Render every family into `out`, returning the number of bytes written.
///
/// Never fails as a whole: bad families and sink errors are logged and skipped.
pub fn render<W: io::Write>(families: &Families, out: &mut W) -> usize {
    let mut written = 0;
    for (name, family) in families {
        let text = match render_family(family) {
            Ok(text) => text,
            Err(reason) => {
                tracing::error!(family = %name, %reason, "skipping malformed metric family");
                continue;
            }
        };
        match out.write_all(text.as_bytes()) {
            Ok(()) => written += text.len(),
            Err(e) => {
                tracing::error!(family = %name, error = %e, "failed to write metric family");
            }
        }
    }
    written
}

/// Render into a fresh string (convenience for tests and small bodies).
pub fn render_to_string(families: &Families) -> String {
    let mut buf = Vec::new();
    render(families, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn render_family(family: &MetricFamily) -> Result<String, String> {
    let name = family.name.as_str();
    if !is_valid_metric_name(name) {
        return Err(format!("invalid metric name {name:?}"));
    }

    let mut out = String::new();
    let _ = writeln!(out, "# HELP {name}");
    let _ = writeln!(out, "# TYPE {name} {}", family.kind.as_str());

    for sample in &family.samples {
        if sample.metric_name != name {
            return Err(format!(
                "sample named {:?} inside family {name:?}",
                sample.metric_name
            ));
        }
        let Some(value) = sample.value else { continue };

        let mut labels = Vec::with_capacity(sample.labels.len());
        for (k, v) in sample.labels.iter() {
            if !is_valid_label_name(k) {
                return Err(format!("invalid label name {k:?}"));
            }
            labels.push(format!("{k}=\"{}\"", escape_label(v)));
        }

        let _ = write!(out, "{name}{{{}}} {}", labels.join(","), format_value(value));
        if let Some(ts) = sample.timestamp {
            let _ = write!(out, " {}", ts.timestamp_millis());
        }
        out.push('\n');
    }
    Ok(out)
}

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".into()
    } else if v.is_infinite() {
        if v > 0.0 { "+Inf".into() } else { "-Inf".into() }
    } else {
        format!("{v}")
    }
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
