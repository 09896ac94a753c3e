use anyhow::{Context, Result};
use std::path::Path;

/// Non-blank, non-comment lines with their 1-based line numbers.
fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parse newline-delimited RR intervals (seconds), ignoring blank/comment lines.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let out = data_lines(text)
        .map(|(line_no, line)| {
            line.parse::<f64>()
                .with_context(|| format!("line {} is not f64: {}", line_no, line))
        })
        .collect::<Result<Vec<_>>>()?;
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

/// Read a newline-delimited floating point series from disk.
pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_f64_series(&text)
}

/// Decode one hex payload such as `10 48 00 04` or `0x1048000400`.
pub fn parse_hex_payload(text: &str) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    hex::decode(&digits).with_context(|| format!("invalid hex payload: {}", text.trim()))
}

/// Parse a notification capture: one hex payload per line, blank/comment lines ignored.
pub fn parse_capture(text: &str) -> Result<Vec<Vec<u8>>> {
    data_lines(text)
        .map(|(line_no, line)| parse_hex_payload(line).with_context(|| format!("line {}", line_no)))
        .collect()
}

/// Read a notification capture from disk.
pub fn read_capture(path: &Path) -> Result<Vec<Vec<u8>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_capture(&text)
}
