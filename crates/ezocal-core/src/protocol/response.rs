//! Response line helpers
//!
//! A response is the ordered list of lines collected after the settle delay.
//! An empty list is a legitimate "no data" outcome, so callers that need a
//! value go through these helpers to turn absence into an error explicitly.

use super::ProtocolError;

/// Markers EZO firmware and gateways use to report a failed command
const ERROR_MARKERS: &[&str] = &["*ER", "*OV", "*UV"];

/// First line of a response, or [`ProtocolError::Timeout`] when nothing arrived
pub fn first_line(lines: &[String]) -> Result<&str, ProtocolError> {
    lines
        .iter()
        .map(|l| l.as_str())
        .find(|l| !l.is_empty())
        .ok_or(ProtocolError::Timeout)
}

/// Parse a reading line as a number.
///
/// Multi-value probes (e.g. HUM) answer with comma-separated fields; the
/// first field is the primary reading.
pub fn parse_value(line: &str) -> Result<f64, ProtocolError> {
    let field = line.split(',').next().unwrap_or("").trim();
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ProtocolError::InvalidResponse(line.to_string())),
    }
}

/// Whether a line looks like an error report rather than data or an ack
pub fn looks_like_error(line: &str) -> bool {
    let trimmed = line.trim();
    if ERROR_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
        return true;
    }
    let lower = trimmed.to_ascii_lowercase();
    lower.contains("error") || lower.contains("fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line_empty_is_timeout() {
        assert!(matches!(first_line(&[]), Err(ProtocolError::Timeout)));
        assert!(matches!(
            first_line(&["".to_string()]),
            Err(ProtocolError::Timeout)
        ));
    }

    #[test]
    fn test_first_line() {
        let lines = vec!["7.012".to_string(), "*OK".to_string()];
        assert_eq!(first_line(&lines).unwrap(), "7.012");
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("7.012").unwrap(), 7.012);
        assert_eq!(parse_value("-12.5").unwrap(), -12.5);
        assert_eq!(parse_value("45.2,23.1").unwrap(), 45.2);
        assert!(parse_value("*ER").is_err());
        assert!(parse_value("").is_err());
        assert!(parse_value("NaN").is_err());
    }

    #[test]
    fn test_error_markers() {
        assert!(looks_like_error("*ER"));
        assert!(looks_like_error("*OV"));
        assert!(looks_like_error("Calibration failed"));
        assert!(!looks_like_error("*OK"));
        assert!(!looks_like_error("7.00"));
    }
}
