//! 裁剪区间：时间表达式解析（`SS` / `MM:SS` / `HH:MM:SS`）。

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time expression '{input}' for {field}: expected SS, MM:SS or HH:MM:SS")]
pub struct TimeExprError {
    pub field: &'static str,
    pub input: String,
}

/// Parse a time expression into absolute seconds. Components must be plain
/// unsigned integers; they are not range-checked (`"1:75"` is 135s).
pub fn parse_time_expr(input: &str) -> Option<u64> {
    let parts: Vec<&str> = input.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut total: u64 = 0;
    for part in parts {
        let part = part.trim();
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: u64 = part.parse().ok()?;
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    Some(total)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl TrimRange {
    /// Build from the raw request fields. Blank strings count as absent;
    /// `Ok(None)` means no trimming was requested.
    pub fn from_request(
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Option<Self>, TimeExprError> {
        let start = parse_field("trim_start", start)?;
        let end = parse_field("trim_end", end)?;
        if start.is_none() && end.is_none() {
            return Ok(None);
        }
        Ok(Some(Self { start, end }))
    }

    pub fn is_ordered(&self) -> bool {
        match (self.start, self.end) {
            (Some(s), Some(e)) => s < e,
            _ => true,
        }
    }

    /// Section spec understood by the extractor's `--download-sections`.
    pub fn section_spec(&self) -> String {
        let start = self.start.unwrap_or(0);
        match self.end {
            Some(end) => format!("*{start}-{end}"),
            None => format!("*{start}-inf"),
        }
    }
}

fn parse_field(field: &'static str, raw: Option<&str>) -> Result<Option<u64>, TimeExprError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    parse_time_expr(raw).map(Some).ok_or_else(|| TimeExprError {
        field,
        input: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_forms() {
        assert_eq!(parse_time_expr("90"), Some(90));
        assert_eq!(parse_time_expr("1:30"), Some(90));
        assert_eq!(parse_time_expr("1:01:30"), Some(3690));
        assert_eq!(parse_time_expr(" 00:05 "), Some(5));
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", "abc", "1:x", "1::2", "1:2:3:4", "-5", "1.5", "+3", ":30"] {
            assert_eq!(parse_time_expr(bad), None, "{bad:?} should be rejected");
        }
    }

    #[test]
    fn range_from_request() {
        assert_eq!(TrimRange::from_request(None, Some("  ")).unwrap(), None);

        let r = TrimRange::from_request(Some("1:30"), None).unwrap().unwrap();
        assert_eq!(r.section_spec(), "*90-inf");

        let r = TrimRange::from_request(None, Some("2:00")).unwrap().unwrap();
        assert_eq!(r.section_spec(), "*0-120");

        let r = TrimRange::from_request(Some("10"), Some("20")).unwrap().unwrap();
        assert_eq!(r.section_spec(), "*10-20");
        assert!(r.is_ordered());

        let r = TrimRange::from_request(Some("30"), Some("20")).unwrap().unwrap();
        assert!(!r.is_ordered());
    }

    #[test]
    fn error_names_the_field() {
        let err = TrimRange::from_request(Some("10"), Some("soon")).unwrap_err();
        assert_eq!(err.field, "trim_end");
        assert!(err.to_string().contains("trim_end"));
    }
}
