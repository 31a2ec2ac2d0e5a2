//! Diagnostic report lines
//!
//! A report is framed by `DIAG:START` and `DIAG:END`. Each test in between
//! emits `TEST:<name>:<STATUS>:<detail>`. The detail is free text and may
//! itself contain colons, so readers split into at most four fields.

use core::fmt::{self, Write};

use heapless::String;

use crate::command::truncate;

pub const DIAG_START: &str = "DIAG:START";
pub const DIAG_END: &str = "DIAG:END";
pub const TEST_TAG: &str = "TEST";

pub const MAX_TEST_NAME_LEN: usize = 24;
pub const MAX_DETAIL_LEN: usize = 64;

/// Longest formatted `TEST:` line
pub const MAX_REPORT_LINE_LEN: usize = TEST_TAG.len() + MAX_TEST_NAME_LEN + 4 + MAX_DETAIL_LEN + 3;

/// Outcome of a single diagnostic test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiagStatus {
    Pass,
    Fail,
    Warn,
    Info,
}

impl DiagStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagStatus::Pass => "PASS",
            DiagStatus::Fail => "FAIL",
            DiagStatus::Warn => "WARN",
            DiagStatus::Info => "INFO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PASS" => Some(DiagStatus::Pass),
            "FAIL" => Some(DiagStatus::Fail),
            "WARN" => Some(DiagStatus::Warn),
            "INFO" => Some(DiagStatus::Info),
            _ => None,
        }
    }
}

/// Errors from reading a `TEST:` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportError {
    /// Line does not start with `TEST:`
    NotATestLine,
    /// Fewer than four colon-separated fields
    MissingField,
    /// Status is not PASS, FAIL, WARN or INFO
    UnknownStatus,
}

/// One test result
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiagnosticEntry {
    pub test_name: String<MAX_TEST_NAME_LEN>,
    pub status: DiagStatus,
    pub detail: String<MAX_DETAIL_LEN>,
}

impl DiagnosticEntry {
    /// Create an entry, truncating name and detail to fit
    ///
    /// Colons in the name are replaced with `_` since the name is a field.
    pub fn new(test_name: &str, status: DiagStatus, detail: &str) -> Self {
        let mut name = String::new();
        for c in test_name.chars() {
            let c = if c == ':' { '_' } else { c };
            if name.push(c).is_err() {
                break;
            }
        }
        Self {
            test_name: name,
            status,
            detail: truncate(detail),
        }
    }

    /// Format as a `TEST:` line without terminator
    pub fn to_line(&self) -> String<MAX_REPORT_LINE_LEN> {
        let mut line = String::new();
        let _ = write!(line, "{}", self);
        line
    }

    /// Parse a `TEST:` line
    pub fn parse(line: &str) -> Result<Self, ReportError> {
        let mut fields = line.trim_end().splitn(4, ':');
        if fields.next() != Some(TEST_TAG) {
            return Err(ReportError::NotATestLine);
        }
        let name = fields.next().ok_or(ReportError::MissingField)?;
        let status = fields.next().ok_or(ReportError::MissingField)?;
        let detail = fields.next().ok_or(ReportError::MissingField)?;
        let status = DiagStatus::parse(status).ok_or(ReportError::UnknownStatus)?;
        Ok(Self::new(name, status, detail))
    }
}

impl fmt::Display for DiagnosticEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            TEST_TAG,
            self.test_name,
            self.status.as_str(),
            self.detail
        )
    }
}

/// Classification of a line read from a report stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine {
    Start,
    End,
    Entry(DiagnosticEntry),
    /// Anything else (status chatter, malformed lines)
    Other,
}

impl ReportLine {
    pub fn classify(line: &str) -> Self {
        let line = line.trim();
        if line == DIAG_START {
            ReportLine::Start
        } else if line == DIAG_END {
            ReportLine::End
        } else {
            match DiagnosticEntry::parse(line) {
                Ok(entry) => ReportLine::Entry(entry),
                Err(_) => ReportLine::Other,
            }
        }
    }
}

/// Overall outcome of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    AllPassed,
    Warnings,
    Failed,
}

/// Per-status counts for a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReportSummary {
    pub pass: u16,
    pub fail: u16,
    pub warn: u16,
    pub info: u16,
}

impl ReportSummary {
    pub fn record(&mut self, status: DiagStatus) {
        let slot = match status {
            DiagStatus::Pass => &mut self.pass,
            DiagStatus::Fail => &mut self.fail,
            DiagStatus::Warn => &mut self.warn,
            DiagStatus::Info => &mut self.info,
        };
        *slot = slot.saturating_add(1);
    }

    /// Any failure outranks any warning
    pub fn verdict(&self) -> Verdict {
        if self.fail > 0 {
            Verdict::Failed
        } else if self.warn > 0 {
            Verdict::Warnings
        } else {
            Verdict::AllPassed
        }
    }

    pub fn total(&self) -> u16 {
        self.pass
            .saturating_add(self.fail)
            .saturating_add(self.warn)
            .saturating_add(self.info)
    }
}

impl<'a> FromIterator<&'a DiagnosticEntry> for ReportSummary {
    fn from_iter<I: IntoIterator<Item = &'a DiagnosticEntry>>(iter: I) -> Self {
        let mut summary = ReportSummary::default();
        for entry in iter {
            summary.record(entry.status);
        }
        summary
    }
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pass, {} fail, {} warn, {} info",
            self.pass, self.fail, self.warn, self.info
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        let entry = DiagnosticEntry::new("pin_gpio16", DiagStatus::Fail, "stuck HIGH");
        assert_eq!(entry.to_line().as_str(), "TEST:pin_gpio16:FAIL:stuck HIGH");
    }

    #[test]
    fn test_detail_keeps_colons() {
        let entry = DiagnosticEntry::parse("TEST:board:INFO:rp2040: 125MHz").unwrap();
        assert_eq!(entry.test_name.as_str(), "board");
        assert_eq!(entry.status, DiagStatus::Info);
        assert_eq!(entry.detail.as_str(), "rp2040: 125MHz");
    }

    #[test]
    fn test_name_colons_are_replaced() {
        let entry = DiagnosticEntry::new("a:b", DiagStatus::Pass, "");
        assert_eq!(entry.to_line().as_str(), "TEST:a_b:PASS:");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            DiagnosticEntry::parse("STATUS:ready"),
            Err(ReportError::NotATestLine)
        );
        assert_eq!(
            DiagnosticEntry::parse("TEST:servo:PASS"),
            Err(ReportError::MissingField)
        );
        assert_eq!(
            DiagnosticEntry::parse("TEST:servo:MAYBE:x"),
            Err(ReportError::UnknownStatus)
        );
    }

    #[test]
    fn test_classify_stream() {
        assert_eq!(ReportLine::classify("DIAG:START\r"), ReportLine::Start);
        assert_eq!(ReportLine::classify("DIAG:END"), ReportLine::End);
        assert_eq!(ReportLine::classify("STATUS:boot"), ReportLine::Other);
        assert!(matches!(
            ReportLine::classify("TEST:x:WARN:y"),
            ReportLine::Entry(_)
        ));
    }

    #[test]
    fn test_summary_verdict() {
        let entries = [
            DiagnosticEntry::new("a", DiagStatus::Pass, ""),
            DiagnosticEntry::new("b", DiagStatus::Warn, ""),
            DiagnosticEntry::new("c", DiagStatus::Info, ""),
        ];
        let summary: ReportSummary = entries.iter().collect();
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.verdict(), Verdict::Warnings);

        let mut with_fail = summary;
        with_fail.record(DiagStatus::Fail);
        assert_eq!(with_fail.verdict(), Verdict::Failed);
        assert_eq!(ReportSummary::default().verdict(), Verdict::AllPassed);
    }
}
