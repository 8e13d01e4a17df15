//! Status classification -- maps raw outcome fields to a display status.
//!
//! Three input shapes (tri-state flag, build outcome, test outcome) all fold
//! into the single [`Status`] enum so the rest of the pipeline never looks at
//! raw fields again.

use serde::{Deserialize, Serialize};

use super::record::{BuildOutcome, PlatformBuildResult, TestOutcome};

/// Semantic state of one dashboard slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
    Skipped,
    Warning,
}

/// A classified outcome: the status plus its human-readable result string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classified {
    pub status: Status,
    pub text: String,
}

impl Classified {
    fn new(status: Status, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
        }
    }
}

/// Tri-state flag: succeeded / failed / not attempted.
pub fn classify_flag(value: Option<bool>) -> Status {
    match value {
        Some(true) => Status::Success,
        Some(false) => Status::Error,
        None => Status::Skipped,
    }
}

/// Packaging outcome from the tri-state flag.
pub fn classify_packaging(value: Option<bool>) -> Classified {
    let text = match value {
        Some(true) => "Success",
        Some(false) => "Failed",
        None => "Skipped",
    };
    Classified::new(classify_flag(value), text)
}

/// Compilation outcome. Warnings annotate the text but a successful build
/// stays `Success` no matter how many warnings it produced; a record without
/// a warning count renders plain `Success`.
pub fn classify_build(entry: Option<&BuildOutcome>) -> Classified {
    match entry {
        None => Classified::new(Status::Skipped, "-"),
        Some(b) if b.build_success => {
            let text = match b.build_warnings {
                Some(n) => format!("Success, {} warnings", n),
                None => "Success".to_string(),
            };
            Classified::new(Status::Success, text)
        }
        Some(_) => Classified::new(Status::Error, "Failed"),
    }
}

/// Weekly per-preset build: success/failure only, no warning counts.
pub fn classify_platform_build(entry: Option<&PlatformBuildResult>) -> Classified {
    match entry {
        None => Classified::new(Status::Skipped, "-"),
        Some(r) if r.success => Classified::new(Status::Success, "Success"),
        Some(_) => Classified::new(Status::Error, "Failed"),
    }
}

/// Test suite outcome.
///
/// Crash and timeout trump everything, an empty suite is skipped, otherwise
/// the pass count decides: all passed is `Success`, none passed is `Error`,
/// a partial pass is `Warning`.
pub fn classify_tests(tests: Option<&TestOutcome>) -> Classified {
    let Some(t) = tests else {
        return Classified::new(Status::Skipped, "Skipped");
    };

    if t.critical_errors {
        return Classified::new(Status::Error, "Crash");
    }
    if t.tests_timed_out {
        return Classified::new(Status::Error, "Timed Out");
    }
    if t.results.is_empty() {
        return Classified::new(Status::Skipped, "Skipped");
    }

    let total = t.results.len();
    let passed = t.results.iter().filter(|r| r.passed).count();
    let status = if passed == total {
        Status::Success
    } else if passed == 0 {
        Status::Error
    } else {
        Status::Warning
    };

    Classified::new(status, format!("{}/{} passed", passed, total))
}
