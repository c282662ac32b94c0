//! Captured console output.
//!
//! The live run prints `Started run with ID "<n>"` before its final id is
//! known. Only the first such marker is rewritten to the stored id.

use regex::{NoExpand, Regex};
use runvault_common::RunId;
use std::borrow::Cow;
use std::sync::LazyLock;

static RUN_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Started run with ID "\d+""#).expect("run marker pattern is valid")
});

/// Rewrite the first run-id marker in `captured` to carry `id`
#[must_use]
pub fn rewrite_run_marker(captured: &str, id: RunId) -> Cow<'_, str> {
    let marker = format!("Started run with ID \"{id}\"");
    RUN_MARKER.replacen(captured, 1, NoExpand(&marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_first_marker_only() {
        let captured = "Started run with ID \"999\"\nStarted run with ID \"999\" again";
        assert_eq!(
            rewrite_run_marker(captured, 7),
            "Started run with ID \"7\"\nStarted run with ID \"999\" again"
        );
    }

    #[test]
    fn test_marker_in_the_middle() {
        let captured = "INFO - mnist - Running command 'main'\nINFO - mnist - Started run with ID \"1\"\nloss=0.3\n";
        assert_eq!(
            rewrite_run_marker(captured, 42),
            "INFO - mnist - Running command 'main'\nINFO - mnist - Started run with ID \"42\"\nloss=0.3\n"
        );
    }

    #[test]
    fn test_no_marker_is_untouched() {
        let captured = "Started run with ID \"abc\"\nno id yet";
        assert!(matches!(rewrite_run_marker(captured, 3), Cow::Borrowed(_)));
        assert_eq!(rewrite_run_marker("", 3), "");
    }
}
