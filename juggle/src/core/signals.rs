//! Parse agent output into [`AgentResult`] signals.
//!
//! The agent ends its turn with one of:
//!
//! - `<promise>COMPLETE</promise>`
//! - `<promise>CONTINUE</promise>`
//! - `<promise>BLOCKED: reason</promise>`
//!
//! Rate limits are only recognized when the process failed, so an agent that
//! merely talks about HTTP 429 in its output is not mistaken for one.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::core::types::AgentResult;

static PROMISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<promise>\s*(COMPLETE|CONTINUE|BLOCKED)\s*(?::\s*(.*?))?\s*</promise>")
        .unwrap()
});

static RATE_LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(rate[ _-]?limit|too many requests|\b429\b|usage limit|overloaded)").unwrap()
});

static RETRY_AFTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:retry[ _-]?after|try again in)[:=\s]*(\d+)\s*(seconds?|secs?|s|minutes?|mins?|m|hours?|h)?\b",
    )
    .unwrap()
});

/// Build an [`AgentResult`] from captured output.
///
/// `exit_ok` is whether the agent process exited successfully.
pub fn parse_agent_output(output: &str, exit_ok: bool, timed_out: bool) -> AgentResult {
    let mut result = AgentResult {
        output: output.to_string(),
        timed_out,
        ..AgentResult::default()
    };

    if !exit_ok && !timed_out && RATE_LIMIT_RE.is_match(output) {
        result.rate_limited = true;
        result.retry_after = parse_retry_after(output);
        return result;
    }

    // The last promise wins; earlier ones are often quoted instructions.
    if let Some(caps) = PROMISE_RE.captures_iter(output).last() {
        match &caps[1] {
            "COMPLETE" => result.complete = true,
            "CONTINUE" => result.continue_ = true,
            _ => {
                result.blocked = true;
                result.blocked_reason = caps
                    .get(2)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
            }
        }
    }
    result
}

/// Extract a retry-after hint such as `retry after 30s` or `try again in 5 minutes`.
pub fn parse_retry_after(output: &str) -> Option<Duration> {
    let caps = RETRY_AFTER_RE.captures(output)?;
    let amount: u64 = caps[1].parse().ok()?;
    let unit = caps
        .get(2)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    let secs = if unit.starts_with('h') {
        amount.saturating_mul(3600)
    } else if unit.starts_with('m') {
        amount.saturating_mul(60)
    } else {
        amount
    };
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_promise() {
        let result = parse_agent_output("done\n<promise>COMPLETE</promise>\n", true, false);
        assert!(result.complete);
        assert!(!result.rate_limited);
    }

    #[test]
    fn parses_blocked_reason() {
        let result = parse_agent_output(
            "<promise>BLOCKED: missing DATABASE_URL</promise>",
            true,
            false,
        );
        assert!(result.blocked);
        assert_eq!(result.blocked_reason, "missing DATABASE_URL");
    }

    #[test]
    fn last_promise_wins() {
        let out = "reply with <promise>COMPLETE</promise> when done\n...\n<promise>CONTINUE</promise>";
        let result = parse_agent_output(out, true, false);
        assert!(result.continue_);
        assert!(!result.complete);
    }

    #[test]
    fn rate_limit_requires_failed_exit() {
        let text = "Error: rate limit exceeded, retry after 120 seconds";
        assert!(!parse_agent_output(text, true, false).rate_limited);

        let result = parse_agent_output(text, false, false);
        assert!(result.rate_limited);
        assert_eq!(result.retry_after, Some(Duration::from_secs(120)));
    }

    #[test]
    fn rate_limit_without_hint() {
        let result = parse_agent_output("429 Too Many Requests", false, false);
        assert!(result.rate_limited);
        assert_eq!(result.retry_after, None);
    }

    #[test]
    fn retry_hint_units() {
        assert_eq!(
            parse_retry_after("try again in 5 minutes"),
            Some(Duration::from_secs(300))
        );
        assert_eq!(
            parse_retry_after("Retry-After: 17"),
            Some(Duration::from_secs(17))
        );
        assert_eq!(parse_retry_after("nothing here"), None);
    }

    #[test]
    fn timeout_is_passed_through() {
        let result = parse_agent_output("partial", false, true);
        assert!(result.timed_out);
        assert!(!result.rate_limited);
    }
}
