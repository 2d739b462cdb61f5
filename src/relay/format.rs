//! Converts raw emulator output into a chat-safe reply.

use tracing::warn;

use crate::logging::targets;

/// Reply when the output is empty or only whitespace.
pub const NO_OUTPUT: &str = "[[script produced no output]]";

/// Reply when the output is not plain ASCII.
pub const UNDECODABLE_OUTPUT: &str = "[[could not process output]]";

/// Appended after the closing fence when output was cut.
pub const TRUNCATED_MARKER: &str = "[[Output was truncated]]";

/// Maximum number of output lines shown.
pub const MAX_REPLY_LINES: usize = 30;

/// Maximum number of output characters shown.
pub const MAX_REPLY_CHARS: usize = 1900;

const FENCE: &str = "```";

/// Three backticks with zero-width non-joiners between them, so emulator
/// output cannot close the surrounding code block.
const ESCAPED_FENCE: &str = "`\u{200C}`\u{200C}`";

/// A message ready to send back to the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    /// Output was cut by the line or length limit.
    pub truncated: bool,
}

impl Reply {
    fn sentinel(text: &str) -> Self {
        Self {
            content: text.to_string(),
            truncated: false,
        }
    }
}

/// Format combined emulator output as a fenced code block.
pub fn format_reply(output: &[u8]) -> Reply {
    let text = match std::str::from_utf8(output) {
        Ok(s) if s.is_ascii() => s,
        _ => {
            warn!(
                target: targets::BOBBIN,
                bytes = output.len(),
                "Emulator output is not ASCII, discarding"
            );
            return Reply::sentinel(UNDECODABLE_OUTPUT);
        }
    };

    if text.trim().is_empty() {
        return Reply::sentinel(NO_OUTPUT);
    }

    let mut body = text.replace(FENCE, ESCAPED_FENCE);
    let mut truncated = false;

    if body.matches('\n').count() > MAX_REPLY_LINES {
        truncated = true;
        body = body.split_inclusive('\n').take(MAX_REPLY_LINES).collect();
    }

    if body.chars().count() > MAX_REPLY_CHARS {
        truncated = true;
        let end = char_offset(&body, MAX_REPLY_CHARS);
        body.truncate(end);
        body.push('\n');
    }

    if !body.ends_with('\n') {
        body.push('\n');
    }

    let mut content = format!("{FENCE}\n{body}{FENCE}\n");
    if truncated {
        content.push_str(TRUNCATED_MARKER);
    }

    Reply { content, truncated }
}

/// Byte offset of the `n`th char, or the string length if shorter.
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lines of `reply` that open or close a code fence.
    fn fence_lines(reply: &str) -> usize {
        reply.lines().filter(|l| l.starts_with(FENCE)).count()
    }

    #[test]
    fn wraps_output_in_fence() {
        let reply = format_reply(b"HELLO\n\n");
        assert_eq!(reply.content, "```\nHELLO\n\n```\n");
        assert!(!reply.truncated);
    }

    #[test]
    fn closing_fence_on_its_own_line() {
        let reply = format_reply(b"out\n\nerr without newline");
        assert_eq!(reply.content, "```\nout\n\nerr without newline\n```\n");
        assert_eq!(fence_lines(&reply.content), 2);
    }

    #[test]
    fn empty_output_sentinel() {
        assert_eq!(format_reply(b"").content, NO_OUTPUT);
        assert_eq!(format_reply(b"\n").content, NO_OUTPUT);
        assert_eq!(format_reply(b"  \n\t\n ").content, NO_OUTPUT);
    }

    #[test]
    fn non_ascii_output_sentinel() {
        let reply = format_reply(&[b'O', b'K', 0xC3, 0xA9, b'\n']);
        assert_eq!(reply.content, UNDECODABLE_OUTPUT);
        assert!(!reply.truncated);

        assert_eq!(format_reply(&[0xFF, 0xFE]).content, UNDECODABLE_OUTPUT);
    }

    #[test]
    fn backticks_cannot_close_fence() {
        let reply = format_reply(b"```\nfoo\n```\nbar ``` baz\n");
        assert_eq!(fence_lines(&reply.content), 2);
        assert!(reply.content.starts_with("```\n"));
        assert!(reply.content.ends_with("\n```\n"));
        assert_eq!(reply.content.matches(FENCE).count(), 2);
    }

    #[test]
    fn long_backtick_run_escaped() {
        let reply = format_reply(b"``````\n");
        assert_eq!(reply.content.matches(FENCE).count(), 2);
        assert!(reply.content.contains(ESCAPED_FENCE));
    }

    #[test]
    fn forty_lines_truncated_to_thirty() {
        let output: String = (1..=40).map(|i| format!("line {i}\n")).collect();
        let reply = format_reply(output.as_bytes());

        assert!(reply.truncated);
        assert!(reply.content.ends_with(TRUNCATED_MARKER));
        let inner: Vec<&str> = reply
            .content
            .lines()
            .filter(|l| !l.starts_with(FENCE) && *l != TRUNCATED_MARKER)
            .collect();
        assert_eq!(inner.len(), 30);
        assert_eq!(inner[29], "line 30");
    }

    #[test]
    fn exactly_thirty_lines_not_truncated() {
        let output: String = (1..=30).map(|i| format!("{i}\n")).collect();
        let reply = format_reply(output.as_bytes());
        assert!(!reply.truncated);
    }

    #[test]
    fn long_single_line_cut_to_limit() {
        let output = "x".repeat(5000);
        let reply = format_reply(output.as_bytes());

        let expected = format!("```\n{}\n```\n{}", "x".repeat(1900), TRUNCATED_MARKER);
        assert!(reply.truncated);
        assert_eq!(reply.content, expected);
    }

    #[test]
    fn length_cap_applies_after_line_cap() {
        let output: String = (0..40).map(|_| format!("{}\n", "y".repeat(99))).collect();
        let reply = format_reply(output.as_bytes());

        assert!(reply.truncated);
        let body = reply
            .content
            .strip_prefix("```\n")
            .and_then(|s| s.strip_suffix(&format!("```\n{TRUNCATED_MARKER}")))
            .unwrap();
        assert_eq!(body.chars().count(), MAX_REPLY_CHARS + 1);
    }

    #[test]
    fn escaped_fence_counts_as_characters() {
        let output = "```".repeat(1000);
        let reply = format_reply(output.as_bytes());
        let body = reply
            .content
            .strip_prefix("```\n")
            .and_then(|s| s.strip_suffix(&format!("```\n{TRUNCATED_MARKER}")))
            .unwrap();
        assert_eq!(body.chars().count(), MAX_REPLY_CHARS + 1);
    }

    #[test]
    fn char_offset_clamps() {
        assert_eq!(char_offset("abc", 2), 2);
        assert_eq!(char_offset("abc", 10), 3);
        assert_eq!(char_offset("a\u{200C}b", 2), 4);
    }
}
