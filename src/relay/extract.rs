//! Turns free-form chat text into emulator input.
//!
//! Extraction never fails. Anything odd in the message degrades the payload
//! instead, so the sender still gets an answer (usually an error from the
//! emulator itself) rather than silence.

/// Machine names the emulator understands for `-m`, compared case-insensitively.
pub const ACCEPTABLE_MACHINES: &[&str] = &[
    "enhanced", "//e",
    "twoey", "][e", "iie",
    "plus", "+", "][+", "ii+", "twoplus", "autostart", "applesoft", "asoft",
    "original", "][", "ii", "two", "woz", "int", "integer",
];

const FENCE: &str = "```";

/// Input for one emulator run.
///
/// The payload is never empty and always ends with a newline byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParameters {
    payload: Vec<u8>,
    machine: Option<String>,
    /// Characters outside ASCII were dropped from the payload.
    degraded: bool,
}

impl RunParameters {
    /// Build parameters, appending a newline to the payload if needed.
    pub fn new(mut payload: Vec<u8>, machine: Option<String>) -> Self {
        if payload.last() != Some(&b'\n') {
            payload.push(b'\n');
        }
        Self {
            payload,
            machine,
            degraded: false,
        }
    }

    fn with_degraded(mut self, degraded: bool) -> Self {
        self.degraded = degraded;
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Hardware variant requested with `m:<name>`, if any.
    pub fn machine(&self) -> Option<&str> {
        self.machine.as_deref()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// Returns true if `name` is a machine the emulator accepts.
pub fn is_acceptable_machine(name: &str) -> bool {
    let lower = name.to_lowercase();
    ACCEPTABLE_MACHINES.iter().any(|m| *m == lower)
}

/// Extract the emulator payload and parameters from a chat message.
///
/// The first line is dropped when it addresses the bot (attract tag,
/// mention, or a leading `!`); its `m:<machine>` token, if valid, selects
/// the machine. Opening and closing code fences are stripped, and
/// non-ASCII characters are dropped (see [`RunParameters::is_degraded`]).
pub fn extract(text: &str, attract_tag: &str) -> RunParameters {
    let mut lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut machine = None;

    if lines.first().is_some_and(|first| is_addressing_line(first, attract_tag)) {
        machine = parse_machine(lines.remove(0));
    }

    if lines.first().is_some_and(|l| l.trim().starts_with(FENCE)) {
        lines.remove(0);
    }

    if lines.last().is_some_and(|l| l.trim().starts_with(FENCE)) {
        lines.pop();
    }

    let body = lines.concat();
    let payload: Vec<u8> = body.chars().filter(char::is_ascii).map(|c| c as u8).collect();

    let degraded = payload.len() != body.chars().count();
    RunParameters::new(payload, machine).with_degraded(degraded)
}

fn is_addressing_line(line: &str, attract_tag: &str) -> bool {
    let lower = line.to_lowercase();
    (!attract_tag.is_empty() && lower.contains(&attract_tag.to_lowercase()))
        || line.contains("<@")
        || line.trim_start().starts_with('!')
}

/// Scan `key:value` tokens for a recognised `m` value. The last valid one wins.
fn parse_machine(line: &str) -> Option<String> {
    line.split_whitespace()
        .filter_map(|word| word.split_once(':'))
        .filter(|(key, value)| key.eq_ignore_ascii_case("m") && is_acceptable_machine(value))
        .map(|(_, value)| value.to_string())
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG: &str = "!bobbin";

    #[test]
    fn tagged_fenced_message() {
        let params = extract("!bobbin m:iie\n```\nHELLO\n```\n", TAG);
        assert_eq!(params.payload(), b"HELLO\n");
        assert_eq!(params.machine(), Some("iie"));
    }

    #[test]
    fn plain_direct_message_kept_whole() {
        let params = extract("10 PRINT \"HI\"\n20 GOTO 10\nRUN", TAG);
        assert_eq!(params.payload(), b"10 PRINT \"HI\"\n20 GOTO 10\nRUN\n");
        assert_eq!(params.machine(), None);
    }

    #[test]
    fn newline_appended_only_when_missing() {
        assert_eq!(extract("PRINT 1", TAG).payload(), b"PRINT 1\n");
        assert_eq!(extract("PRINT 1\n", TAG).payload(), b"PRINT 1\n");
        assert_eq!(extract("PRINT 1\n\n", TAG).payload(), b"PRINT 1\n\n");
    }

    #[test]
    fn empty_input_gives_single_newline() {
        assert_eq!(extract("", TAG).payload(), b"\n");
        assert_eq!(extract("!bobbin", TAG).payload(), b"\n");
        assert_eq!(extract("!bobbin\n```\n```", TAG).payload(), b"\n");
    }

    #[test]
    fn mention_line_removed() {
        let params = extract("<@900> m:plus\nPRINT 2\n", TAG);
        assert_eq!(params.payload(), b"PRINT 2\n");
        assert_eq!(params.machine(), Some("plus"));
    }

    #[test]
    fn bang_line_removed_without_params() {
        let params = extract("!run\nPRINT 3\n", TAG);
        assert_eq!(params.payload(), b"PRINT 3\n");
        assert_eq!(params.machine(), None);
    }

    #[test]
    fn tag_matched_case_insensitively_on_first_line() {
        let params = extract("hey !BOBBIN m:II+\nPRINT 4", TAG);
        assert_eq!(params.payload(), b"PRINT 4\n");
        assert_eq!(params.machine(), Some("II+"));
    }

    #[test]
    fn unknown_machine_ignored() {
        let params = extract("!bobbin m:c64 x:y\nPRINT 5\n", TAG);
        assert_eq!(params.machine(), None);
        assert_eq!(params.payload(), b"PRINT 5\n");
    }

    #[test]
    fn machine_key_case_insensitive() {
        assert_eq!(extract("!bobbin M:woz\n", TAG).machine(), Some("woz"));
    }

    #[test]
    fn empty_machine_value_ignored() {
        assert_eq!(extract("!bobbin m:\nPRINT\n", TAG).machine(), None);
    }

    #[test]
    fn fence_with_language_hint_removed() {
        let params = extract("```basic\n10 PRINT 6\n```", TAG);
        assert_eq!(params.payload(), b"10 PRINT 6\n");
    }

    #[test]
    fn inner_fences_kept() {
        let params = extract("```\nA\n```\nB\n```", TAG);
        assert_eq!(params.payload(), b"A\n```\nB\n");
    }

    #[test]
    fn non_ascii_dropped() {
        let params = extract("PRINT \"caf\u{e9}\u{2014}\"\n", TAG);
        assert_eq!(params.payload(), b"PRINT \"caf\"\n");
        assert!(params.is_degraded());
    }

    #[test]
    fn plain_ascii_not_degraded() {
        assert!(!extract("!bobbin\nPRINT 1\n", TAG).is_degraded());
        // Non-ASCII on the removed addressing line does not count.
        assert!(!extract("!bobbin \u{1F34E}\nPRINT 1\n", TAG).is_degraded());
    }

    #[test]
    fn first_line_without_address_kept() {
        let params = extract("```\nPRINT 7\n```\n", TAG);
        assert_eq!(params.payload(), b"PRINT 7\n");
    }

    #[test]
    fn run_parameters_new_terminates_payload() {
        assert_eq!(RunParameters::new(Vec::new(), None).payload(), b"\n");
        assert_eq!(RunParameters::new(b"X".to_vec(), None).payload(), b"X\n");
    }

    #[test]
    fn acceptable_machines() {
        assert!(is_acceptable_machine("enhanced"));
        assert!(is_acceptable_machine("][E"));
        assert!(is_acceptable_machine("Integer"));
        assert!(!is_acceptable_machine("iigs"));
        assert!(!is_acceptable_machine(""));
    }
}
