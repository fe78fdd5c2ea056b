//! Opt-out footer injection and STOP/HELP keyword classification.

/// Appended to outbound text that lacks an opt-out disclosure.
pub const COMPLIANCE_FOOTER: &str = "Reply STOP to opt out, HELP for help.";

const FOOTER_MARKERS: &[&str] = &["reply stop", "help for help"];

pub const STOP_KEYWORDS: &[&str] = &["stop", "stopall", "unsubscribe", "cancel", "end", "quit"];
pub const HELP_KEYWORDS: &[&str] = &["help", "info"];
pub const START_KEYWORDS: &[&str] = &["start", "unstop"];

/// Compliance keyword carried by an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Stop,
    Help,
    Start,
}

/// Returns the text with the opt-out footer, leaving already compliant text untouched.
pub fn ensure_footer(text: &str) -> String {
    let lowered = text.to_lowercase();
    if FOOTER_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return text.to_string();
    }

    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        COMPLIANCE_FOOTER.to_string()
    } else {
        format!("{trimmed}\n{COMPLIANCE_FOOTER}")
    }
}

fn normalize(body: &str) -> String {
    body.trim().to_lowercase()
}

fn matches_any(body: &str, keywords: &[&str]) -> bool {
    let normalized = normalize(body);
    keywords.iter().any(|keyword| *keyword == normalized)
}

/// Exact, whole-message match; "please stop" is not an opt-out.
pub fn matches_stop_keyword(body: &str) -> bool {
    matches_any(body, STOP_KEYWORDS)
}

pub fn matches_help_keyword(body: &str) -> bool {
    matches_any(body, HELP_KEYWORDS)
}

pub fn matches_start_keyword(body: &str) -> bool {
    matches_any(body, START_KEYWORDS)
}

pub fn classify_keyword(body: &str) -> Option<Keyword> {
    if matches_stop_keyword(body) {
        Some(Keyword::Stop)
    } else if matches_help_keyword(body) {
        Some(Keyword::Help)
    } else if matches_start_keyword(body) {
        Some(Keyword::Start)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_footer_once() {
        let once = ensure_footer("Your table is ready.");
        assert_eq!(once, "Your table is ready.\nReply STOP to opt out, HELP for help.");
        assert_eq!(ensure_footer(&once), once);
    }

    #[test]
    fn footer_is_idempotent_across_inputs() {
        let samples = [
            "",
            "   ",
            "hello",
            "trailing newline\n",
            "REPLY STOP to end",
            "text HELP FOR HELP",
            "Reply Stop",
            "stop",
            "ünïcödé message",
        ];
        for sample in samples {
            let once = ensure_footer(sample);
            assert_eq!(ensure_footer(&once), once, "input {sample:?}");
        }
    }

    #[test]
    fn existing_disclosure_is_left_alone() {
        let text = "Deals inside! reply stop to unsubscribe";
        assert_eq!(ensure_footer(text), text);
        let text = "Text HELP for help.";
        assert_eq!(ensure_footer(text), text);
    }

    #[test]
    fn blank_text_becomes_footer() {
        assert_eq!(ensure_footer("  \n"), COMPLIANCE_FOOTER);
    }

    #[test]
    fn stop_keywords_match_exactly() {
        for body in ["stop", " STOP ", "Stop\n", "stopall", "UNSUBSCRIBE", "cancel", "end", "quit"] {
            assert!(matches_stop_keyword(body), "{body:?} should opt out");
        }
        for body in ["please stop", "stop it", "don't stop", "stopp", ""] {
            assert!(!matches_stop_keyword(body), "{body:?} must not opt out");
        }
    }

    #[test]
    fn help_keywords_match_exactly() {
        assert!(matches_help_keyword(" Help "));
        assert!(matches_help_keyword("INFO"));
        assert!(!matches_help_keyword("help me"));
        assert!(!matches_help_keyword("stop"));
    }

    #[test]
    fn classifies_keywords() {
        assert_eq!(classify_keyword("QUIT"), Some(Keyword::Stop));
        assert_eq!(classify_keyword("info"), Some(Keyword::Help));
        assert_eq!(classify_keyword("unstop"), Some(Keyword::Start));
        assert_eq!(classify_keyword("what time do you open?"), None);
    }
}
