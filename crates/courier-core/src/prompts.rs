//! Fixed texts — the system instruction and user-facing notices.

/// Leading system message of every conversation. Tells the model which
/// subset of Telegram HTML survives sanitizing.
pub const SYSTEM_INSTRUCTION: &str = "Format your reply as Telegram HTML. Allowed tags: \
<b>, <i>, <u>, <code>, <pre>, <a href=\"...\">. \
Do not use <ul>/<li> or Markdown. For lists use bullets '• ' or numbering '1.'.";

pub const BUSY_NOTICE: &str = "⏳ Please wait, a reply is still being generated.";

pub fn rate_limited_notice(remaining_secs: u64) -> String {
    format!("⏳ Please wait {} more s.", remaining_secs)
}

pub fn countdown_status(remaining_secs: u64) -> String {
    format!("⌛ Generating a reply... ({} s)", remaining_secs)
}

/// Sent when the model answered but nothing survived sanitizing.
pub const EMPTY_REPLY_NOTICE: &str = "⚠️ The model returned an empty reply.";

/// Greeting for `/start`. Rendered as HTML.
pub fn greeting(model: &str) -> String {
    format!(
        "<b>Hi! 😊</b>\nI relay your messages to <code>{}</code>. Write me something.",
        crate::sanitizer::escape_text(model)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_escapes_model_name() {
        let g = greeting("a<b>&c");
        assert!(g.contains("<code>a&lt;b&gt;&amp;c</code>"));
    }

    #[test]
    fn test_notices() {
        assert_eq!(rate_limited_notice(7), "⏳ Please wait 7 more s.");
        assert!(countdown_status(15).contains("(15 s)"));
    }
}
