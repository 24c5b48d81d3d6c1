// src/utils/html.rs

/// Whitelist-sanitizes free text before it is stored.
///
/// Safe tags such as <b> and <p> survive. <script> is removed together with its content,
/// and event-handler attributes are stripped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_script() {
        let cleaned = clean_html("<p>answer</p><script>alert(1)</script>");
        assert_eq!(cleaned, "<p>answer</p>");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(clean_html("Use a ladder"), "Use a ladder");
    }
}
