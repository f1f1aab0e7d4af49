use html2text::render::TrivialDecorator;
use once_cell::sync::Lazy;
use regex::Regex;

// Wide enough that html2text never wraps a paragraph.
const TEXT_WIDTH: usize = 10_000;

static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Converts an HTML fragment into plain text.
///
/// Paragraphs stay separated by a blank line and `<br>` by a newline; markup
/// is dropped and character references are decoded. Runs of blank lines
/// collapse to one.
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let text = match html2text::config::with_decorator(TrivialDecorator::new())
        .string_from_read(html.as_bytes(), TEXT_WIDTH)
    {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            return String::new();
        }
    };

    let text = text
        .replace("\r\n", "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    BLANK_RUN.replace_all(&text, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_become_blank_lines() {
        let text = html_to_text("<p>First</p><p>Second<br>line</p>");
        assert_eq!(text, "First\n\nSecond\nline");
    }

    #[test]
    fn inline_tags_are_stripped() {
        assert_eq!(
            html_to_text(r#"Read <a href="x"><b>this</b></a> now"#),
            "Read this now"
        );
    }

    #[test]
    fn lists_get_one_item_per_line() {
        let text = html_to_text("<ul><li>one</li><li>two</li></ul>");
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        assert_eq!(lines, ["one", "two"]);
    }

    #[test]
    fn scripts_are_dropped() {
        let text = html_to_text("<p>Body</p><script>alert(1)</script>");
        assert_eq!(text, "Body");
    }

    #[test]
    fn entities_are_decoded_once() {
        assert_eq!(
            html_to_text("Tom &amp; Jerry &#8212; &#x41; &lt;tag&gt; &amp;lt;"),
            "Tom & Jerry \u{2014} A <tag> &lt;"
        );
    }

    #[test]
    fn every_named_entity_is_decoded() {
        assert_eq!(
            html_to_text("<p>Caf&eacute; &uuml;ber &frac12; &hearts; &sup2;</p>"),
            "Caf\u{e9} \u{fc}ber \u{bd} \u{2665} \u{b2}"
        );
    }

    #[test]
    fn blank_runs_collapse() {
        let text = html_to_text("<p>a</p><p></p><p></p><p>b</p>");
        assert!(!text.contains("\n\n\n"), "{text:?}");
        assert!(text.starts_with('a') && text.ends_with('b'), "{text:?}");
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(html_to_text(""), "");
        assert_eq!(html_to_text("   "), "");
    }
}
