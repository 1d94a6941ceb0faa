//! Log note sanitisation: markup removed, entities decoded, one line

use scraper::Html;

/// Reduce an HTML log note to plain single-line text
pub fn sanitize_note(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let mut text = String::with_capacity(raw.len());

    for node in fragment.root_element().descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|el| el.name()))
            .is_some_and(|name| matches!(name, "script" | "style"));
        if !hidden {
            text.push_str(chunk);
        }
    }

    text.trim().replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags_and_decodes_entities() {
        let raw = "<p>Found it &amp; signed the log</p>\n<b>TFTC</b>";
        assert_eq!(sanitize_note(raw), "Found it & signed the log TFTC");
    }

    #[test]
    fn test_plain_text_is_unchanged_apart_from_newlines() {
        assert_eq!(sanitize_note("  Great hide!\nThanks  "), "Great hide! Thanks");
        // CRLF is normalised to a single newline by the HTML parser
        assert_eq!(sanitize_note("line one\r\nline two"), "line one line two");
    }

    #[test]
    fn test_script_content_is_dropped() {
        let raw = "Nice<script>alert('x')</script> one";
        assert_eq!(sanitize_note(raw), "Nice one");
    }

    #[test]
    fn test_empty_note() {
        assert_eq!(sanitize_note(""), "");
        assert_eq!(sanitize_note("<br/>"), "");
    }
}
