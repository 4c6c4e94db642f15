//! Markdown-to-plain-text normalization ahead of embedding.
//!
//! The rewrite rules run in a fixed order: image embeds are dropped before
//! wikilinks are unwrapped, and markdown images before markdown links,
//! otherwise the leading `!` would survive as stray text.

use std::sync::LazyLock;

use regex::Regex;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("valid cleaning regex"),
        replacement,
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        // ![[embed.png]]
        rule(r"!\[\[[^\]]+\]\]", ""),
        // [[target|alias]] -> alias
        rule(r"\[\[([^\]|]+)\|([^\]]+)\]\]", "${2}"),
        // [[target]] -> target
        rule(r"\[\[([^\]]+)\]\]", "${1}"),
        // ![alt](url)
        rule(r"!\[[^\]]*\]\([^)]+\)", ""),
        // [text](url) -> text
        rule(r"\[([^\]]+)\]\([^)]+\)", "${1}"),
        // <tags>
        rule(r"<[^>]+>", ""),
        rule(r"\n{3,}", "\n\n"),
        rule(r" {2,}", " "),
    ]
});

/// Strip link, image, and HTML syntax and squeeze whitespace.
pub fn clean_content_for_embedding(text: &str) -> String {
    let mut out = text.to_string();
    for rule in RULES.iter() {
        out = rule.pattern.replace_all(&out, rule.replacement).into_owned();
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wikilinks_unwrapped() {
        let cleaned = clean_content_for_embedding("[[Note]] and [[Other|Shown]] link");
        assert_eq!(cleaned, "Note and Shown link");
    }

    #[test]
    fn test_alias_hides_target() {
        let cleaned = clean_content_for_embedding("see [[A|B]]");
        assert!(cleaned.contains('B'));
        assert!(!cleaned.contains("[["));
        assert!(!cleaned.contains('A'));
    }

    #[test]
    fn test_image_embed_removed() {
        let cleaned = clean_content_for_embedding("text ![[image.png]] more text");
        assert!(!cleaned.contains("image"));
        assert!(!cleaned.contains('!'));
        assert_eq!(cleaned, "text more text");
    }

    #[test]
    fn test_markdown_images_and_links() {
        let cleaned =
            clean_content_for_embedding("![logo](http://x/logo.png) read [the docs](http://x/docs)");
        assert_eq!(cleaned, "read the docs");
    }

    #[test]
    fn test_html_tags_stripped() {
        let cleaned = clean_content_for_embedding("<div class=\"x\">content</div>");
        assert_eq!(cleaned, "content");
    }

    #[test]
    fn test_whitespace_collapsed() {
        let cleaned = clean_content_for_embedding("  line1\n\n\n\nline2   spaced  ");
        assert_eq!(cleaned, "line1\n\nline2 spaced");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(clean_content_for_embedding("plain #tag text"), "plain #tag text");
    }
}
