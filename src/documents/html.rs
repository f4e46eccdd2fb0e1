use std::sync::OnceLock;

use regex::Regex;

const BLOCK_TAGS: [&str; 22] = [
    "p", "div", "br", "li", "ul", "ol", "tr", "td", "th", "table", "h1", "h2", "h3", "h4", "h5",
    "h6", "section", "article", "header", "footer", "nav", "title",
];

/// Visible text of an HTML page: tags stripped, `<script>`/`<style>` bodies
/// dropped, common entities decoded, one non-blank line per text block.
pub fn html_to_text(html: &str) -> String {
    let mut result = String::with_capacity(html.len() / 2);
    let mut tag = String::new();
    let mut in_tag = false;
    let mut rest = html;

    while let Some(c) = rest.chars().next() {
        rest = &rest[c.len_utf8()..];

        if c == '<' {
            if starts_markup(rest) {
                // An unterminated tag before this one is dropped.
                in_tag = true;
                tag.clear();
            } else if !in_tag {
                result.push(c);
            }
            continue;
        }

        if !in_tag {
            result.push(c);
            continue;
        }

        if c != '>' {
            tag.push(c);
            continue;
        }

        in_tag = false;
        let name = tag_name(&tag);
        let opening = !tag.starts_with('/') && !tag.trim_end().ends_with('/');
        if opening && (name == "script" || name == "style") {
            rest = skip_raw_text(rest, &name);
        } else if BLOCK_TAGS.contains(&name.as_str()) {
            result.push('\n');
        }
        tag.clear();
    }

    let decoded = decode_entities(&result);
    decoded
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A `<` opens markup only when followed by a tag name, `/`, `!` or `?`.
fn starts_markup(rest: &str) -> bool {
    rest.chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'))
        .unwrap_or(false)
}

/// Skips a script or style body up to and including its closing tag. The
/// body is not tokenized, so `<` inside it is harmless.
fn skip_raw_text<'a>(rest: &'a str, name: &str) -> &'a str {
    let closing = format!("</{}", name);
    let Some(start) = rest.to_ascii_lowercase().find(&closing) else {
        return "";
    };
    match rest[start..].find('>') {
        Some(end) => &rest[start + end + 1..],
        None => "",
    }
}

/// Raw `href` values in document order, duplicates included.
pub fn extract_links(html: &str) -> Vec<String> {
    static HREF: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = HREF
        .get_or_init(|| Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).ok())
        .as_ref()
    else {
        return Vec::new();
    };

    re.captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| decode_entities(m.as_str().trim()))
        .filter(|href| !href.is_empty())
        .collect()
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_scripts_and_styles() {
        let html = r#"
            <html>
            <head><title>Shop</title><script>var x = "<p>1</p>";</script>
            <style>body { color: red; }</style></head>
            <body>
                <h1>Hello</h1>
                <p>World &amp; <b>friends</b></p>
            </body>
            </html>
        "#;

        let text = html_to_text(html);
        assert_eq!(text, "Shop\nHello\nWorld & friends");
    }

    #[test]
    fn less_than_inside_script_keeps_the_rest_of_the_page() {
        let html = "<script>if (a<b) { x(); }</script><p>Visible text</p>";
        assert_eq!(html_to_text(html), "Visible text");

        let html = "<SCRIPT type=\"text/javascript\">for(i=0;i<n;i++){}</Script><div>After</div>";
        assert_eq!(html_to_text(html), "After");
    }

    #[test]
    fn bare_less_than_in_text_is_kept() {
        assert_eq!(html_to_text("<p>1 < 2 and 3 > 2</p>"), "1 < 2 and 3 > 2");
    }

    #[test]
    fn unclosed_script_drops_the_tail() {
        assert_eq!(html_to_text("<p>Kept</p><script>var a = 1;"), "Kept");
    }

    #[test]
    fn inline_tags_do_not_split_words() {
        assert_eq!(html_to_text("<p>Hel<b>lo</b> there</p>"), "Hello there");
    }

    #[test]
    fn extracts_quoted_and_bare_hrefs() {
        let html = r#"<a href="/cart">Cart</a> <A class="x" HREF='shop.html?a=1&amp;b=2'>Shop</A>
            <a href=https://example.com/about>About</a> <a name="top">no href</a>"#;
        assert_eq!(
            extract_links(html),
            vec![
                "/cart".to_string(),
                "shop.html?a=1&b=2".to_string(),
                "https://example.com/about".to_string(),
            ]
        );
    }
}
