#![forbid(unsafe_code)]

//! Character escaping for canonical output.
//!
//! Text escapes `&`, `<`, `>` and carriage return. Attribute values escape
//! `&`, `<`, `"`, tab, line feed and carriage return. PI data escapes only
//! carriage return.

fn push_escaped(out: &mut Vec<u8>, s: &str, table: fn(char) -> Option<&'static str>) {
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        if let Some(rep) = table(ch) {
            out.extend_from_slice(&s.as_bytes()[start..i]);
            out.extend_from_slice(rep.as_bytes());
            start = i + ch.len_utf8();
        }
    }
    out.extend_from_slice(&s.as_bytes()[start..]);
}

fn text_entity(ch: char) -> Option<&'static str> {
    match ch {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '\r' => Some("&#xD;"),
        _ => None,
    }
}

fn attr_entity(ch: char) -> Option<&'static str> {
    match ch {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '"' => Some("&quot;"),
        '\t' => Some("&#x9;"),
        '\n' => Some("&#xA;"),
        '\r' => Some("&#xD;"),
        _ => None,
    }
}

fn pi_entity(ch: char) -> Option<&'static str> {
    (ch == '\r').then_some("&#xD;")
}

pub fn push_text(out: &mut Vec<u8>, s: &str) {
    push_escaped(out, s, text_entity);
}

pub fn push_attr(out: &mut Vec<u8>, s: &str) {
    push_escaped(out, s, attr_entity);
}

pub fn push_pi(out: &mut Vec<u8>, s: &str) {
    push_escaped(out, s, pi_entity);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(f: fn(&mut Vec<u8>, &str), s: &str) -> String {
        let mut out = Vec::new();
        f(&mut out, s);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_text() {
        assert_eq!(run(push_text, "plain"), "plain");
        assert_eq!(run(push_text, "a&b<c>d\re"), "a&amp;b&lt;c&gt;d&#xD;e");
    }

    #[test]
    fn test_attr() {
        assert_eq!(run(push_attr, "a&b\"c>"), "a&amp;b&quot;c>");
        assert_eq!(run(push_attr, "x\ty\nz\rw"), "x&#x9;y&#xA;z&#xD;w");
    }

    #[test]
    fn test_multibyte_preserved() {
        assert_eq!(run(push_text, "Ulriksdal slott <å>"), "Ulriksdal slott &lt;å&gt;");
        assert_eq!(run(push_pi, "a\rb"), "a&#xD;b");
    }
}
