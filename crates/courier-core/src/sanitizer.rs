//! Telegram HTML sanitizer.
//!
//! Model replies are untrusted and frequently malformed. [`sanitize`] turns
//! any input into text that uses only `<b> <i> <u> <code> <pre> <a href>`,
//! with every other `<`, `>` and `&` escaped and every kept tag balanced.
//! It is total and idempotent.
//!
//! The input is split into text runs and tag-like tokens by a small scanner,
//! then replayed through a whitelist filter that keeps a stack of open
//! elements.

use std::sync::OnceLock;

use regex_lite::Regex;

/// Tags that survive, in canonical attribute-free form (`a` keeps `href`).
const ALLOWED_TAGS: &[&str] = &["b", "i", "u", "code", "pre", "a"];

/// Elements whose content is dropped together with the tags.
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

/// Link targets Telegram accepts.
const LINK_SCHEMES: &[&str] = &["http://", "https://", "mailto:", "tg://"];

const BULLET: &str = "• ";

// ── Tokens ──

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Text(&'a str),
    Tag(Tag<'a>),
}

#[derive(Debug, PartialEq)]
struct Tag<'a> {
    /// Lowercased.
    name: String,
    closing: bool,
    self_closing: bool,
    attrs: &'a str,
}

/// Split `input` into text runs and tag-like tokens. A `<` that does not
/// start a well-formed tag stays in the text.
fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while let Some(offset) = input[pos..].find('<') {
        let lt = pos + offset;
        match parse_tag(&input[lt..]) {
            Some((tag, len)) => {
                if text_start < lt {
                    tokens.push(Token::Text(&input[text_start..lt]));
                }
                tokens.push(Token::Tag(tag));
                pos = lt + len;
                text_start = pos;
            }
            None => pos = lt + 1,
        }
    }

    if text_start < input.len() {
        tokens.push(Token::Text(&input[text_start..]));
    }
    tokens
}

/// Parse one tag at the start of `s` (which begins with `<`). Returns the
/// tag and its length in bytes.
fn parse_tag(s: &str) -> Option<(Tag<'_>, usize)> {
    let bytes = s.as_bytes();
    let mut i = 1;

    let closing = bytes.get(i) == Some(&b'/');
    if closing {
        i += 1;
    }

    let name_start = i;
    if !bytes.get(i).is_some_and(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    let name = s[name_start..i].to_ascii_lowercase();

    // Tag ends at the first '>'; another '<' before it means this was text.
    let end = i + s[i..].find(|c: char| c == '>' || c == '<')?;
    if bytes[end] == b'<' {
        return None;
    }

    let inner = &s[i..end];
    if let Some(c) = inner.chars().next() {
        if !c.is_ascii_whitespace() && c != '/' {
            return None;
        }
    }

    let trimmed = inner.trim_end();
    let self_closing = !closing && trimmed.ends_with('/');
    let attrs = trimmed.strip_suffix('/').unwrap_or(trimmed);

    Some((
        Tag {
            name,
            closing,
            self_closing,
            attrs,
        },
        end + 1,
    ))
}

// ── Attributes ──

/// Extract a usable `href` from the raw attribute text of an `<a>` tag.
/// Returns the escaped value, or None if it is missing or malformed.
fn parse_href(attrs: &str) -> Option<String> {
    let mut rest = attrs;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '/');
        if rest.is_empty() {
            return None;
        }

        let name_end = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '=' || c == '/')
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        rest = rest[name_end..].trim_start();

        let value = match rest.strip_prefix('=') {
            Some(after_eq) => {
                let after_eq = after_eq.trim_start();
                match after_eq.chars().next() {
                    Some(q @ ('"' | '\'')) => {
                        // Unterminated quote poisons the whole tag.
                        let close = after_eq[1..].find(q)?;
                        rest = &after_eq[close + 2..];
                        Some(&after_eq[1..close + 1])
                    }
                    Some(_) => {
                        let end = after_eq
                            .find(|c: char| c.is_ascii_whitespace())
                            .unwrap_or(after_eq.len());
                        rest = &after_eq[end..];
                        Some(&after_eq[..end])
                    }
                    None => return None,
                }
            }
            None => None,
        };

        if name.eq_ignore_ascii_case("href") {
            return value.and_then(clean_href);
        }
    }
}

fn clean_href(raw: &str) -> Option<String> {
    let href = decode_entities(raw);
    let href = href.trim();
    if href.chars().any(|c| c.is_control()) {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if !LINK_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
    {
        return None;
    }
    Some(escape_attr(href))
}

fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

// ── Escaping ──

/// Escape `<`, `>` and `&` for Telegram HTML, leaving character references
/// that are already valid untouched.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    push_escaped(&mut out, s);
    out
}

fn push_escaped(out: &mut String, s: &str) {
    for (i, c) in s.char_indices() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' if is_char_reference(&s[i..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
}

/// `s` starts with `&`. True for `&amp;`, `&lt;`, `&gt;`, `&quot;` and
/// decimal or hex numeric references naming a non-NUL Unicode scalar.
fn is_char_reference(s: &str) -> bool {
    let Some(semi) = s[1..].find(';') else {
        return false;
    };
    if semi > 10 {
        return false;
    }
    let body = &s[1..1 + semi];
    match body {
        "amp" | "lt" | "gt" | "quot" => true,
        _ => match body.strip_prefix('#') {
            Some(num) => {
                let (digits, radix) = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                    Some(hex) => (hex, 16),
                    None => (num, 10),
                };
                // from_str_radix alone would also take a leading '+'.
                digits.chars().all(|c| c.is_digit(radix))
                    && u32::from_str_radix(digits, radix)
                        .ok()
                        .filter(|&n| n != 0)
                        .and_then(char::from_u32)
                        .is_some()
            }
            None => false,
        },
    }
}

// ── Rendering ──

struct Renderer {
    out: String,
    open: Vec<String>,
    /// Raw-text element whose content is being skipped.
    skipping: Option<String>,
}

impl Renderer {
    fn new(capacity: usize) -> Self {
        Self {
            out: String::with_capacity(capacity),
            open: Vec::new(),
            skipping: None,
        }
    }

    fn token(&mut self, token: Token<'_>) {
        if let Some(skipped) = self.skipping.as_deref() {
            let ends = matches!(&token, Token::Tag(tag) if tag.closing && tag.name == skipped);
            if ends {
                self.skipping = None;
            }
            return;
        }

        match token {
            Token::Text(text) => push_escaped(&mut self.out, text),
            Token::Tag(tag) => self.tag(tag),
        }
    }

    fn tag(&mut self, tag: Tag<'_>) {
        let name = tag.name.as_str();

        if RAW_TEXT_TAGS.contains(&name) {
            if !tag.closing && !tag.self_closing {
                self.skipping = Some(name.to_string());
            }
            return;
        }

        match name {
            "br" => self.out.push('\n'),
            "li" if tag.closing => self.out.push('\n'),
            "li" => self.out.push_str(BULLET),
            "ul" | "ol" => {}
            _ if !ALLOWED_TAGS.contains(&name) => {}
            _ if tag.closing => self.close(name),
            _ if tag.self_closing => {}
            "a" => self.open_link(tag.attrs),
            _ => {
                self.out.push('<');
                self.out.push_str(name);
                self.out.push('>');
                self.open.push(name.to_string());
            }
        }
    }

    fn open_link(&mut self, attrs: &str) {
        // Telegram rejects nested links.
        if self.open.iter().any(|n| n == "a") {
            return;
        }
        if let Some(href) = parse_href(attrs) {
            self.out.push_str("<a href=\"");
            self.out.push_str(&href);
            self.out.push_str("\">");
            self.open.push("a".to_string());
        }
    }

    /// Close `name` and everything opened inside it. Stray closes vanish.
    fn close(&mut self, name: &str) {
        let Some(idx) = self.open.iter().rposition(|n| n == name) else {
            return;
        };
        while self.open.len() > idx {
            if let Some(n) = self.open.pop() {
                self.out.push_str("</");
                self.out.push_str(&n);
                self.out.push('>');
            }
        }
    }

    fn finish(mut self) -> String {
        while let Some(n) = self.open.pop() {
            self.out.push_str("</");
            self.out.push_str(&n);
            self.out.push('>');
        }
        self.out
    }
}

fn blank_lines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("valid regex"))
}

/// Rewrite untrusted markup into Telegram-safe HTML.
pub fn sanitize(input: &str) -> String {
    let mut renderer = Renderer::new(input.len());
    for token in tokenize(input) {
        renderer.token(token);
    }
    let html = renderer.finish();

    blank_lines().replace_all(&html, "\n\n").trim().to_string()
}
