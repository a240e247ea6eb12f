use once_cell::sync::Lazy;
use regex::Regex;

static HAS_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?P<scope>.*?):has-text\(\s*["'](?P<text>.*)["']\s*\)$"#).expect("valid has-text pattern")
});

/// Visibility test shared by every generated lookup.
pub(crate) const IS_VISIBLE_JS: &str = "(e) => { const r = e.getBoundingClientRect(); \
const s = window.getComputedStyle(e); \
return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }";

/// Represents ways to locate a DOM element
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Plain CSS selector
    Css(String),
    /// Elements matching `scope` whose rendered text contains `text`
    HasText { scope: String, text: String },
    /// Alternatives in priority order; the first present one wins
    Or(Vec<Selector>),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Css(css) => f.write_str(css),
            Selector::HasText { scope, text } => write!(f, "{scope}:has-text({text:?})"),
            Selector::Or(list) => {
                let parts: Vec<String> = list.iter().map(|s| s.to_string()).collect();
                f.write_str(&parts.join(", "))
            }
            Selector::Invalid(reason) => write!(f, "<invalid: {reason}>"),
        }
    }
}

/// Split on commas that are outside quotes, brackets and parentheses.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let parts = split_top_level(s);
        match parts.len() {
            0 => Selector::Invalid("empty selector".to_string()),
            1 => {
                let part = parts[0];
                match HAS_TEXT.captures(part) {
                    Some(caps) => {
                        let scope = caps["scope"].trim();
                        Selector::HasText {
                            scope: if scope.is_empty() { "*" } else { scope }.to_string(),
                            text: caps["text"].to_string(),
                        }
                    }
                    None => Selector::Css(part.to_string()),
                }
            }
            _ => Selector::Or(parts.into_iter().map(Selector::from).collect()),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

impl Selector {
    /// A JS expression that yields the matching element or `null`.
    ///
    /// Text and `Or` matches prefer a visible candidate over a hidden one.
    pub fn to_js(&self) -> String {
        match self {
            Selector::Css(css) => format!("document.querySelector({})", js_string(css)),
            Selector::HasText { scope, text } => format!(
                "(() => {{ const vis = {IS_VISIBLE_JS}; \
                 const c = Array.from(document.querySelectorAll({})) \
                 .filter(e => (e.innerText || e.textContent || '').includes({})); \
                 return c.find(vis) || c[0] || null; }})()",
                js_string(scope),
                js_string(text)
            ),
            Selector::Or(list) => {
                let candidates: Vec<String> = list.iter().map(|s| s.to_js()).collect();
                format!(
                    "(() => {{ const vis = {IS_VISIBLE_JS}; \
                     const c = [{}].filter(Boolean); \
                     return c.find(vis) || c[0] || null; }})()",
                    candidates.join(", ")
                )
            }
            Selector::Invalid(_) => "null".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_css() {
        assert_eq!(
            Selector::from(r#"input[name="email"]"#),
            Selector::Css(r#"input[name="email"]"#.to_string())
        );
    }

    #[test]
    fn test_comma_list_becomes_ordered_alternatives() {
        let sel = Selector::from(r#"input[name="email"], input[id="j_username"]"#);
        assert_eq!(
            sel,
            Selector::Or(vec![
                Selector::Css(r#"input[name="email"]"#.to_string()),
                Selector::Css(r#"input[id="j_username"]"#.to_string()),
            ])
        );
    }

    #[test]
    fn test_commas_inside_quotes_do_not_split() {
        let sel = Selector::from(r#"a:has-text("Hello, world"), [aria-label*="a,b"]"#);
        assert_eq!(
            sel,
            Selector::Or(vec![
                Selector::HasText {
                    scope: "a".to_string(),
                    text: "Hello, world".to_string()
                },
                Selector::Css(r#"[aria-label*="a,b"]"#.to_string()),
            ])
        );
    }

    #[test]
    fn test_has_text_with_unicode() {
        assert_eq!(
            Selector::from(r#"button:has-text("转到您的试用账户")"#),
            Selector::HasText {
                scope: "button".to_string(),
                text: "转到您的试用账户".to_string()
            }
        );
    }

    #[test]
    fn test_empty_selector_is_invalid() {
        assert!(matches!(Selector::from("  , "), Selector::Invalid(_)));
        assert_eq!(Selector::from("").to_js(), "null");
    }

    #[test]
    fn test_js_quotes_are_escaped() {
        let js = Selector::from(r#"input[name="email"]"#).to_js();
        assert_eq!(js, r#"document.querySelector("input[name=\"email\"]")"#);
    }

    #[test]
    fn test_display_round_trips_lists() {
        let raw = r#"#truste-consent-button, .consent-button"#;
        assert_eq!(Selector::from(raw).to_string(), raw);
    }
}
