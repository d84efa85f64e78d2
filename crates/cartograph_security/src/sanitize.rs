//! Idempotent text normalisation applied after validation, before prompt
//! embedding. For every sanitiser, `f(f(x)) == f(x)`.

use serde_json::{Map, Value};

/// Zero-width and directional format characters stripped from descriptions.
const INVISIBLE_CHARS: [char; 8] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{200E}', '\u{200F}', '\u{2028}', '\u{2029}', '\u{FEFF}',
];

/// Normalise a procedure name: trim, drop control characters, replace
/// anything outside `[a-zA-Z0-9 \-_()]` with `_`, collapse whitespace runs.
pub fn sanitize_name(name: &str) -> String {
    let mapped: String = name
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();

    collapse_spaces(mapped.trim())
}

/// Normalise a description while preserving paragraph structure: strip
/// control characters except `\n`/`\t`/`\r`, strip invisible format
/// characters, cap blank runs at one empty line, collapse intra-line
/// whitespace, and trim each line.
pub fn sanitize_description(description: &str) -> String {
    let cleaned: String = description
        .trim()
        .chars()
        .filter(|c| {
            if INVISIBLE_CHARS.contains(c) {
                return false;
            }
            !c.is_control() || matches!(c, '\n' | '\t' | '\r')
        })
        .collect();

    let lines: Vec<String> = cleaned
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(|line| collapse_spaces(line.trim()))
        .collect();

    // Cap runs of blank lines at one (i.e. three-or-more newlines become two).
    let mut out = Vec::with_capacity(lines.len());
    let mut blank_run = 0usize;
    for line in lines {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }

    out.join("\n")
}

/// Sanitise an ordered step sequence for prompt embedding.
///
/// Non-scalar values are dropped, strings lose control characters, and
/// scheme-less `url` fields get `https://` prepended.
pub fn sanitize_steps(steps: &[Value]) -> Vec<Value> {
    steps.iter().map(sanitize_step).collect()
}

fn sanitize_step(step: &Value) -> Value {
    let Some(object) = step.as_object() else {
        return step.clone();
    };

    let mut out = Map::with_capacity(object.len());
    for (key, value) in object {
        match value {
            Value::String(text) => {
                let mut cleaned: String = text.chars().filter(|c| !c.is_control()).collect();
                if key == "url" && !cleaned.is_empty() {
                    cleaned = ensure_url_scheme(&cleaned);
                }
                out.insert(key.clone(), Value::String(cleaned));
            }
            Value::Number(_) | Value::Bool(_) => {
                out.insert(key.clone(), value.clone());
            }
            // Arrays, objects and nulls are not recognised scalars.
            _ => {}
        }
    }
    Value::Object(out)
}

fn ensure_url_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if c == ' ' || c == '\t' {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            in_run = false;
            out.push(c);
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn name_replaces_forbidden_characters() {
        assert_eq!(sanitize_name("Login <flow>!"), "Login _flow__");
        assert_eq!(sanitize_name("  spaced   out  "), "spaced out");
        assert_eq!(sanitize_name("ok-name (v2)_final"), "ok-name (v2)_final");
    }

    #[test]
    fn name_sanitisation_is_idempotent() {
        for raw in ["Weird\u{0007} name!", "  a   b  ", "<x/>", "плюс unicode"] {
            let once = sanitize_name(raw);
            assert_eq!(sanitize_name(&once), once);
        }
    }

    #[test]
    fn description_caps_blank_runs() {
        let raw = "para one\n\n\n\n\npara two";
        assert_eq!(sanitize_description(raw), "para one\n\npara two");
    }

    #[test]
    fn description_collapses_intra_line_runs_and_trims_lines() {
        let raw = "  first   line  \n   second\t\tline   ";
        assert_eq!(sanitize_description(raw), "first line\nsecond line");
    }

    #[test]
    fn description_strips_invisible_characters() {
        let raw = "before\u{200B}\u{FEFF}after";
        assert_eq!(sanitize_description(raw), "beforeafter");
    }

    #[test]
    fn description_sanitisation_is_idempotent() {
        for raw in [
            "a\n\n\n\nb",
            "  x \u{0000} y  ",
            "line\r\nline\rline",
            "tabs\t\there",
        ] {
            let once = sanitize_description(raw);
            assert_eq!(sanitize_description(&once), once);
        }
    }

    #[test]
    fn steps_drop_non_scalar_values() {
        let steps = vec![json!({
            "action": "click",
            "selector": "#go",
            "retries": 3,
            "force": true,
            "metadata": {"nested": "object"},
            "tags": ["a", "b"],
            "missing": null
        })];
        let out = sanitize_steps(&steps);
        let object = out[0].as_object().unwrap();
        assert_eq!(object.get("retries"), Some(&json!(3)));
        assert_eq!(object.get("force"), Some(&json!(true)));
        assert!(!object.contains_key("metadata"));
        assert!(!object.contains_key("tags"));
        assert!(!object.contains_key("missing"));
    }

    #[test]
    fn scheme_less_urls_get_https() {
        let steps = vec![json!({"action": "navigate", "url": "app.example.com/login"})];
        let out = sanitize_steps(&steps);
        assert_eq!(out[0]["url"], "https://app.example.com/login");

        let steps = vec![json!({"action": "navigate", "url": "http://plain.example.com"})];
        let out = sanitize_steps(&steps);
        assert_eq!(out[0]["url"], "http://plain.example.com");
    }

    #[test]
    fn step_sanitisation_is_idempotent() {
        let steps = vec![json!({
            "action": "navigate",
            "url": "app.example.com",
            "note": "has\u{0007}control"
        })];
        let once = sanitize_steps(&steps);
        let twice = sanitize_steps(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn step_order_is_preserved() {
        let steps = vec![
            json!({"action": "navigate", "url": "https://a"}),
            json!({"action": "click", "selector": "#b"}),
            json!({"action": "screenshot", "value": "c.png"}),
        ];
        let out = sanitize_steps(&steps);
        let actions: Vec<&str> = out
            .iter()
            .map(|s| s["action"].as_str().unwrap())
            .collect();
        assert_eq!(actions, vec!["navigate", "click", "screenshot"]);
    }
}
