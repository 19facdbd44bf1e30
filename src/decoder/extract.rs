use serde_json::{Map, Value};

const SENTINELS: [&str; 2] = ["<|begin_of_box|>", "<|end_of_box|>"];

pub fn strip_sentinels(text: &str) -> String {
    SENTINELS
        .iter()
        .fold(text.to_string(), |acc, s| acc.replace(s, ""))
}

/// Return the first balanced `{...}` object in `text`.
///
/// Braces inside string literals are ignored. An object that never closes
/// yields everything from its opening brace to the end, so the JSON parser
/// reports the real error instead of "no JSON".
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    Some(&text[start..])
}

/// Look up the first key in `keys` present in `map`; exact names win over
/// case-insensitive matches.
pub fn fuzzy_get<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| map.get(*k)).or_else(|| {
        keys.iter().find_map(|k| {
            map.iter()
                .find(|(mk, _)| mk.eq_ignore_ascii_case(k))
                .map(|(_, v)| v)
        })
    })
}
