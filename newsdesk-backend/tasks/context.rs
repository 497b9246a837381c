use std::collections::HashMap;

/// Replace every `{{key}}` in `template` with its value. Unknown
/// placeholders are left as they are.
pub fn render_prompt(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{{{key}}}}}");
        result = result.replace(&placeholder, value);
    }
    result
}

/// Cut `text` to at most `max` bytes on a char boundary, appending an
/// ellipsis when something was dropped.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let cut = text[..end]
        .rfind(char::is_whitespace)
        .filter(|i| *i > end / 2)
        .unwrap_or(end);
    format!("{}...", text[..cut].trim_end())
}
