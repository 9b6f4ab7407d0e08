//! `%KEY%` placeholder templates

/// Replaces every `%KEY%` in a template
pub fn render(template: &str, replacements: &[(&str, String)]) -> String {
    replacements
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("%{}%", key), value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_leaves_unknown_keys() {
        let rendered = render(
            "a: %A%\nb: %B%\nc: %C%\n",
            &[("A", "1".to_string()), ("B", "%A%".to_string())],
        );
        assert_eq!(rendered, "a: 1\nb: %A%\nc: %C%\n");
    }
}
