//! Literal `${TOKEN}` substitution over template documents.
//!
//! This is plain text replacement, not a templating language: every
//! template carries a fixed token vocabulary and unknown tokens are left
//! untouched.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::Result;

/// Replaces every `${NAME}` occurrence with its value.
pub fn render(template: &str, tokens: &[(&str, String)]) -> String {
    let mut rendered = template.to_string();
    for (name, value) in tokens {
        rendered = rendered.replace(&format!("${{{}}}", name), value);
    }
    rendered
}

/// Writes text with the target platform's line terminator.
pub fn write_text(path: &Path, content: &str, newline: &str) -> io::Result<()> {
    if newline == "\n" {
        fs::write(path, content)
    } else {
        fs::write(path, content.replace('\n', newline))
    }
}

/// Renders a template file to the output path and returns the rendered
/// text for further parsing.
pub fn render_to_file(
    template_path: &Path,
    out_path: &Path,
    tokens: &[(&str, String)],
    newline: &str,
) -> Result<String> {
    let template = fs::read_to_string(template_path)?;
    let rendered = render(&template, tokens);
    write_text(out_path, &rendered, newline)?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_all_occurrences() {
        let rendered = render(
            "image: ${IMAGE}\nalso: ${IMAGE}\nsite: ${SITE}",
            &[
                ("IMAGE", "registry/publisher:1.0".to_string()),
                ("SITE", "plant-a".to_string()),
            ],
        );
        assert_eq!(
            rendered,
            "image: registry/publisher:1.0\nalso: registry/publisher:1.0\nsite: plant-a"
        );
    }

    #[test]
    fn leaves_unknown_tokens_untouched() {
        let rendered = render("${KNOWN} ${UNKNOWN}", &[("KNOWN", "x".to_string())]);
        assert_eq!(rendered, "x ${UNKNOWN}");
    }

    #[test]
    fn empty_value_erases_the_token() {
        let rendered = render("cmd ${OPTION} --flag", &[("OPTION", String::new())]);
        assert_eq!(rendered, "cmd  --flag");
    }

    #[test]
    fn windows_newlines_applied_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.yml");
        write_text(&path, "a\nb\n", "\r\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\r\nb\r\n");
    }
}
