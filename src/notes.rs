//! Markdown notes with Jekyll front matter, ready for the Contents API.

use chrono::{DateTime, Utc};

/// A rendered note and the repository path it belongs at.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNote {
    pub path: String,
    pub content: String,
}

/// Lowercase, collapse every run of non `[a-z0-9]` into `-`, trim dashes.
pub fn slugify(title: &str, now: DateTime<Utc>) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        format!("note-{}", now.format("%H%M%S"))
    } else {
        slug
    }
}

/// Line breaks become spaces so a value never spans front matter lines.
fn single_line(value: &str) -> String {
    value.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

/// YAML double-quoted scalar.
fn quote(value: &str) -> String {
    let escaped = single_line(value).replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Build `_posts/<date>-<slug>.md` with front matter followed by `body`.
pub fn render_note(
    title: &str,
    body: &str,
    tags: &str,
    layout: &str,
    now: DateTime<Utc>,
) -> RenderedNote {
    let path = format!("_posts/{}-{}.md", now.format("%Y-%m-%d"), slugify(title, now));

    let mut content = String::from("---\n");
    content.push_str(&format!("layout: {}\n", single_line(layout).trim()));
    content.push_str(&format!("title: {}\n", quote(title)));
    content.push_str(&format!("date: {}\n", now.to_rfc3339()));

    let tags: Vec<String> = tags
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(quote)
        .collect();
    if !tags.is_empty() {
        content.push_str(&format!("tags: [{}]\n", tags.join(", ")));
    }
    content.push_str("---\n\n");
    content.push_str(body);
    content.push('\n');

    RenderedNote { path, content }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!", at()), "hello-world");
        assert_eq!(slugify("  --Rust 2024--  ", at()), "rust-2024");
        assert_eq!(slugify("Ação rápida", at()), "a-o-r-pida");
        assert_eq!(slugify("!!!", at()), "note-140507");
    }

    #[test]
    fn test_render_note_with_tags() {
        let note = render_note("My \"Big\" Idea", "# Body", "rust, notes ,", "post", at());
        assert_eq!(note.path, "_posts/2024-06-09-my-big-idea.md");
        assert_eq!(
            note.content,
            "---\nlayout: post\ntitle: \"My \\\"Big\\\" Idea\"\ndate: 2024-06-09T14:05:07+00:00\n\
             tags: [\"rust\", \"notes\"]\n---\n\n# Body\n"
        );
    }

    #[test]
    fn test_front_matter_escapes_backslashes_and_newlines() {
        let note = render_note("C:\\temp\nsecond \"line\"", "body", "a\\b", "po\nst", at());
        let front: Vec<&str> = note.content.lines().take(6).collect();
        assert_eq!(front[1], "layout: po st");
        assert_eq!(front[2], r#"title: "C:\\temp second \"line\"""#);
        assert_eq!(front[4], r#"tags: ["a\\b"]"#);
        assert_eq!(front[5], "---");
    }

    #[test]
    fn test_render_note_without_tags() {
        let note = render_note("Plain", "text", "", "page", at());
        assert!(!note.content.contains("tags:"));
        assert!(note.content.starts_with("---\nlayout: page\n"));
        assert!(note.content.ends_with("---\n\ntext\n"));
    }
}
