// src/template.rs
// `{field}` path patterns rendered against sanitized tag values
use crate::error::TemplateError;
use crate::tags::TrackMetadata;
use std::path::{Path, PathBuf};

/// Replace filesystem-invalid characters with `_` and trim the edges.
/// A value made only of dots becomes underscores so it cannot name `.` or `..`.
pub fn sanitize_filename(s: &str) -> String {
    let cleaned = s
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string();

    if !cleaned.is_empty() && cleaned.chars().all(|c| c == '.') {
        "_".repeat(cleaned.len())
    } else {
        cleaned
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed path pattern. Braces are checked up front; field names are
/// only checked when rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// `{{` and `}}` produce literal braces.
    pub fn parse(pattern: &str) -> Result<Self, TemplateError> {
        if pattern.trim().is_empty() {
            return Err(TemplateError::EmptyPattern);
        }
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        name.push(inner);
                    }
                    if !closed {
                        return Err(TemplateError::UnclosedBrace(pos));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name));
                }
                '}' => return Err(TemplateError::StrayBrace(pos)),
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Placeholder names in order of appearance.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Relative path with every placeholder substituted.
    pub fn render_relative(&self, metadata: &TrackMetadata) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = metadata
                        .field(name)
                        .ok_or_else(|| TemplateError::InvalidPlaceholder(name.clone()))?;
                    out.push_str(&sanitize_filename(value));
                }
            }
        }
        Ok(out)
    }

    pub fn render(&self, base_output_dir: &Path, metadata: &TrackMetadata) -> Result<PathBuf, TemplateError> {
        Ok(base_output_dir.join(self.render_relative(metadata)?))
    }
}

/// Parse and render in one go.
pub fn render(template: &str, base_output_dir: &Path, metadata: &TrackMetadata) -> Result<PathBuf, TemplateError> {
    PathTemplate::parse(template)?.render(base_output_dir, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{FIELD_NAMES, UNKNOWN};

    fn metadata() -> TrackMetadata {
        TrackMetadata {
            artist: "J.K. Rowling".to_string(),
            title: "Philosophers Stone".to_string(),
            album: "Harry Potter".to_string(),
            track_number: "1".to_string(),
            year: "1997".to_string(),
            genre: "Fantasy".to_string(),
            extension: "mp3".to_string(),
        }
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Book: Part 1"), "Book_ Part 1");
        assert_eq!(sanitize_filename("Book/Part\\2"), "Book_Part_2");
        assert_eq!(sanitize_filename("Book<Test>"), "Book_Test_");
        assert_eq!(sanitize_filename("  Why? \"Because\" |*  "), "Why_ _Because_ __");
    }

    #[test]
    fn test_dot_only_values_stay_inside_output_dir() {
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename(" . "), "_");
        assert_eq!(sanitize_filename("J.K."), "J.K.");
        assert_eq!(sanitize_filename("...And Justice"), "...And Justice");

        let sneaky = TrackMetadata {
            artist: "..".to_string(),
            album: ".".to_string(),
            ..metadata()
        };
        let path = render("{artist}/{album}/{title}.{ext}", Path::new("/out"), &sneaky).unwrap();
        assert_eq!(path, PathBuf::from("/out/__/_/Philosophers Stone.mp3"));
        assert!(path.components().all(|c| !matches!(c, std::path::Component::ParentDir | std::path::Component::CurDir)));
    }

    #[test]
    fn test_render_basic() {
        let path = render("{artist}/{title}.{ext}", Path::new("/out"), &metadata()).unwrap();
        assert_eq!(path, PathBuf::from("/out/J.K. Rowling/Philosophers Stone.mp3"));
    }

    #[test]
    fn test_render_default_pattern() {
        let path = render(crate::config::DEFAULT_PATTERN, Path::new("/out"), &metadata()).unwrap();
        assert_eq!(
            path,
            PathBuf::from("/out/J.K. Rowling/Harry Potter/Philosophers Stone/Philosophers Stone.mp3")
        );
    }

    #[test]
    fn test_every_field_is_available_on_unknown_records() {
        let pattern: String = FIELD_NAMES.iter().map(|f| format!("{{{}}}", f)).collect::<Vec<_>>().join("-");
        let rendered = PathTemplate::parse(&pattern)
            .unwrap()
            .render_relative(&TrackMetadata::unknown("m4b"))
            .unwrap();
        assert_eq!(rendered, format!("{0}-{0}-{0}-{0}-{0}-{0}-m4b", UNKNOWN));
    }

    #[test]
    fn test_substituted_values_are_sanitized() {
        let nasty = TrackMetadata {
            artist: "AC/DC <live>".to_string(),
            title: "What? \"Now\" | Then*\\:".to_string(),
            ..metadata()
        };
        let rendered = PathTemplate::parse("{artist}|{title}")
            .unwrap()
            .render_relative(&nasty)
            .unwrap();
        let (artist, title) = rendered.split_once('|').unwrap();
        for segment in [artist, title] {
            assert!(!segment.contains(['<', '>', ':', '"', '/', '\\', '|', '?', '*']), "{}", segment);
        }
    }

    #[test]
    fn test_invalid_placeholder() {
        let err = render("{author}/{title}", Path::new("/out"), &metadata()).unwrap_err();
        assert_eq!(err, TemplateError::InvalidPlaceholder("author".to_string()));
        assert_eq!(err.to_string(), "Invalid placeholder {author} in pattern");
    }

    #[test]
    fn test_brace_errors_and_escapes() {
        assert_eq!(PathTemplate::parse("{artist/x"), Err(TemplateError::UnclosedBrace(0)));
        assert_eq!(PathTemplate::parse("a}b"), Err(TemplateError::StrayBrace(1)));
        assert_eq!(PathTemplate::parse("  "), Err(TemplateError::EmptyPattern));

        let rendered = PathTemplate::parse("{{{title}}}")
            .unwrap()
            .render_relative(&metadata())
            .unwrap();
        assert_eq!(rendered, "{Philosophers Stone}");
    }

    #[test]
    fn test_render_is_idempotent() {
        let template = PathTemplate::parse("{artist}/{album}/{tracknumber} - {title}.{ext}").unwrap();
        let first = template.render(Path::new("/out"), &metadata()).unwrap();
        let second = template.render(Path::new("/out"), &metadata()).unwrap();
        assert_eq!(first, second);
        assert_eq!(template.fields().collect::<Vec<_>>(), vec!["artist", "album", "tracknumber", "title", "ext"]);
    }
}
