//! Debian control paragraphs.
//!
//! A control file is a sequence of paragraphs separated by blank lines.
//! Each paragraph is an ordered list of `Name: value` fields; a value may
//! span several lines, continuation lines starting with a space and an
//! empty line being written as ` .`.
//!
//! ```
//! use debarchive_schema::control::{Paragraph, ParagraphReader};
//!
//! let text = "Package: hello\nDescription: greeter\n classic program\n";
//! let mut reader = ParagraphReader::new(text.as_bytes());
//! let para = reader.read_paragraph().unwrap().unwrap();
//! assert_eq!(para.get("package"), Some("hello"));
//! assert_eq!(para.get("Description"), Some("greeter\nclassic program"));
//! ```

use std::fmt;
use std::io::{self, BufRead, Write};

use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

/// Errors produced while decoding control text.
#[derive(Error, Debug)]
pub enum ControlError {
    /// The underlying reader failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A continuation line appeared before any field in the paragraph.
    #[error("line {line}: continuation line without a field")]
    OrphanContinuation {
        /// 1-based line number.
        line: usize,
    },

    /// A line that is neither a field nor a continuation.
    #[error("line {line}: expected `Name: value`, got {content:?}")]
    MalformedLine {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        content: String,
    },

    /// A field name was empty or contained whitespace.
    #[error("line {line}: invalid field name {name:?}")]
    InvalidName {
        /// 1-based line number.
        line: usize,
        /// The rejected name.
        name: String,
    },

    /// The same field occurred twice in one paragraph.
    #[error("line {line}: duplicate field {name}")]
    DuplicateField {
        /// 1-based line number.
        line: usize,
        /// Field name as spelled on the second occurrence.
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    name: String,
    value: String,
}

/// One control paragraph: ordered fields with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    fields: Vec<Field>,
}

impl Paragraph {
    /// Create an empty paragraph.
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Look up a field value by name, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.fields[i].value.as_str())
    }

    /// Whether a field is present.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Set a field. An existing field keeps its position (and spelling);
    /// a new one is appended.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.fields[i].value = value,
            None => self.fields.push(Field { name, value }),
        }
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.fields.remove(i).value)
    }

    /// Iterate `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|f| (f.name.as_str(), f.value.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the paragraph has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Encode the paragraph, one line per field line, each ending in `\n`.
    ///
    /// Blank and whitespace-only value lines are written as ` .` and so
    /// decode as empty lines.
    ///
    /// # Errors
    ///
    /// Propagates write failures. A value line consisting of a lone `.`
    /// has no encoding; such a paragraph is rejected with
    /// [`io::ErrorKind::InvalidData`] before anything is written.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        self.check_encodable()?;
        self.encode(out)
    }

    fn check_encodable(&self) -> io::Result<()> {
        for field in &self.fields {
            if field.value.split('\n').skip(1).any(|line| line.trim() == ".") {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("field {}: a lone `.` line cannot be encoded", field.name),
                ));
            }
        }
        Ok(())
    }

    fn encode<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        for field in &self.fields {
            let mut lines = field.value.split('\n');
            match lines.next() {
                Some(first) if !first.is_empty() => writeln!(out, "{}: {first}", field.name)?,
                _ => writeln!(out, "{}:", field.name)?,
            }
            for line in lines {
                if line.trim().is_empty() {
                    out.write_all(b" .\n")?;
                } else {
                    writeln!(out, " {line}")?;
                }
            }
        }
        Ok(())
    }
}

/// Same text as [`Paragraph::write_to`], except that a lone `.` line is
/// shown as ` .` instead of failing.
impl fmt::Display for Paragraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        self.encode(&mut buf).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Paragraph {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut para = Paragraph::new();
        for (name, value) in iter {
            para.set(name, value);
        }
        para
    }
}

impl Serialize for Paragraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in &self.fields {
            map.serialize_entry(&field.name, &field.value)?;
        }
        map.end()
    }
}

/// Streaming decoder yielding one [`Paragraph`] at a time.
#[derive(Debug)]
pub struct ParagraphReader<R> {
    reader: R,
    line_no: usize,
    buf: String,
}

impl<R: BufRead> ParagraphReader<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
        }
    }

    /// Decode the next paragraph, or `None` once the input is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] on I/O failure or malformed text.
    pub fn read_paragraph(&mut self) -> Result<Option<Paragraph>, ControlError> {
        let mut para = Paragraph::new();

        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                break;
            }
            self.line_no += 1;
            let line = self.buf.trim_end_matches(['\n', '\r']);

            if line.trim().is_empty() {
                if para.is_empty() {
                    continue;
                }
                break;
            }
            if line.starts_with('#') {
                continue;
            }

            if line.starts_with([' ', '\t']) {
                let Some(field) = para.fields.last_mut() else {
                    return Err(ControlError::OrphanContinuation { line: self.line_no });
                };
                let content = &line[1..];
                field.value.push('\n');
                if content.trim() != "." {
                    field.value.push_str(content);
                }
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(ControlError::MalformedLine {
                    line: self.line_no,
                    content: line.to_string(),
                });
            };
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(ControlError::InvalidName {
                    line: self.line_no,
                    name: name.to_string(),
                });
            }
            if para.contains(name) {
                return Err(ControlError::DuplicateField {
                    line: self.line_no,
                    name: name.to_string(),
                });
            }
            para.fields.push(Field {
                name: name.to_string(),
                value: value.trim().to_string(),
            });
        }

        Ok((!para.is_empty()).then_some(para))
    }

    /// Consume the decoder, returning the wrapped reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: BufRead> Iterator for ParagraphReader<R> {
    type Item = Result<Paragraph, ControlError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_paragraph().transpose()
    }
}

/// Encoder writing paragraphs separated by a single blank line.
#[derive(Debug)]
pub struct ParagraphWriter<W> {
    writer: W,
    written: usize,
}

impl<W: Write> ParagraphWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Encode one paragraph.
    ///
    /// # Errors
    ///
    /// Propagates write failures of the wrapped writer. A paragraph that
    /// [`Paragraph::write_to`] rejects leaves the output untouched.
    pub fn write(&mut self, para: &Paragraph) -> io::Result<()> {
        para.check_encodable()?;
        if self.written > 0 {
            self.writer.write_all(b"\n")?;
        }
        para.encode(&mut self.writer)?;
        self.written += 1;
        Ok(())
    }

    /// Number of paragraphs written so far.
    pub fn count(&self) -> usize {
        self.written
    }

    /// Borrow the wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Flush and return the wrapped writer.
    ///
    /// # Errors
    ///
    /// Propagates the flush failure.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PARAGRAPHS: &str = "\
# leading comment
Package: hello
Version: 2.10-3
Description: example package based on GNU hello
 The GNU hello program produces a familiar, friendly greeting.
 .
 It allows non-programmers to use a classic computer science tool.


Package: world
Depends: libc6 (>= 2.34),
 hello
";

    fn read_all(text: &str) -> Vec<Paragraph> {
        ParagraphReader::new(text.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_reads_paragraphs_and_continuations() {
        let paras = read_all(TWO_PARAGRAPHS);
        assert_eq!(paras.len(), 2);

        let hello = &paras[0];
        assert_eq!(hello.get("Package"), Some("hello"));
        assert_eq!(hello.get("VERSION"), Some("2.10-3"));
        assert_eq!(
            hello.get("description"),
            Some(
                "example package based on GNU hello\n\
                 The GNU hello program produces a familiar, friendly greeting.\n\
                 \n\
                 It allows non-programmers to use a classic computer science tool."
            )
        );
        assert_eq!(paras[1].get("Depends"), Some("libc6 (>= 2.34),\nhello"));
    }

    #[test]
    fn test_write_then_read_is_stable() {
        let paras = read_all(TWO_PARAGRAPHS);
        let mut writer = ParagraphWriter::new(Vec::new());
        for p in &paras {
            writer.write(p).unwrap();
        }
        assert_eq!(writer.count(), 2);
        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.contains("\n .\n"));
        assert!(text.contains("greeting.\n .\n It allows"));
        assert!(text.contains("tool.\n\nPackage: world\n"));
        assert_eq!(read_all(&text), paras);
    }

    #[test]
    fn test_empty_first_line_round_trips() {
        let mut para = Paragraph::new();
        para.set("SHA256", "\nabc 1 main/Packages\ndef 2 contrib/Packages");
        let text = para.to_string();
        assert_eq!(text, "SHA256:\n abc 1 main/Packages\n def 2 contrib/Packages\n");
        assert_eq!(read_all(&text), vec![para]);
    }

    #[test]
    fn test_whitespace_only_line_does_not_split_paragraph() {
        let mut para = Paragraph::new();
        para.set("Package", "foo");
        para.set("Description", "synopsis\n  \n\t\nmore text");
        let mut writer = ParagraphWriter::new(Vec::new());
        writer.write(&para).unwrap();
        writer.write(&[("Package", "bar")].into_iter().collect()).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(
            text,
            "Package: foo\nDescription: synopsis\n .\n .\n more text\n\nPackage: bar\n"
        );

        let paras = read_all(&text);
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0].get("Description"), Some("synopsis\n\n\nmore text"));
        assert_eq!(paras[1].get("Package"), Some("bar"));
    }

    #[test]
    fn test_lone_dot_line_is_rejected() {
        let mut para = Paragraph::new();
        para.set("Package", "foo");
        para.set("Description", "synopsis\n.\nmore text");
        let mut out = Vec::new();
        let err = para.write_to(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(out.is_empty());

        para.set("Description", "synopsis\n . \nmore text");
        assert!(para.write_to(&mut Vec::new()).is_err());

        // dots inside a line are ordinary text
        para.set("Description", "synopsis\n...\n.profile");
        let text = para.to_string();
        assert_eq!(read_all(&text), vec![para]);
    }

    #[test]
    fn test_set_keeps_position_and_remove() {
        let mut para: Paragraph = [("A", "1"), ("B", "2"), ("C", "3")].into_iter().collect();
        para.set("b", "two");
        para.set("D", "4");
        let names: Vec<_> = para.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["A", "B", "C", "D"]);
        assert_eq!(para.get("B"), Some("two"));

        assert_eq!(para.remove("c"), Some("3".to_string()));
        assert_eq!(para.len(), 3);
        assert!(!para.contains("C"));
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert!(read_all("").is_empty());
        assert!(read_all("\n\n   \n").is_empty());
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = ParagraphReader::new(" orphan\n".as_bytes())
            .read_paragraph()
            .unwrap_err();
        assert!(matches!(err, ControlError::OrphanContinuation { line: 1 }));

        let err = ParagraphReader::new("Package: a\nnot a field\n".as_bytes())
            .read_paragraph()
            .unwrap_err();
        assert!(matches!(err, ControlError::MalformedLine { line: 2, .. }));

        let err = ParagraphReader::new("Package: a\npackage: b\n".as_bytes())
            .read_paragraph()
            .unwrap_err();
        assert!(matches!(err, ControlError::DuplicateField { line: 2, .. }));

        let err = ParagraphReader::new(": empty\n".as_bytes())
            .read_paragraph()
            .unwrap_err();
        assert!(matches!(err, ControlError::InvalidName { line: 1, .. }));
    }

    #[test]
    fn test_serializes_in_field_order() {
        let para: Paragraph = [("Package", "zsh"), ("Architecture", "amd64")]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&para).unwrap();
        assert_eq!(json, r#"{"Package":"zsh","Architecture":"amd64"}"#);
    }
}
