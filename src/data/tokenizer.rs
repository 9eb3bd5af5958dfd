//! Field splitting for CSV/TSV-like lines

use std::borrow::Cow;
use std::io::{Cursor, SeekFrom};

use csv::{Position, Reader, ReaderBuilder, StringRecord};

/// Separators tried, in order, when none is configured
pub const CANDIDATE_SEPARATORS: [char; 4] = ['\t', ',', ';', ' '];

/// Pick the separator of a list from one of its lines
pub fn detect_separator(line: &str) -> Option<char> {
    CANDIDATE_SEPARATORS
        .iter()
        .copied()
        .find(|separator| line.contains(*separator))
}

/// Splits single lines into fields with a `csv` reader.
///
/// With balanced quotes enabled, separators between double quotes are part
/// of the field, the surrounding quotes are removed and `""` stands for a
/// literal quote. Without them a quote is an ordinary character.
///
/// Lines, comments and line numbers are tracked by the caller, so the reader
/// is rewound onto every new line instead of streaming the whole file.
pub struct FieldSplitter {
    reader: Reader<Cursor<Vec<u8>>>,
    record: StringRecord,
}

impl FieldSplitter {
    /// `separator` must be a single ASCII character
    pub fn new(separator: u8, balanced_quotes: bool) -> Self {
        let reader = ReaderBuilder::new()
            .delimiter(separator)
            .quoting(balanced_quotes)
            .has_headers(false)
            .flexible(true)
            .buffer_capacity(1 << 12)
            .from_reader(Cursor::new(Vec::new()));
        Self {
            reader,
            record: StringRecord::new(),
        }
    }

    /// Split one line, given without its terminator
    pub fn split(&mut self, line: &str) -> Result<Vec<&str>, String> {
        {
            let buffer = self.reader.get_mut().get_mut();
            buffer.clear();
            buffer.extend_from_slice(line.as_bytes());
        }
        self.reader
            .seek_raw(SeekFrom::Start(0), Position::new())
            .map_err(|error| error.to_string())?;

        if !self.reader.read_record(&mut self.record).map_err(|error| error.to_string())? {
            // Only an empty line holds no record
            return Ok(vec![""]);
        }
        let mut rest = StringRecord::new();
        if self.reader.read_record(&mut rest).map_err(|error| error.to_string())? {
            return Err(format!("the line `{}` holds a stray line break", line.escape_debug()));
        }
        Ok(self.record.iter().collect())
    }
}

/// Apply the name normalisations requested for a list
pub fn normalize_name(name: &str, remove_chevrons: bool, remove_spaces: bool) -> Cow<'_, str> {
    let mut name = Cow::Borrowed(name);
    if remove_chevrons {
        if let Some(inner) = name.strip_prefix('<').and_then(|n| n.strip_suffix('>')) {
            name = Cow::Owned(inner.to_string());
        }
    }
    if remove_spaces && name.contains(' ') {
        name = Cow::Owned(name.replace(' ', ""));
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_first_candidate_present() {
        assert_eq!(detect_separator("a\tb,c"), Some('\t'));
        assert_eq!(detect_separator("a,b"), Some(','));
        assert_eq!(detect_separator("a b"), Some(' '));
        assert_eq!(detect_separator("single"), None);
    }

    #[test]
    fn plain_split_keeps_empty_fields() {
        let mut splitter = FieldSplitter::new(b',', false);
        assert_eq!(splitter.split("a,,c").unwrap(), vec!["a", "", "c"]);
        assert_eq!(splitter.split("d,e").unwrap(), vec!["d", "e"]);
    }

    #[test]
    fn quoted_separator_stays_in_field() {
        let mut splitter = FieldSplitter::new(b',', true);
        let fields = splitter.split(r#""Smith, J.",knows,"say ""hi""""#).unwrap();
        assert_eq!(fields, vec!["Smith, J.", "knows", "say \"hi\""]);
    }

    #[test]
    fn quotes_are_plain_characters_without_quote_support() {
        let mut splitter = FieldSplitter::new(b',', false);
        assert_eq!(splitter.split(r#""open,closed"#).unwrap(), vec!["\"open", "closed"]);
    }

    #[test]
    fn every_line_is_split_from_a_clean_state() {
        let mut splitter = FieldSplitter::new(b'\t', true);
        assert_eq!(splitter.split("a\t\"b").unwrap().len(), 2);
        assert_eq!(splitter.split("c\td\te").unwrap(), vec!["c", "d", "e"]);
        assert!(splitter.split("f\rg").is_err());
    }

    #[test]
    fn normalisation_strips_chevrons_and_spaces() {
        assert_eq!(normalize_name("<http://x.org/a>", true, false), "http://x.org/a");
        assert_eq!(normalize_name("<partial", true, false), "<partial");
        assert_eq!(normalize_name("New York", false, true), "NewYork");
        assert!(matches!(normalize_name("plain", true, true), Cow::Borrowed(_)));
    }
}
