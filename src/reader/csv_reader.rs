//! Delimited and fixed-width text reader
//!
//! Turns physical lines into rows of string fields: quote and escape
//! handling, multi-line quoted values, header resolution and the optional
//! skipping of unparseable lines.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, trace};

use super::{BufLines, LineSource, RowSource};
use crate::config::{CsvConfig, QuoteStyle};
use crate::error::{CsvError, Result};
use crate::types::DEFAULT_COLUMN_SIZE;

/// Splits one logical line into fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tokenizer {
    pub separator: char,
    pub quote_char: char,
    pub quote_style: QuoteStyle,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            separator: ',',
            quote_char: '"',
            quote_style: QuoteStyle::Sql,
        }
    }
}

impl Tokenizer {
    /// Parse a line whose quoted values all close on the same line.
    pub fn parse_line(&self, line: &str) -> Result<Vec<String>> {
        self.parse_logical(line, false, &mut || Ok(None))
    }

    /// Parse a logical line. When a quoted value is still open at the end of
    /// a physical line, `more` supplies the next one and the value continues
    /// after a `\n`.
    pub(crate) fn parse_logical(
        &self,
        line: &str,
        trim: bool,
        more: &mut dyn FnMut() -> Result<Option<String>>,
    ) -> Result<Vec<String>> {
        let finish = |value: &str| {
            if trim {
                value.trim().to_string()
            } else {
                value.to_string()
            }
        };

        let mut values = Vec::new();
        let mut value = String::with_capacity(32);
        let mut in_quotes = false;
        let mut chunk: Vec<char> = line.chars().collect();

        loop {
            // fields are separator-terminated
            chunk.push(self.separator);
            let mut pos = 0;
            while pos < chunk.len() {
                let c = chunk[pos];
                if value.is_empty() && c == self.quote_char && !in_quotes {
                    in_quotes = true;
                } else if c == '\\' && self.quote_style == QuoteStyle::C {
                    if let Some(&escaped) = chunk.get(pos + 1) {
                        value.push(escaped);
                    }
                    pos += 1;
                } else if c == self.quote_char {
                    let next = chunk.get(pos + 1).copied();
                    if !in_quotes {
                        // a quote inside an unquoted value is literal
                        value.push(c);
                    } else if next == Some(self.quote_char) {
                        value.push(c);
                        if self.quote_style == QuoteStyle::Sql {
                            pos += 1;
                        }
                    } else {
                        if next != Some(self.separator) {
                            return Err(CsvError::MalformedQuote {
                                separator: self.separator,
                                position: pos + 1,
                                line: line.to_string(),
                            });
                        }
                        values.push(finish(&value));
                        value.clear();
                        in_quotes = false;
                        pos += 1;
                    }
                } else if c == self.separator {
                    if in_quotes {
                        value.push(c);
                    } else {
                        values.push(finish(&value));
                        value.clear();
                    }
                } else {
                    value.push(c);
                }
                pos += 1;
            }

            if !in_quotes {
                return Ok(values);
            }

            // drop the terminator appended above and keep reading the value
            value.pop();
            match more()? {
                Some(next_line) => {
                    chunk = std::iter::once('\n').chain(next_line.chars()).collect();
                }
                None => return Err(CsvError::UnterminatedQuote),
            }
        }
    }
}

/// Slice fixed 0-based inclusive ranges out of a line. Ranges past the end
/// of the line yield empty strings.
pub(crate) fn parse_fixed(line: &str, ranges: &[(usize, usize)]) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    ranges
        .iter()
        .map(|&(start, end)| {
            if start >= chars.len() {
                String::new()
            } else {
                let stop = (end + 1).min(chars.len());
                chars[start..stop].iter().collect::<String>().trim().to_string()
            }
        })
        .collect()
}

/// Options controlling how one table's text is read.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub tokenizer: Tokenizer,
    pub comment_char: Option<char>,
    pub headerline: Option<String>,
    pub suppress_headers: bool,
    pub trim_headers: bool,
    pub defective_headers: bool,
    pub skip_leading_lines: usize,
    pub skip_leading_data_lines: usize,
    pub ignore_unparseable_lines: bool,
    pub fixed_widths: Option<Vec<(usize, usize)>>,
    /// Pseudo-column names for [`LineSource::tail_fields`]
    pub tail_names: Vec<String>,
    pub tail_prepend: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            tokenizer: Tokenizer::default(),
            comment_char: None,
            headerline: None,
            suppress_headers: false,
            trim_headers: true,
            defective_headers: false,
            skip_leading_lines: 0,
            skip_leading_data_lines: 0,
            ignore_unparseable_lines: false,
            fixed_widths: None,
            tail_names: Vec::new(),
            tail_prepend: false,
        }
    }
}

impl ReaderOptions {
    pub fn from_config(config: &CsvConfig, table: &str) -> Result<Self> {
        Ok(Self {
            tokenizer: Tokenizer {
                separator: config.separator,
                quote_char: config.quote_char,
                quote_style: config.quote_style,
            },
            comment_char: config.comment_char,
            headerline: config.headerline_for(table).map(str::to_string),
            suppress_headers: config.suppress_headers,
            trim_headers: config.trim_headers,
            defective_headers: config.defective_headers,
            skip_leading_lines: config.skip_leading_lines,
            skip_leading_data_lines: config.skip_leading_data_lines,
            ignore_unparseable_lines: config.ignore_unparseable_lines,
            fixed_widths: config.fixed_width_columns()?,
            tail_names: if config.indexed_files {
                config.file_tail_names()
            } else {
                Vec::new()
            },
            tail_prepend: config.file_tail_prepend,
        })
    }
}

/// Row source over delimited or fixed-width text.
pub struct CsvReader {
    lines: Option<Box<dyn LineSource>>,
    options: ReaderOptions,
    alias: Option<String>,
    column_names: Vec<String>,
    column_sizes: Vec<usize>,
    /// Columns that come from the text itself, without file-name parts
    data_columns: usize,
    fields: Vec<String>,
    /// First data row, read early to count columns when headers are suppressed
    pending: Option<(Vec<String>, Vec<String>)>,
    /// Comment and blank-line skipping, only before the header
    header_filter: bool,
    finished: bool,
}

impl CsvReader {
    pub fn new(
        lines: Box<dyn LineSource>,
        options: ReaderOptions,
        alias: Option<String>,
    ) -> Result<Self> {
        let mut reader = Self {
            lines: Some(lines),
            options,
            alias,
            column_names: Vec::new(),
            column_sizes: Vec::new(),
            data_columns: 0,
            fields: Vec::new(),
            pending: None,
            header_filter: true,
            finished: false,
        };
        reader.read_header()?;
        Ok(reader)
    }

    pub fn from_reader<R: BufRead + 'static>(
        input: R,
        options: ReaderOptions,
        alias: Option<String>,
    ) -> Result<Self> {
        Self::new(Box::new(BufLines::new(input)), options, alias)
    }

    pub fn from_path<P: AsRef<Path>>(
        path: P,
        options: ReaderOptions,
        alias: Option<String>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CsvError::FileNotFound(path.to_path_buf()),
            _ => CsvError::Io(e),
        })?;
        Self::from_reader(BufReader::new(file), options, alias)
    }

    /// Columns read from the text, excluding file-name pseudo-columns.
    pub fn data_column_count(&self) -> usize {
        self.data_columns
    }

    fn read_physical(&mut self) -> Result<Option<String>> {
        match self.lines.as_mut() {
            Some(lines) => lines.read_line(),
            None => Ok(None),
        }
    }

    fn tail(&self) -> Vec<String> {
        self.lines
            .as_ref()
            .map(|l| l.tail_fields().to_vec())
            .unwrap_or_default()
    }

    /// Next line, skipping comments and blank lines while still before the header.
    fn read_raw(&mut self) -> Result<Option<String>> {
        let mut line = self.read_physical()?;
        if self.header_filter {
            if let Some(comment) = self.options.comment_char {
                while let Some(text) = &line {
                    if !(text.is_empty() || text.starts_with(comment)) {
                        break;
                    }
                    trace!(line = %text, "skipping comment line");
                    line = self.read_physical()?;
                }
            }
            self.header_filter = false;
        }
        Ok(line)
    }

    fn parse(&mut self, line: &str, trim: bool) -> Result<Vec<String>> {
        if let Some(ranges) = &self.options.fixed_widths {
            return Ok(parse_fixed(line, ranges));
        }
        let tokenizer = self.options.tokenizer;
        let lines = &mut self.lines;
        tokenizer.parse_logical(line, trim, &mut || match lines.as_mut() {
            Some(l) => l.read_line(),
            None => Ok(None),
        })
    }

    fn skip_data_lines(&mut self) -> Result<()> {
        for _ in 0..self.options.skip_leading_data_lines {
            if self.read_physical()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    fn check_header(&self, names: &mut [String], from_file: bool) -> Result<()> {
        if from_file && self.options.defective_headers {
            for (i, name) in names.iter_mut().enumerate() {
                if name.is_empty() {
                    *name = format!("COLUMN{}", i + 1);
                }
            }
        }
        let mut seen = ahash::AHashSet::with_capacity(names.len());
        for name in names.iter() {
            if !seen.insert(name.to_uppercase()) {
                return Err(CsvError::DuplicateColumn(name.clone()));
            }
        }
        Ok(())
    }

    fn read_header(&mut self) -> Result<()> {
        for _ in 0..self.options.skip_leading_lines {
            if self.read_physical()?.is_none() {
                break;
            }
        }

        let trim = self.options.trim_headers;
        let explicit = self.options.headerline.clone();
        let names = if self.options.suppress_headers {
            match explicit {
                Some(header) => {
                    let mut names = self.parse(&header, trim)?;
                    self.check_header(&mut names, false)?;
                    self.skip_data_lines()?;
                    names
                }
                None => {
                    // skipped data lines never count toward the column count
                    self.skip_data_lines()?;
                    match self.read_raw()? {
                        Some(line) => {
                            let tail = self.tail();
                            let fields = self.parse(&line, false)?;
                            let names = (1..=fields.len()).map(|i| format!("COLUMN{}", i)).collect();
                            self.pending = Some((fields, tail));
                            names
                        }
                        None => Vec::new(),
                    }
                }
            }
        } else {
            let line = self.read_raw()?.unwrap_or_default();
            let mut names = match explicit {
                Some(header) => {
                    let mut names = self.parse(&header, trim)?;
                    self.check_header(&mut names, false)?;
                    names
                }
                None => {
                    let mut names = self.parse(&line, trim)?;
                    self.check_header(&mut names, true)?;
                    names
                }
            };
            if self.options.fixed_widths.is_none() && names.len() == 1 && names[0].is_empty() {
                names.clear();
            }
            self.skip_data_lines()?;
            names
        };

        self.data_columns = names.len();
        let mut sizes: Vec<usize> = match &self.options.fixed_widths {
            Some(ranges) => ranges.iter().map(|(start, end)| end - start + 1).collect(),
            None => vec![DEFAULT_COLUMN_SIZE; names.len()],
        };
        sizes.resize(names.len(), DEFAULT_COLUMN_SIZE);

        let tail_names: Vec<String> = self.options.tail_names.clone();
        let tail_sizes = vec![DEFAULT_COLUMN_SIZE; tail_names.len()];
        if self.options.tail_prepend {
            self.column_names = tail_names.into_iter().chain(names).collect();
            self.column_sizes = tail_sizes.into_iter().chain(sizes).collect();
        } else {
            self.column_names = names.into_iter().chain(tail_names).collect();
            self.column_sizes = sizes.into_iter().chain(tail_sizes).collect();
        }

        debug!(columns = ?self.column_names, "resolved table header");
        Ok(())
    }

    fn attach_tail(&self, fields: Vec<String>, mut tail: Vec<String>) -> Vec<String> {
        if self.options.tail_names.is_empty() {
            return fields;
        }
        // pad short rows so that file-name parts land in their own columns
        let mut fields = fields;
        fields.resize(self.data_columns.max(fields.len()), String::new());
        tail.resize(self.options.tail_names.len(), String::new());
        if self.options.tail_prepend {
            tail.extend(fields);
            tail
        } else {
            fields.extend(tail);
            fields
        }
    }
}

impl RowSource for CsvReader {
    fn next(&mut self) -> Result<bool> {
        if self.finished || self.lines.is_none() {
            return Ok(false);
        }

        loop {
            let (fields, tail) = match self.pending.take() {
                Some(row) => row,
                None => {
                    let line = match self.read_raw()? {
                        Some(line) => line,
                        None => {
                            self.finished = true;
                            self.lines = None;
                            return Ok(false);
                        }
                    };
                    let tail = self.tail();
                    match self.parse(&line, false) {
                        Ok(fields) => (fields, tail),
                        Err(e) if self.options.ignore_unparseable_lines && e.is_line_error() => {
                            trace!(error = %e, "skipping unparseable line");
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                }
            };

            if self.options.ignore_unparseable_lines && fields.len() != self.data_columns {
                trace!(
                    expected = self.data_columns,
                    found = fields.len(),
                    "skipping line with wrong field count"
                );
                continue;
            }

            self.fields = self.attach_tail(fields, tail);
            return Ok(true);
        }
    }

    fn current_fields(&self) -> Vec<Option<&str>> {
        (0..self.column_names.len())
            .map(|i| self.fields.get(i).map(|f| f.trim()))
            .collect()
    }

    fn column_names(&self) -> &[String] {
        &self.column_names
    }

    fn column_sizes(&self) -> &[usize] {
        &self.column_sizes
    }

    fn table_alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    fn close(&mut self) {
        self.lines = None;
        self.pending = None;
        self.fields.clear();
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(text: &str, options: ReaderOptions) -> Result<CsvReader> {
        CsvReader::from_reader(std::io::Cursor::new(text.as_bytes().to_vec()), options, None)
    }

    fn collect(reader: &mut CsvReader) -> Vec<Vec<Option<String>>> {
        let mut rows = Vec::new();
        while reader.next().unwrap() {
            rows.push(
                reader
                    .current_fields()
                    .into_iter()
                    .map(|f| f.map(str::to_string))
                    .collect(),
            );
        }
        rows
    }

    /// Re-quote fields the way a writer would for the round-trip check.
    fn join(fields: &[String]) -> String {
        fields
            .iter()
            .map(|f| {
                if f.contains(',') || f.contains('"') {
                    format!("\"{}\"", f.replace('"', "\"\""))
                } else {
                    f.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn test_tokenize_basic_and_quoted() {
        let tok = Tokenizer::default();
        assert_eq!(tok.parse_line("a,b,,c").unwrap(), vec!["a", "b", "", "c"]);
        assert_eq!(tok.parse_line("\"x,y\",z").unwrap(), vec!["x,y", "z"]);
        assert_eq!(
            tok.parse_line("\"He said \"\"hi\"\"\"").unwrap(),
            vec!["He said \"hi\""]
        );
        // a quote after the first character is literal
        assert_eq!(tok.parse_line("ab\"c,d").unwrap(), vec!["ab\"c", "d"]);
        assert_eq!(tok.parse_line("").unwrap(), vec![""]);
    }

    #[test]
    fn test_round_trip() {
        let tok = Tokenizer::default();
        for line in ["1,abc,\"x,y\"", "\"say \"\"hi\"\"\",2", "a,,b"] {
            let fields = tok.parse_line(line).unwrap();
            assert_eq!(join(&fields), line);
        }
    }

    #[test]
    fn test_c_style_escapes() {
        let tok = Tokenizer {
            quote_style: QuoteStyle::C,
            ..Tokenizer::default()
        };
        assert_eq!(tok.parse_line("a\\,b,c").unwrap(), vec!["a,b", "c"]);
        assert_eq!(tok.parse_line("\"q\\\"x\",y").unwrap(), vec!["q\"x", "y"]);
    }

    #[test]
    fn test_malformed_quote() {
        let tok = Tokenizer::default();
        let err = tok.parse_line("\"abc\"d,e").unwrap_err();
        match err {
            CsvError::MalformedQuote { separator, position, line } => {
                assert_eq!(separator, ',');
                assert_eq!(position, 5);
                assert_eq!(line, "\"abc\"d,e");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            tok.parse_line("\"open,x"),
            Err(CsvError::UnterminatedQuote)
        ));
    }

    #[test]
    fn test_multi_line_quoted_value() {
        let mut r = reader("ID,TEXT\n1,\"first\nsecond\"\n2,plain\n", ReaderOptions::default()).unwrap();
        let rows = collect(&mut r);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1].as_deref(), Some("first\nsecond"));
        assert_eq!(rows[1][1].as_deref(), Some("plain"));
    }

    #[test]
    fn test_unterminated_quote_at_eof() {
        let mut r = reader("A\n\"never closed\n", ReaderOptions::default()).unwrap();
        assert!(matches!(r.next(), Err(CsvError::UnterminatedQuote)));
    }

    #[test]
    fn test_header_and_short_rows() {
        let mut r = reader("id, name ,age\n1,x\n2,y,30\n", ReaderOptions::default()).unwrap();
        assert_eq!(r.column_names(), &["id", "name", "age"]);
        assert_eq!(r.column_sizes(), &[20, 20, 20]);
        let rows = collect(&mut r);
        assert_eq!(rows[0], vec![Some("1".into()), Some("x".into()), None]);
        assert_eq!(rows[1][2].as_deref(), Some("30"));
        assert!(!r.next().unwrap());
    }

    #[test]
    fn test_suppressed_headers_replay_first_line() {
        let options = ReaderOptions {
            suppress_headers: true,
            ..ReaderOptions::default()
        };
        let mut r = reader("a,b,c\nd,e,f\n", options).unwrap();
        assert_eq!(r.column_names(), &["COLUMN1", "COLUMN2", "COLUMN3"]);
        let rows = collect(&mut r);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0].as_deref(), Some("a"));
    }

    #[test]
    fn test_suppressed_headers_skip_data_lines_first() {
        let options = ReaderOptions {
            suppress_headers: true,
            skip_leading_data_lines: 1,
            ..ReaderOptions::default()
        };
        let mut r = reader("a,b,c,d\n1,2\n3,4\n", options).unwrap();
        assert_eq!(r.column_names(), &["COLUMN1", "COLUMN2"]);
        let rows = collect(&mut r);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0].as_deref(), Some("1"));
    }

    #[test]
    fn test_suppressed_headers_with_headerline() {
        let options = ReaderOptions {
            suppress_headers: true,
            headerline: Some("X,Y".to_string()),
            ..ReaderOptions::default()
        };
        let mut r = reader("1,2\n3,4\n", options).unwrap();
        assert_eq!(r.column_names(), &["X", "Y"]);
        assert_eq!(collect(&mut r).len(), 2);
    }

    #[test]
    fn test_duplicate_and_defective_headers() {
        assert!(matches!(
            reader("a,B,b\n", ReaderOptions::default()),
            Err(CsvError::DuplicateColumn(_))
        ));
        let options = ReaderOptions {
            defective_headers: true,
            ..ReaderOptions::default()
        };
        let r = reader("a,,c\n", options).unwrap();
        assert_eq!(r.column_names(), &["a", "COLUMN2", "c"]);
    }

    #[test]
    fn test_comments_and_leading_lines() {
        let options = ReaderOptions {
            comment_char: Some('#'),
            skip_leading_lines: 1,
            skip_leading_data_lines: 1,
            ..ReaderOptions::default()
        };
        let text = "garbage\n# comment\n\nA,B\nskipped,row\n1,2\n#not a comment\n";
        let mut r = reader(text, options).unwrap();
        assert_eq!(r.column_names(), &["A", "B"]);
        let rows = collect(&mut r);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0].as_deref(), Some("1"));
        assert_eq!(rows[1][0].as_deref(), Some("#not a comment"));
    }

    #[test]
    fn test_ignore_unparseable_lines() {
        let options = ReaderOptions {
            ignore_unparseable_lines: true,
            ..ReaderOptions::default()
        };
        let text = "A,B\n1,2\nbroken\n\"bad\"x,1\n3,4\n";
        let mut r = reader(text, options).unwrap();
        let rows = collect(&mut r);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0].as_deref(), Some("3"));
    }

    #[test]
    fn test_fixed_width() {
        let options = ReaderOptions {
            fixed_widths: Some(vec![(0, 2), (3, 7), (8, 9)]),
            ..ReaderOptions::default()
        };
        let text = "ID NAME QT\n 1 abc  10\n22 de\n";
        let mut r = reader(text, options).unwrap();
        assert_eq!(r.column_names(), &["ID", "NAME", "QT"]);
        assert_eq!(r.column_sizes(), &[3, 5, 2]);
        let rows = collect(&mut r);
        assert_eq!(rows[0], vec![Some("1".into()), Some("abc".into()), Some("10".into())]);
        assert_eq!(rows[1], vec![Some("22".into()), Some("de".into()), Some("".into())]);
    }

    #[test]
    fn test_next_after_end_and_close_are_idempotent() {
        let mut r = reader("A\n1\n", ReaderOptions::default()).unwrap();
        assert!(r.next().unwrap());
        assert!(!r.next().unwrap());
        assert!(!r.next().unwrap());
        r.close();
        r.close();
        assert!(!r.next().unwrap());
    }
}
