//! Structured Record Parser
//!
//! Turns the section-delimited output of `avdmanager list ...` into typed
//! records. The parser knows nothing about targets, devices or AVDs: each
//! record kind supplies a builder and a table mapping upper-cased field keys
//! to setter functions.
//!
//! ```text
//! ----------
//! id: 1 or "android-34"
//!     Name: Android 14
//!     API level: 34
//! ```

use std::marker::PhantomData;

use once_cell::sync::Lazy;
use regex::Regex;

/// Parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid number for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Setter applied to the in-progress builder for one field
pub type FieldSetter<B> = fn(&mut B, &str) -> Result<(), ParseError>;

/// A record kind the parser can build
pub trait Record: Sized {
    /// Accumulator for one in-progress section
    type Builder: Default + 'static;

    /// Upper-cased field key to setter
    const FIELDS: &'static [(&'static str, FieldSetter<Self::Builder>)];

    /// Apply an `id: <n> or "<alias>"` line
    fn set_identifier(builder: &mut Self::Builder, id: u32, alias: &str);

    /// Freeze a builder; `None` when the section carried no usable data
    fn finish(builder: Self::Builder) -> Option<Self>;
}

static SECTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-{4,}$").expect("valid regex"));
static ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^id:\s*(\d+)\s+or\s+"([^"]+)""#).expect("valid regex"));

/// Parse a numeric field
pub fn parse_number(field: &'static str, value: &str) -> Result<u32, ParseError> {
    value.trim().parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Lazy record iterator over lines of text.
///
/// Yields `Err` at most once: a malformed numeric field ends the run.
pub struct RecordParser<I, R: Record> {
    lines: I,
    current: Option<R::Builder>,
    done: bool,
    _record: PhantomData<fn() -> R>,
}

impl<I, R> RecordParser<I, R>
where
    I: Iterator,
    I::Item: AsRef<str>,
    R: Record,
{
    pub fn new<L: IntoIterator<IntoIter = I>>(lines: L) -> Self {
        Self {
            lines: lines.into_iter(),
            current: None,
            done: false,
            _record: PhantomData,
        }
    }

    fn apply(builder: &mut R::Builder, line: &str) -> Result<(), ParseError> {
        if let Some(caps) = ID_RE.captures(line) {
            // Digits only, so the parse can fail only on overflow
            let id = parse_number("id", &caps[1])?;
            R::set_identifier(builder, id, &caps[2]);
            return Ok(());
        }

        let Some((key, value)) = line.split_once(':') else {
            return Ok(());
        };
        let key = key.trim().to_uppercase();
        match R::FIELDS.iter().find(|(name, _)| *name == key) {
            Some((_, setter)) => setter(builder, value.trim()),
            None => Ok(()),
        }
    }
}

impl<I, R> Iterator for RecordParser<I, R>
where
    I: Iterator,
    I::Item: AsRef<str>,
    R: Record,
{
    type Item = Result<R, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while let Some(raw) = self.lines.next() {
            let line = raw.as_ref().trim();
            if line.is_empty() {
                continue;
            }

            if SECTION_RE.is_match(line) {
                let finished = self.current.replace(R::Builder::default());
                if let Some(record) = finished.and_then(R::finish) {
                    return Some(Ok(record));
                }
                continue;
            }

            let builder = self.current.get_or_insert_with(R::Builder::default);
            if let Err(err) = Self::apply(builder, line) {
                self.done = true;
                return Some(Err(err));
            }
        }

        self.done = true;
        self.current.take().and_then(R::finish).map(Ok)
    }
}

/// Parse a whole text into records
pub fn parse_records<R: Record>(text: &str) -> Result<Vec<R>, ParseError> {
    RecordParser::<_, R>::new(text.lines()).collect()
}
