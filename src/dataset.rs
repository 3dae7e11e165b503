//! Materializing windows into dataset rows, writing and reading them.
//!
//! Each window becomes one row joined with its user's attributes.
//! Rows are stored pipe-delimited, without a header, with the movie ids
//! and ratings of the window comma-joined into single columns. The
//! [`RowSchema`] is the single description of that layout and drives
//! both [`write_rows`] and [`read_rows`].
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;

use csv;
use failure;
use rand::Rng;

use features::{CategoricalFeature, UserProfile};
use sequences::{UserSequences, Window, WindowConfig};

/// Default probability that a row lands in the training split.
pub const DEFAULT_RETENTION: f64 = 0.85;

/// Dataset error types.
#[derive(Debug, Fail)]
pub enum DatasetError {
    /// A user with windows has no entry in the users table.
    #[fail(display = "User {} has ratings but no profile.", _0)]
    MissingUser(String),
    /// A row has the wrong number of columns.
    #[fail(display = "Line {}: expected {} columns, found {}.", line, expected, found)]
    ColumnCount {
        /// Line number, 1-based.
        line: u64,
        /// Columns in the schema.
        expected: usize,
        /// Columns in the row.
        found: usize,
    },
    /// A rating that does not parse as a number.
    #[fail(display = "Line {}: invalid rating {:?}.", line, value)]
    InvalidRating {
        /// Line number, 1-based.
        line: u64,
        /// Offending text.
        value: String,
    },
    /// A sequence column with an empty element.
    #[fail(display = "Line {}: empty element in {}.", line, field)]
    EmptyElement {
        /// Line number, 1-based.
        line: u64,
        /// Column name.
        field: &'static str,
    },
    /// A row without any movie.
    #[fail(display = "Line {}: empty sequence.", line)]
    EmptySequence {
        /// Line number, 1-based.
        line: u64,
    },
    /// Movie ids and ratings of different lengths.
    #[fail(display = "Line {}: {} movie ids but {} ratings.", line, movie_ids, ratings)]
    LengthMismatch {
        /// Line number, 1-based.
        line: u64,
        /// Number of movie ids.
        movie_ids: usize,
        /// Number of ratings.
        ratings: usize,
    },
    /// A sequence of a different length than the dataset's windows.
    #[fail(display = "Line {}: expected sequences of length {}, found {}.", line, expected, found)]
    SequenceLength {
        /// Line number, 1-based.
        line: u64,
        /// Configured window size.
        expected: usize,
        /// Length found.
        found: usize,
    },
    /// A schema that does not list every field exactly once.
    #[fail(display = "Schema must list every field exactly once.")]
    InvalidSchema,
}

/// Columns of the dataset files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// User token.
    UserId,
    /// Comma-joined movie tokens of the window.
    SequenceMovieIds,
    /// Comma-joined ratings of the window.
    SequenceRatings,
    /// Sex.
    Sex,
    /// Age bracket token.
    AgeGroup,
    /// Occupation token.
    Occupation,
}

impl Field {
    /// All fields, in default column order.
    pub const ALL: [Field; 6] = [
        Field::UserId,
        Field::SequenceMovieIds,
        Field::SequenceRatings,
        Field::Sex,
        Field::AgeGroup,
        Field::Occupation,
    ];

    /// Column name.
    pub fn name(&self) -> &'static str {
        match *self {
            Field::UserId => "user_id",
            Field::SequenceMovieIds => "sequence_movie_ids",
            Field::SequenceRatings => "sequence_ratings",
            Field::Sex => "sex",
            Field::AgeGroup => "age_group",
            Field::Occupation => "occupation",
        }
    }
}

/// Column order and delimiters of the dataset files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSchema {
    fields: Vec<Field>,
    delimiter: u8,
    sequence_delimiter: char,
}

impl Default for RowSchema {
    fn default() -> Self {
        RowSchema {
            fields: Field::ALL.to_vec(),
            delimiter: b'|',
            sequence_delimiter: ',',
        }
    }
}

impl RowSchema {
    /// Build a schema with a custom column order.
    pub fn new(fields: Vec<Field>) -> Result<Self, DatasetError> {
        let complete = fields.len() == Field::ALL.len()
            && Field::ALL.iter().all(|field| fields.contains(field));

        if !complete {
            return Err(DatasetError::InvalidSchema);
        }

        Ok(RowSchema {
            fields,
            ..RowSchema::default()
        })
    }

    /// Set the column delimiter.
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the delimiter between sequence elements.
    pub fn sequence_delimiter(mut self, delimiter: char) -> Self {
        self.sequence_delimiter = delimiter;
        self
    }

    /// Column order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Column names, in order.
    pub fn header(&self) -> Vec<&'static str> {
        self.fields.iter().map(|field| field.name()).collect()
    }

    fn writer_builder(&self) -> csv::WriterBuilder {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(self.delimiter)
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Never)
            .terminator(csv::Terminator::Any(b'\n'));

        builder
    }

    fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.delimiter)
            .has_headers(false)
            .quoting(false)
            .flexible(true);

        builder
    }

    fn to_record(&self, row: &DatasetRow) -> Vec<String> {
        let separator = self.sequence_delimiter.to_string();

        self.fields
            .iter()
            .map(|field| match *field {
                Field::UserId => row.user_id.clone(),
                Field::SequenceMovieIds => row.sequence_movie_ids.join(&separator),
                Field::SequenceRatings => row.sequence_ratings
                    .iter()
                    .map(|&rating| format_rating(rating))
                    .collect::<Vec<_>>()
                    .join(&separator),
                Field::Sex => row.sex.clone(),
                Field::AgeGroup => row.age_group.clone(),
                Field::Occupation => row.occupation.clone(),
            })
            .collect()
    }

    fn from_record(&self, record: &csv::StringRecord) -> Result<DatasetRow, DatasetError> {
        let line = record.position().map_or(0, |position| position.line());

        if record.len() != self.fields.len() {
            return Err(DatasetError::ColumnCount {
                line,
                expected: self.fields.len(),
                found: record.len(),
            });
        }

        let mut row = DatasetRow::default();

        for (field, value) in self.fields.iter().zip(record.iter()) {
            match *field {
                Field::UserId => row.user_id = value.to_owned(),
                Field::SequenceMovieIds => {
                    row.sequence_movie_ids = self.split_sequence(value, line, *field)?
                        .into_iter()
                        .map(|token| token.to_owned())
                        .collect()
                }
                Field::SequenceRatings => {
                    row.sequence_ratings = self.split_sequence(value, line, *field)?
                        .into_iter()
                        .map(|token| match token.trim().parse::<f32>() {
                            Ok(rating) if rating.is_finite() => Ok(rating),
                            _ => Err(DatasetError::InvalidRating {
                                line,
                                value: token.to_owned(),
                            }),
                        })
                        .collect::<Result<Vec<f32>, _>>()?
                }
                Field::Sex => row.sex = value.to_owned(),
                Field::AgeGroup => row.age_group = value.to_owned(),
                Field::Occupation => row.occupation = value.to_owned(),
            }
        }

        check_sequences(&row, line)?;

        Ok(row)
    }

    /// An empty column is an empty sequence; empty elements inside
    /// a non-empty column are errors.
    fn split_sequence<'a>(
        &self,
        value: &'a str,
        line: u64,
        field: Field,
    ) -> Result<Vec<&'a str>, DatasetError> {
        if value.is_empty() {
            return Ok(Vec::new());
        }

        value
            .split(self.sequence_delimiter)
            .map(|token| {
                if token.trim().is_empty() {
                    Err(DatasetError::EmptyElement {
                        line,
                        field: field.name(),
                    })
                } else {
                    Ok(token)
                }
            })
            .collect()
    }
}

fn check_sequences(row: &DatasetRow, line: u64) -> Result<(), DatasetError> {
    if row.sequence_movie_ids.len() != row.sequence_ratings.len() {
        return Err(DatasetError::LengthMismatch {
            line,
            movie_ids: row.sequence_movie_ids.len(),
            ratings: row.sequence_ratings.len(),
        });
    }

    if row.sequence_movie_ids.is_empty() {
        return Err(DatasetError::EmptySequence { line });
    }

    Ok(())
}

/// Ratings are written with a decimal point (`4.0`, `3.5`).
fn format_rating(rating: f32) -> String {
    format!("{:?}", rating)
}

/// One window joined with its user's attributes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    /// User token.
    pub user_id: String,
    /// Movie tokens of the window; the last one is the target.
    pub sequence_movie_ids: Vec<String>,
    /// Ratings of the window, aligned with `sequence_movie_ids`.
    pub sequence_ratings: Vec<f32>,
    /// Sex.
    pub sex: String,
    /// Age bracket token.
    pub age_group: String,
    /// Occupation token.
    pub occupation: String,
}

impl DatasetRow {
    /// Build a row from a window and its user's profile.
    pub fn from_window(window: &Window, user: &UserProfile) -> Self {
        DatasetRow {
            user_id: window.user_id.to_owned(),
            sequence_movie_ids: window.movie_ids.to_vec(),
            sequence_ratings: window.ratings.to_vec(),
            sex: user.sex.clone(),
            age_group: user.age_group.clone(),
            occupation: user.occupation.clone(),
        }
    }
}

/// Explode every user's windows into rows, in user order and, within a
/// user, in window order.
pub fn materialize(
    sequences: &UserSequences,
    users: &[UserProfile],
    config: &WindowConfig,
) -> Result<Vec<DatasetRow>, DatasetError> {
    let profiles: HashMap<&str, &UserProfile> = users
        .iter()
        .map(|user| (user.user_id.as_str(), user))
        .collect();

    let mut rows = Vec::with_capacity(sequences.num_windows(config));

    for user in sequences.iter_users() {
        let windows = user.windows(config);

        if windows.is_empty() {
            continue;
        }

        let profile = profiles
            .get(user.user_id)
            .ok_or_else(|| DatasetError::MissingUser(user.user_id.to_owned()))?;

        rows.extend(
            windows
                .iter()
                .map(|window| DatasetRow::from_window(window, profile)),
        );
    }

    debug!(rows = rows.len(), users = sequences.num_users(), "Materialized windows");

    Ok(rows)
}

/// Split rows into `(train, test)` with an independent draw per row:
/// a row is kept for training with probability `retention`.
///
/// Windows of the same user can land on both sides.
pub fn train_test_split<T, R: Rng>(rows: Vec<T>, rng: &mut R, retention: f64) -> (Vec<T>, Vec<T>) {
    let mut train = Vec::with_capacity((rows.len() as f64 * retention) as usize);
    let mut test = Vec::new();

    for row in rows {
        if rng.gen::<f64>() <= retention {
            train.push(row);
        } else {
            test.push(row);
        }
    }

    (train, test)
}

/// Write rows to any writer.
pub fn write_rows_to<W: io::Write>(
    writer: W,
    rows: &[DatasetRow],
    schema: &RowSchema,
) -> Result<(), failure::Error> {
    let mut writer = schema.writer_builder().from_writer(writer);

    for row in rows {
        writer.write_record(&schema.to_record(row))?;
    }

    writer.flush()?;

    Ok(())
}

/// Write rows to a file.
pub fn write_rows<P: AsRef<Path>>(
    path: P,
    rows: &[DatasetRow],
    schema: &RowSchema,
) -> Result<(), failure::Error> {
    let file = File::create(path.as_ref())?;
    write_rows_to(file, rows, schema)?;

    info!(path = %path.as_ref().display(), rows = rows.len(), "Wrote dataset");

    Ok(())
}

/// Read rows from any reader.
pub fn read_rows_from<R: io::Read>(
    reader: R,
    schema: &RowSchema,
) -> Result<Vec<DatasetRow>, failure::Error> {
    let mut reader = schema.reader_builder().from_reader(reader);
    let mut rows = Vec::new();

    for record in reader.records() {
        rows.push(schema.from_record(&record?)?);
    }

    Ok(rows)
}

/// Read rows from a file.
pub fn read_rows<P: AsRef<Path>>(
    path: P,
    schema: &RowSchema,
) -> Result<Vec<DatasetRow>, failure::Error> {
    read_rows_from(File::open(path.as_ref())?, schema)
}

/// The model-facing view of a row: the last movie of the window is the
/// target, the others the history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Example {
    /// User token.
    pub user_id: String,
    /// History movie tokens, oldest first.
    pub sequence_movie_ids: Vec<String>,
    /// Target movie token.
    pub target_movie_id: String,
    /// History ratings.
    pub sequence_ratings: Vec<f32>,
    /// Rating to predict.
    pub target_rating: f32,
    /// Sex.
    pub sex: String,
    /// Age bracket token.
    pub age_group: String,
    /// Occupation token.
    pub occupation: String,
}

impl Example {
    /// Split a row into history and target. `line` locates the row in
    /// error messages.
    pub fn from_row(row: DatasetRow, line: u64) -> Result<Example, DatasetError> {
        check_sequences(&row, line)?;

        let DatasetRow {
            user_id,
            mut sequence_movie_ids,
            mut sequence_ratings,
            sex,
            age_group,
            occupation,
        } = row;

        match (sequence_movie_ids.pop(), sequence_ratings.pop()) {
            (Some(target_movie_id), Some(target_rating)) => Ok(Example {
                user_id,
                sequence_movie_ids,
                target_movie_id,
                sequence_ratings,
                target_rating,
                sex,
                age_group,
                occupation,
            }),
            _ => Err(DatasetError::EmptySequence { line }),
        }
    }

    /// Window length: history plus target.
    pub fn sequence_length(&self) -> usize {
        self.sequence_movie_ids.len() + 1
    }

    /// Token of a categorical feature; the movie feature is the target.
    pub fn feature(&self, feature: CategoricalFeature) -> &str {
        match feature {
            CategoricalFeature::UserId => &self.user_id,
            CategoricalFeature::MovieId => &self.target_movie_id,
            CategoricalFeature::Sex => &self.sex,
            CategoricalFeature::AgeGroup => &self.age_group,
            CategoricalFeature::Occupation => &self.occupation,
        }
    }
}

/// A collection of examples supporting shuffling and minibatching.
#[derive(Clone, Debug, Default)]
pub struct Examples {
    examples: Vec<Example>,
}

impl From<Vec<Example>> for Examples {
    fn from(examples: Vec<Example>) -> Examples {
        Examples { examples }
    }
}

impl Examples {
    /// Convert rows, checking every window has `sequence_length` elements.
    /// Errors report the row's 1-based position, which is its line in a
    /// headerless dataset file.
    pub fn from_rows(
        rows: Vec<DatasetRow>,
        sequence_length: usize,
    ) -> Result<Examples, DatasetError> {
        let examples = rows.into_iter()
            .enumerate()
            .map(|(idx, row)| {
                let line = idx as u64 + 1;
                let example = Example::from_row(row, line)?;

                if example.sequence_length() == sequence_length {
                    Ok(example)
                } else {
                    Err(DatasetError::SequenceLength {
                        line,
                        expected: sequence_length,
                        found: example.sequence_length(),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Examples { examples })
    }

    /// The examples.
    pub fn data(&self) -> &[Example] {
        &self.examples
    }

    /// Number of examples.
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// Whether there are no examples.
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Shuffle the examples in place.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        rng.shuffle(&mut self.examples);
    }

    /// Iterate over consecutive minibatches. The last one may be
    /// smaller; a size of zero is treated as one.
    pub fn iter_minibatch(&self, minibatch_size: usize) -> ExampleMinibatchIterator {
        ExampleMinibatchIterator {
            examples: &self.examples,
            idx: 0,
            minibatch_size: minibatch_size.max(1),
        }
    }
}

/// Iterator over minibatches of [`Examples`].
#[derive(Clone, Debug)]
pub struct ExampleMinibatchIterator<'a> {
    examples: &'a [Example],
    idx: usize,
    minibatch_size: usize,
}

impl<'a> Iterator for ExampleMinibatchIterator<'a> {
    type Item = &'a [Example];
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.examples.len() {
            return None;
        }

        let start = self.idx;
        let stop = (start + self.minibatch_size).min(self.examples.len());
        self.idx = stop;

        Some(&self.examples[start..stop])
    }
}

/// Read a dataset file as examples with windows of `sequence_length`.
pub fn read_examples<P: AsRef<Path>>(
    path: P,
    schema: &RowSchema,
    sequence_length: usize,
) -> Result<Examples, failure::Error> {
    let rows = read_rows(path, schema)?;

    Ok(Examples::from_rows(rows, sequence_length)?)
}
