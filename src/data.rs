//! Loading the raw MovieLens-1M tables.
//!
//! The tables are `::`-separated, headerless and ISO-8859-1 encoded:
//!
//! ```text
//! users.dat    user_id::sex::age_group::occupation::zip_code
//! ratings.dat  user_id::movie_id::rating::unix_timestamp
//! movies.dat   movie_id::title::genres
//! ```
use std::fs;
use std::path::Path;
use std::str::FromStr;

use failure;

use Timestamp;

/// Field separator used by the MovieLens-1M `.dat` files.
pub const DEFAULT_SEPARATOR: &str = "::";

/// Errors raised while parsing a raw table.
#[derive(Debug, Fail)]
pub enum LoadError {
    /// A line has the wrong number of fields.
    #[fail(
        display = "{} line {}: expected {} fields, found {}.",
        table, line, expected, found
    )]
    FieldCount {
        /// Table being parsed.
        table: String,
        /// One-based line number.
        line: usize,
        /// Number of fields in the table's schema.
        expected: usize,
        /// Number of fields on the line.
        found: usize,
    },
    /// A field could not be parsed into its column type.
    #[fail(display = "{} line {}: invalid {} {:?}.", table, line, field, value)]
    InvalidField {
        /// Table being parsed.
        table: String,
        /// One-based line number.
        line: usize,
        /// Column name.
        field: &'static str,
        /// Offending text.
        value: String,
    },
}

/// A row of `users.dat`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawUser {
    /// Numeric user id.
    pub user_id: u32,
    /// `M` or `F`.
    pub sex: String,
    /// Age bracket code.
    pub age_group: u32,
    /// Occupation code.
    pub occupation: u32,
    /// Zip code; loaded but not used as a feature.
    pub zip_code: String,
}

/// A row of `ratings.dat`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawRating {
    /// Numeric user id.
    pub user_id: u32,
    /// Numeric movie id.
    pub movie_id: u32,
    /// Star rating, 1 to 5.
    pub rating: u8,
    /// Seconds since the Unix epoch.
    pub timestamp: Timestamp,
}

/// A row of `movies.dat`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawMovie {
    /// Numeric movie id.
    pub movie_id: u32,
    /// Title, including the release year.
    pub title: String,
    /// `|`-delimited genre names.
    pub genres: String,
}

/// The three raw tables, in file order.
#[derive(Clone, Debug, Default)]
pub struct RawTables {
    /// Users table.
    pub users: Vec<RawUser>,
    /// Ratings table.
    pub ratings: Vec<RawRating>,
    /// Movies table.
    pub movies: Vec<RawMovie>,
}

impl RawTables {
    /// Load the three tables from disk.
    pub fn load<P: AsRef<Path>>(
        users_path: P,
        ratings_path: P,
        movies_path: P,
        separator: &str,
    ) -> Result<RawTables, failure::Error> {
        let users = parse_users(&read_latin1(users_path)?, separator)?;
        let ratings = parse_ratings(&read_latin1(ratings_path)?, separator)?;
        let movies = parse_movies(&read_latin1(movies_path)?, separator)?;

        info!(
            users = users.len(),
            ratings = ratings.len(),
            movies = movies.len(),
            "Loaded raw tables"
        );

        Ok(RawTables {
            users,
            ratings,
            movies,
        })
    }
}

/// Decode ISO-8859-1 bytes: every byte is the code point of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| byte as char).collect()
}

fn read_latin1<P: AsRef<Path>>(path: P) -> Result<String, failure::Error> {
    let bytes = fs::read(path.as_ref())
        .map_err(|error| format_err!("Cannot read {}: {}", path.as_ref().display(), error))?;

    Ok(decode_latin1(&bytes))
}

/// Split non-blank lines into exactly `expected` fields,
/// returning each with its one-based line number.
fn records<'a>(
    table: &str,
    text: &'a str,
    separator: &str,
    expected: usize,
) -> Result<Vec<(usize, Vec<&'a str>)>, LoadError> {
    text.lines()
        .enumerate()
        .filter(|&(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let fields: Vec<&str> = line.split(separator).collect();

            if fields.len() == expected {
                Ok((idx + 1, fields))
            } else {
                Err(LoadError::FieldCount {
                    table: table.to_owned(),
                    line: idx + 1,
                    expected,
                    found: fields.len(),
                })
            }
        })
        .collect()
}

fn parse_field<T: FromStr>(
    table: &str,
    line: usize,
    field: &'static str,
    value: &str,
) -> Result<T, LoadError> {
    value.trim().parse().map_err(|_| LoadError::InvalidField {
        table: table.to_owned(),
        line,
        field,
        value: value.to_owned(),
    })
}

/// Parse the contents of `users.dat`.
pub fn parse_users(text: &str, separator: &str) -> Result<Vec<RawUser>, LoadError> {
    records("users", text, separator, 5)?
        .into_iter()
        .map(|(line, fields)| {
            Ok(RawUser {
                user_id: parse_field("users", line, "user_id", fields[0])?,
                sex: fields[1].trim().to_owned(),
                age_group: parse_field("users", line, "age_group", fields[2])?,
                occupation: parse_field("users", line, "occupation", fields[3])?,
                zip_code: fields[4].trim().to_owned(),
            })
        })
        .collect()
}

/// Parse the contents of `ratings.dat`.
///
/// Ratings outside 1 to 5 are rejected.
pub fn parse_ratings(text: &str, separator: &str) -> Result<Vec<RawRating>, LoadError> {
    records("ratings", text, separator, 4)?
        .into_iter()
        .map(|(line, fields)| {
            let rating: u8 = parse_field("ratings", line, "rating", fields[2])?;

            if rating < 1 || rating > 5 {
                return Err(LoadError::InvalidField {
                    table: "ratings".to_owned(),
                    line,
                    field: "rating",
                    value: fields[2].to_owned(),
                });
            }

            Ok(RawRating {
                user_id: parse_field("ratings", line, "user_id", fields[0])?,
                movie_id: parse_field("ratings", line, "movie_id", fields[1])?,
                rating,
                timestamp: parse_field("ratings", line, "unix_timestamp", fields[3])?,
            })
        })
        .collect()
}

/// Parse the contents of `movies.dat`.
pub fn parse_movies(text: &str, separator: &str) -> Result<Vec<RawMovie>, LoadError> {
    records("movies", text, separator, 3)?
        .into_iter()
        .map(|(line, fields)| {
            Ok(RawMovie {
                movie_id: parse_field("movies", line, "movie_id", fields[0])?,
                title: fields[1].to_owned(),
                genres: fields[2].trim().to_owned(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use tempfile;

    use super::*;

    #[test]
    fn parses_users() {
        let text = "1::F::1::10::48067\n2::M::56::16::70072\n";
        let users = parse_users(text, DEFAULT_SEPARATOR).unwrap();

        assert_eq!(users.len(), 2);
        assert_eq!(
            users[1],
            RawUser {
                user_id: 2,
                sex: "M".to_owned(),
                age_group: 56,
                occupation: 16,
                zip_code: "70072".to_owned(),
            }
        );
    }

    #[test]
    fn skips_blank_lines_and_crlf() {
        let text = "1::1193::5::978300760\r\n\r\n1::661::3::978302109\r\n";
        let ratings = parse_ratings(text, DEFAULT_SEPARATOR).unwrap();

        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings[1].movie_id, 661);
        assert_eq!(ratings[1].timestamp, 978302109);
    }

    #[test]
    fn rejects_wrong_field_count() {
        let text = "1::Toy Story (1995)::Animation|Children's|Comedy\n2::Jumanji (1995)\n";

        match parse_movies(text, DEFAULT_SEPARATOR) {
            Err(LoadError::FieldCount {
                line,
                expected,
                found,
                ..
            }) => {
                assert_eq!((line, expected, found), (2, 3, 2));
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn rejects_non_numeric_and_out_of_range_ratings() {
        assert!(parse_ratings("1::1193::five::978300760", DEFAULT_SEPARATOR).is_err());
        assert!(parse_ratings("1::1193::6::978300760", DEFAULT_SEPARATOR).is_err());
        assert!(parse_ratings("1::1193::0::978300760", DEFAULT_SEPARATOR).is_err());
    }

    #[test]
    fn decodes_latin1_titles() {
        let bytes = b"1::Caf\xe9 au lait (1993)::Comedy";
        let movies = parse_movies(&decode_latin1(bytes), DEFAULT_SEPARATOR).unwrap();

        assert_eq!(movies[0].title, "Caf\u{e9} au lait (1993)");
    }

    #[test]
    fn loads_tables_from_disk() {
        let dir = tempfile::tempdir().unwrap();

        let files = [
            ("users.dat", "1::F::1::10::48067\n"),
            ("ratings.dat", "1::1::5::978300760\n1::2::3::978300761\n"),
            ("movies.dat", "1::Toy Story (1995)::Comedy\n2::Heat (1995)::Action\n"),
        ];

        for &(name, contents) in &files {
            let mut file = File::create(dir.path().join(name)).unwrap();
            file.write_all(contents.as_bytes()).unwrap();
        }

        let tables = RawTables::load(
            dir.path().join("users.dat"),
            dir.path().join("ratings.dat"),
            dir.path().join("movies.dat"),
            DEFAULT_SEPARATOR,
        ).unwrap();

        assert_eq!(tables.users.len(), 1);
        assert_eq!(tables.ratings.len(), 2);
        assert_eq!(tables.movies[1].genres, "Action");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        assert!(
            RawTables::load(
                dir.path().join("users.dat"),
                dir.path().join("ratings.dat"),
                dir.path().join("movies.dat"),
                DEFAULT_SEPARATOR,
            ).is_err()
        );
    }
}
