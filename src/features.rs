//! Namespaced tokens, genre vectors and vocabularies.
//!
//! Raw numeric identifiers are rewritten into prefixed string tokens
//! (`user_1`, `movie_1`) so that identifier spaces never collide,
//! and every movie's `|`-delimited genre text becomes a fixed-order
//! binary vector over [`GENRES`].
use std::collections::HashMap;
use std::fmt::Display;

use ndarray::{Array2, ArrayView1};

use data::RawTables;
use Timestamp;

/// Prefix of user tokens.
pub const USER_PREFIX: &str = "user_";
/// Prefix of movie tokens.
pub const MOVIE_PREFIX: &str = "movie_";
/// Prefix of age bracket tokens.
pub const AGE_GROUP_PREFIX: &str = "group_";
/// Prefix of occupation tokens.
pub const OCCUPATION_PREFIX: &str = "occupation_";

/// Number of canonical genres.
pub const NUM_GENRES: usize = 18;

/// The canonical genre vocabulary, in vector order.
pub const GENRES: [&str; NUM_GENRES] = [
    "Action",
    "Adventure",
    "Animation",
    "Children's",
    "Comedy",
    "Crime",
    "Documentary",
    "Drama",
    "Fantasy",
    "Film-Noir",
    "Horror",
    "Musical",
    "Mystery",
    "Romance",
    "Sci-Fi",
    "Thriller",
    "War",
    "Western",
];

/// Vocabulary index shared by all tokens not seen while building it.
pub const UNKNOWN_INDEX: usize = 0;

/// Feature error types.
#[derive(Debug, Fail)]
pub enum FeatureError {
    /// A genre token outside [`GENRES`] under [`GenrePolicy::Reject`].
    #[fail(display = "Unknown genre {:?} in {:?}.", genre, genres)]
    UnknownGenre {
        /// The unknown token.
        genre: String,
        /// The full genre text it came from.
        genres: String,
    },
}

/// What to do with genre tokens outside the canonical vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenrePolicy {
    /// Drop the token; the movie keeps its other genres.
    Ignore,
    /// Fail normalization.
    Reject,
}

impl Default for GenrePolicy {
    fn default() -> Self {
        GenrePolicy::Ignore
    }
}

/// Categorical features with a vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoricalFeature {
    /// User token.
    UserId,
    /// Movie token.
    MovieId,
    /// Sex.
    Sex,
    /// Age bracket token.
    AgeGroup,
    /// Occupation token.
    Occupation,
}

impl CategoricalFeature {
    /// The demographic features of a user.
    pub const USER_FEATURES: [CategoricalFeature; 3] = [
        CategoricalFeature::Sex,
        CategoricalFeature::AgeGroup,
        CategoricalFeature::Occupation,
    ];

    /// Column name of the feature.
    pub fn name(&self) -> &'static str {
        match *self {
            CategoricalFeature::UserId => "user_id",
            CategoricalFeature::MovieId => "movie_id",
            CategoricalFeature::Sex => "sex",
            CategoricalFeature::AgeGroup => "age_group",
            CategoricalFeature::Occupation => "occupation",
        }
    }
}

/// Prepend `prefix` to a raw identifier.
pub fn namespaced<T: Display>(prefix: &str, id: T) -> String {
    format!("{}{}", prefix, id)
}

/// Binary genre membership, one entry per [`GENRES`] element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GenreVector([u8; NUM_GENRES]);

impl GenreVector {
    /// Parse `|`-delimited genre text. Empty tokens are skipped;
    /// unknown tokens follow `policy`.
    pub fn parse(genres: &str, policy: GenrePolicy) -> Result<GenreVector, FeatureError> {
        let mut vector = [0; NUM_GENRES];

        for token in genres.split('|').filter(|token| !token.is_empty()) {
            match GENRES.iter().position(|&genre| genre == token) {
                Some(idx) => vector[idx] = 1,
                None => match policy {
                    GenrePolicy::Ignore => {
                        debug!(genre = token, genres = genres, "Ignoring unknown genre")
                    }
                    GenrePolicy::Reject => {
                        return Err(FeatureError::UnknownGenre {
                            genre: token.to_owned(),
                            genres: genres.to_owned(),
                        })
                    }
                },
            }
        }

        Ok(GenreVector(vector))
    }

    /// The entries, in [`GENRES`] order.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Whether the named genre is set.
    pub fn contains(&self, genre: &str) -> bool {
        GENRES
            .iter()
            .position(|&name| name == genre)
            .map_or(false, |idx| self.0[idx] == 1)
    }
}

/// A user with namespaced attribute tokens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// `user_<id>`.
    pub user_id: String,
    /// `M` or `F`.
    pub sex: String,
    /// `group_<code>`.
    pub age_group: String,
    /// `occupation_<code>`.
    pub occupation: String,
}

/// A movie with its token and genre vector.
#[derive(Clone, Debug, PartialEq)]
pub struct MovieProfile {
    /// `movie_<id>`.
    pub movie_id: String,
    /// Title.
    pub title: String,
    /// Genre membership.
    pub genres: GenreVector,
}

/// A single rating event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// `user_<id>`.
    pub user_id: String,
    /// `movie_<id>`.
    pub movie_id: String,
    /// Star rating as a float.
    pub rating: f32,
    /// Seconds since the Unix epoch.
    pub timestamp: Timestamp,
}

/// The raw tables with identifiers namespaced and genres encoded.
#[derive(Clone, Debug, Default)]
pub struct NormalizedTables {
    /// Users, in file order.
    pub users: Vec<UserProfile>,
    /// Movies, in file order.
    pub movies: Vec<MovieProfile>,
    /// Rating events, in file order.
    pub events: Vec<Event>,
}

impl NormalizedTables {
    /// Normalize the raw tables.
    pub fn from_raw(raw: &RawTables, policy: GenrePolicy) -> Result<Self, FeatureError> {
        let users = raw.users
            .iter()
            .map(|user| UserProfile {
                user_id: namespaced(USER_PREFIX, user.user_id),
                sex: user.sex.clone(),
                age_group: namespaced(AGE_GROUP_PREFIX, user.age_group),
                occupation: namespaced(OCCUPATION_PREFIX, user.occupation),
            })
            .collect();

        let movies = raw.movies
            .iter()
            .map(|movie| {
                Ok(MovieProfile {
                    movie_id: namespaced(MOVIE_PREFIX, movie.movie_id),
                    title: movie.title.clone(),
                    genres: GenreVector::parse(&movie.genres, policy)?,
                })
            })
            .collect::<Result<Vec<_>, FeatureError>>()?;

        let events = raw.ratings
            .iter()
            .map(|rating| Event {
                user_id: namespaced(USER_PREFIX, rating.user_id),
                movie_id: namespaced(MOVIE_PREFIX, rating.movie_id),
                rating: f32::from(rating.rating),
                timestamp: rating.timestamp,
            })
            .collect();

        Ok(NormalizedTables {
            users,
            movies,
            events,
        })
    }
}

/// An ordered set of tokens, indexed by first observation.
///
/// Index [`UNKNOWN_INDEX`] is reserved for tokens that were never
/// observed; known tokens occupy `1..=len()`.
#[derive(Clone, Debug, Default)]
pub struct Vocabulary {
    tokens: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    /// Build an empty vocabulary.
    pub fn new() -> Self {
        Vocabulary::default()
    }

    /// Build a vocabulary from tokens; duplicates keep their first index.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocabulary = Vocabulary::new();

        for token in tokens {
            vocabulary.insert(token.as_ref());
        }

        vocabulary
    }

    /// Add a token if unseen, returning its index.
    pub fn insert(&mut self, token: &str) -> usize {
        if let Some(&idx) = self.index.get(token) {
            return idx;
        }

        self.tokens.push(token.to_owned());
        let idx = self.tokens.len();
        self.index.insert(token.to_owned(), idx);

        idx
    }

    /// Index of a known token.
    pub fn get(&self, token: &str) -> Option<usize> {
        self.index.get(token).cloned()
    }

    /// Index of a token, or [`UNKNOWN_INDEX`] if it was never observed.
    pub fn index(&self, token: &str) -> usize {
        self.get(token).unwrap_or(UNKNOWN_INDEX)
    }

    /// Whether the token was observed.
    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    /// Token at a given index.
    pub fn token(&self, idx: usize) -> Option<&str> {
        if idx == UNKNOWN_INDEX {
            None
        } else {
            self.tokens.get(idx - 1).map(|token| token.as_str())
        }
    }

    /// Known tokens, in index order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Number of known tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no token was observed.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of indices, including the unknown bucket.
    pub fn cardinality(&self) -> usize {
        self.tokens.len() + 1
    }
}

/// Vocabularies and the genre table, built once from the normalized
/// tables and shared read-only by every later stage.
#[derive(Clone, Debug)]
pub struct FeatureSpace {
    user_ids: Vocabulary,
    movie_ids: Vocabulary,
    sexes: Vocabulary,
    age_groups: Vocabulary,
    occupations: Vocabulary,
    genre_table: Array2<f32>,
}

impl FeatureSpace {
    /// Build the feature space from the users and movies tables.
    pub fn new(tables: &NormalizedTables) -> Self {
        let users = &tables.users;

        let mut movie_ids = Vocabulary::new();
        let mut genre_rows = Vec::with_capacity(tables.movies.len());

        for movie in &tables.movies {
            if !movie_ids.contains(&movie.movie_id) {
                movie_ids.insert(&movie.movie_id);
                genre_rows.push(movie.genres);
            }
        }

        let mut genre_table = Array2::zeros((movie_ids.cardinality(), NUM_GENRES));
        for (row, genres) in genre_rows.iter().enumerate() {
            for (col, &value) in genres.as_slice().iter().enumerate() {
                genre_table[(row + 1, col)] = f32::from(value);
            }
        }

        let space = FeatureSpace {
            user_ids: Vocabulary::from_tokens(users.iter().map(|user| &user.user_id)),
            movie_ids,
            sexes: Vocabulary::from_tokens(users.iter().map(|user| &user.sex)),
            age_groups: Vocabulary::from_tokens(users.iter().map(|user| &user.age_group)),
            occupations: Vocabulary::from_tokens(users.iter().map(|user| &user.occupation)),
            genre_table,
        };

        info!(
            users = space.user_ids.len(),
            movies = space.movie_ids.len(),
            sexes = space.sexes.len(),
            age_groups = space.age_groups.len(),
            occupations = space.occupations.len(),
            "Built vocabularies"
        );

        space
    }

    /// Vocabulary of a categorical feature.
    pub fn vocabulary(&self, feature: CategoricalFeature) -> &Vocabulary {
        match feature {
            CategoricalFeature::UserId => &self.user_ids,
            CategoricalFeature::MovieId => &self.movie_ids,
            CategoricalFeature::Sex => &self.sexes,
            CategoricalFeature::AgeGroup => &self.age_groups,
            CategoricalFeature::Occupation => &self.occupations,
        }
    }

    /// Genre vectors indexed by movie vocabulary index;
    /// the unknown row is all zeros.
    pub fn genre_table(&self) -> &Array2<f32> {
        &self.genre_table
    }

    /// Genre vector of a movie token.
    pub fn genre_vector(&self, movie_id: &str) -> ArrayView1<f32> {
        self.genre_table.row(self.movie_ids.index(movie_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data::{RawMovie, RawRating, RawTables, RawUser};

    fn raw_tables() -> RawTables {
        RawTables {
            users: vec![
                RawUser {
                    user_id: 1,
                    sex: "F".to_owned(),
                    age_group: 1,
                    occupation: 10,
                    zip_code: "48067".to_owned(),
                },
                RawUser {
                    user_id: 2,
                    sex: "M".to_owned(),
                    age_group: 56,
                    occupation: 16,
                    zip_code: "70072".to_owned(),
                },
                RawUser {
                    user_id: 3,
                    sex: "M".to_owned(),
                    age_group: 25,
                    occupation: 15,
                    zip_code: "55117".to_owned(),
                },
            ],
            ratings: vec![RawRating {
                user_id: 1,
                movie_id: 1,
                rating: 4,
                timestamp: 978300760,
            }],
            movies: vec![
                RawMovie {
                    movie_id: 1,
                    title: "Toy Story (1995)".to_owned(),
                    genres: "Animation|Children's|Comedy".to_owned(),
                },
                RawMovie {
                    movie_id: 1,
                    title: "Heat (1995)".to_owned(),
                    genres: "Action|Crime|Thriller".to_owned(),
                },
            ],
        }
    }

    #[test]
    fn action_drama_sets_exactly_two_bits() {
        let vector = GenreVector::parse("Action|Drama", GenrePolicy::Ignore).unwrap();

        for (genre, &value) in GENRES.iter().zip(vector.as_slice()) {
            let expected = *genre == "Action" || *genre == "Drama";
            assert_eq!(value == 1, expected, "{}", genre);
        }
    }

    #[test]
    fn comedy_is_fifth_entry() {
        let vector = GenreVector::parse("Comedy", GenrePolicy::Ignore).unwrap();

        let mut expected = [0; NUM_GENRES];
        expected[4] = 1;

        assert_eq!(vector.as_slice(), &expected[..]);
        assert!(vector.contains("Comedy"));
        assert!(!vector.contains("Drama"));
    }

    #[test]
    fn unknown_genres_follow_policy() {
        let ignored = GenreVector::parse("Comedy|Anime", GenrePolicy::Ignore).unwrap();
        assert_eq!(ignored, GenreVector::parse("Comedy", GenrePolicy::Ignore).unwrap());

        assert!(GenreVector::parse("Comedy|Anime", GenrePolicy::Reject).is_err());
        // Matching is verbatim.
        assert!(GenreVector::parse("comedy", GenrePolicy::Reject).is_err());
    }

    #[test]
    fn namespaces_identifiers() {
        let tables = NormalizedTables::from_raw(&raw_tables(), GenrePolicy::Ignore).unwrap();

        assert_eq!(tables.users[0].user_id, "user_1");
        assert_eq!(tables.users[0].age_group, "group_1");
        assert_eq!(tables.users[0].occupation, "occupation_10");
        assert_eq!(tables.movies[0].movie_id, "movie_1");
        assert_eq!(tables.events[0].user_id, "user_1");
        assert_eq!(tables.events[0].movie_id, "movie_1");
        assert_eq!(tables.events[0].rating, 4.0);
    }

    #[test]
    fn vocabulary_is_ordered_by_first_observation() {
        let vocabulary = Vocabulary::from_tokens(vec!["M", "F", "M", "X"]);

        assert_eq!(vocabulary.len(), 3);
        assert_eq!(vocabulary.cardinality(), 4);
        assert_eq!(vocabulary.index("M"), 1);
        assert_eq!(vocabulary.index("F"), 2);
        assert_eq!(vocabulary.index("X"), 3);
        assert_eq!(vocabulary.index("unseen"), UNKNOWN_INDEX);
        assert_eq!(vocabulary.token(2), Some("F"));
        assert_eq!(vocabulary.token(UNKNOWN_INDEX), None);
        assert_eq!(vocabulary.token(4), None);
    }

    #[test]
    fn feature_space_aligns_genres_with_movie_vocabulary() {
        let tables = NormalizedTables::from_raw(&raw_tables(), GenrePolicy::Ignore).unwrap();
        let space = FeatureSpace::new(&tables);

        assert_eq!(space.vocabulary(CategoricalFeature::UserId).len(), 3);
        assert_eq!(space.vocabulary(CategoricalFeature::Sex).tokens(), &["F", "M"]);
        assert_eq!(space.vocabulary(CategoricalFeature::AgeGroup).len(), 3);

        // The duplicated movie id keeps the first genre set.
        assert_eq!(space.vocabulary(CategoricalFeature::MovieId).len(), 1);
        assert_eq!(space.genre_table().dim(), (2, NUM_GENRES));

        let toy_story = space.genre_vector("movie_1");
        assert_eq!(toy_story[2], 1.0);
        assert_eq!(toy_story[0], 0.0);
        assert_eq!(toy_story.iter().sum::<f32>(), 3.0);

        assert_eq!(space.genre_vector("movie_404").iter().sum::<f32>(), 0.0);
    }
}
