//! End-to-end preparation of a MovieLens-1M directory into train and
//! test dataset files.
use std::fs;
use std::fs::File;
use std::path::Path;

use failure;
use rand;
use rand::prng::XorShiftRng;
use rand::{Rng, SeedableRng};
use serde_json;

use data::{RawTables, DEFAULT_SEPARATOR};
use dataset::{materialize, train_test_split, write_rows, DatasetError, DatasetRow, Examples,
              RowSchema, DEFAULT_RETENTION};
use features::{FeatureSpace, GenrePolicy, NormalizedTables};
use sequences::{UserSequences, WindowConfig, WindowError};

/// Configuration error types.
#[derive(Debug, Fail)]
pub enum ConfigError {
    /// The train fraction is not a probability.
    #[fail(display = "Train fraction must be between 0 and 1, got {}.", _0)]
    TrainFraction(f64),
}

/// Pipeline configuration.
///
/// Every field has a default, so partial JSON documents are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the users table.
    pub users_file: String,
    /// Name of the ratings table.
    pub ratings_file: String,
    /// Name of the movies table.
    pub movies_file: String,
    /// Field separator of the raw tables.
    pub separator: String,
    /// Window size: history steps plus the target.
    pub sequence_length: usize,
    /// Distance between successive window starts.
    pub step_size: usize,
    /// Probability that a row lands in the training split.
    pub train_fraction: f64,
    /// Seed for the split; entropy if unset.
    pub seed: Option<u64>,
    /// Handling of unknown genres.
    pub genre_policy: GenrePolicy,
    /// Layout of the dataset files.
    pub schema: RowSchema,
    /// Name of the training file.
    pub train_file: String,
    /// Name of the test file.
    pub test_file: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            users_file: "users.dat".to_owned(),
            ratings_file: "ratings.dat".to_owned(),
            movies_file: "movies.dat".to_owned(),
            separator: DEFAULT_SEPARATOR.to_owned(),
            sequence_length: 4,
            step_size: 2,
            train_fraction: DEFAULT_RETENTION,
            seed: None,
            genre_policy: GenrePolicy::default(),
            schema: RowSchema::default(),
            train_file: "train_data.csv".to_owned(),
            test_file: "test_data.csv".to_owned(),
        }
    }
}

impl PipelineConfig {
    /// Default configuration.
    pub fn new() -> Self {
        PipelineConfig::default()
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, failure::Error> {
        let file = File::open(path.as_ref())?;

        Ok(serde_json::from_reader(file)?)
    }

    /// Set the window size: history steps plus the target.
    pub fn sequence_length(mut self, sequence_length: usize) -> Self {
        self.sequence_length = sequence_length;
        self
    }

    /// Set the distance between successive window starts.
    pub fn step_size(mut self, step_size: usize) -> Self {
        self.step_size = step_size;
        self
    }

    /// Set the probability that a row lands in the training split.
    pub fn train_fraction(mut self, train_fraction: f64) -> Self {
        self.train_fraction = train_fraction;
        self
    }

    /// Seed the split.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set how unknown genres are handled.
    pub fn genre_policy(mut self, genre_policy: GenrePolicy) -> Self {
        self.genre_policy = genre_policy;
        self
    }

    /// Set the layout of the dataset files.
    pub fn schema(mut self, schema: RowSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Set the field separator of the raw tables.
    pub fn separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_owned();
        self
    }

    /// Set the names of the raw tables.
    pub fn input_files(mut self, users: &str, ratings: &str, movies: &str) -> Self {
        self.users_file = users.to_owned();
        self.ratings_file = ratings.to_owned();
        self.movies_file = movies.to_owned();
        self
    }

    /// Set the names of the dataset files.
    pub fn output_files(mut self, train: &str, test: &str) -> Self {
        self.train_file = train.to_owned();
        self.test_file = test.to_owned();
        self
    }

    /// Validated window configuration.
    pub fn window_config(&self) -> Result<WindowConfig, WindowError> {
        WindowConfig::new(self.sequence_length, self.step_size)
    }

    fn validate(&self) -> Result<WindowConfig, failure::Error> {
        if !(self.train_fraction >= 0.0 && self.train_fraction <= 1.0) {
            return Err(ConfigError::TrainFraction(self.train_fraction).into());
        }

        Ok(self.window_config()?)
    }

    /// The seed expanded to the 16 bytes taken by `XorShiftRng`, if set.
    /// Used for the split and for seeding encoders from the same run.
    pub fn seed_bytes(&self) -> Option<[u8; 16]> {
        self.seed.map(|seed| {
            let mut bytes = [0; 16];
            // The halves cannot both be zero.
            let halves = [seed, seed ^ 0x9E37_79B9_7F4A_7C15];

            for (idx, byte) in bytes.iter_mut().enumerate() {
                *byte = (halves[idx / 8] >> (8 * (idx % 8))) as u8;
            }

            bytes
        })
    }

    /// Random number generator for the split: seeded if a seed is set,
    /// from entropy otherwise.
    pub fn rng(&self) -> XorShiftRng {
        match self.seed_bytes() {
            Some(bytes) => XorShiftRng::from_seed(bytes),
            None => XorShiftRng::from_seed(rand::thread_rng().gen()),
        }
    }
}

/// The outcome of preparing the raw tables.
#[derive(Clone, Debug)]
pub struct PreparedDataset {
    /// Vocabularies and genre table of the loaded tables.
    pub feature_space: FeatureSpace,
    /// Training rows.
    pub train: Vec<DatasetRow>,
    /// Test rows.
    pub test: Vec<DatasetRow>,
    /// Layout the rows are written with.
    pub schema: RowSchema,
    /// Window size of every row.
    pub sequence_length: usize,
}

impl PreparedDataset {
    /// Training rows as examples.
    pub fn train_examples(&self) -> Result<Examples, DatasetError> {
        Examples::from_rows(self.train.clone(), self.sequence_length)
    }

    /// Test rows as examples.
    pub fn test_examples(&self) -> Result<Examples, DatasetError> {
        Examples::from_rows(self.test.clone(), self.sequence_length)
    }
}

/// Normalize, window, materialize and split loaded tables.
pub fn prepare(
    raw: &RawTables,
    config: &PipelineConfig,
) -> Result<PreparedDataset, failure::Error> {
    let window_config = config.validate()?;

    let tables = NormalizedTables::from_raw(raw, config.genre_policy)?;
    let feature_space = FeatureSpace::new(&tables);

    let sequences = UserSequences::from(&tables.events[..]);
    let rows = materialize(&sequences, &tables.users, &window_config)?;

    let (train, test) = train_test_split(rows, &mut config.rng(), config.train_fraction);

    info!(
        users = sequences.num_users(),
        train = train.len(),
        test = test.len(),
        "Split dataset"
    );

    Ok(PreparedDataset {
        feature_space,
        train,
        test,
        schema: config.schema.clone(),
        sequence_length: config.sequence_length,
    })
}

/// Load the tables in `data_dir`, prepare them, and write the train and
/// test files into `output_dir`.
pub fn run<P: AsRef<Path>, Q: AsRef<Path>>(
    data_dir: P,
    output_dir: Q,
    config: &PipelineConfig,
) -> Result<PreparedDataset, failure::Error> {
    let data_dir = data_dir.as_ref();
    let output_dir = output_dir.as_ref();

    let raw = RawTables::load(
        data_dir.join(&config.users_file),
        data_dir.join(&config.ratings_file),
        data_dir.join(&config.movies_file),
        &config.separator,
    )?;

    let prepared = prepare(&raw, config)?;

    fs::create_dir_all(output_dir)?;
    write_rows(
        output_dir.join(&config.train_file),
        &prepared.train,
        &prepared.schema,
    )?;
    write_rows(
        output_dir.join(&config.test_file),
        &prepared.test,
        &prepared.schema,
    )?;

    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile;

    use super::*;
    use data::{RawMovie, RawRating, RawUser};
    use dataset::read_examples;

    fn raw_tables() -> RawTables {
        let users = (1..4)
            .map(|user_id| RawUser {
                user_id,
                sex: "F".to_owned(),
                age_group: 25,
                occupation: user_id,
                zip_code: "00000".to_owned(),
            })
            .collect();

        let movies = (1..11)
            .map(|movie_id| RawMovie {
                movie_id,
                title: format!("Movie {} (1995)", movie_id),
                genres: "Comedy|Drama".to_owned(),
            })
            .collect();

        // User 1 rates 5 movies, user 2 rates 6, user 3 rates 3.
        let mut ratings = Vec::new();
        for &(user_id, count) in &[(1, 5), (2, 6), (3, 3)] {
            for idx in 0..count {
                ratings.push(RawRating {
                    user_id,
                    movie_id: idx + 1,
                    rating: (idx % 5 + 1) as u8,
                    timestamp: 1000 - u64::from(idx),
                });
            }
        }

        RawTables {
            users,
            ratings,
            movies,
        }
    }

    #[test]
    fn windows_every_user() {
        let config = PipelineConfig::new().train_fraction(1.0).seed(42);
        let prepared = prepare(&raw_tables(), &config).unwrap();

        // 2 windows for 5 events, 2 for 6, none for 3.
        assert_eq!(prepared.train.len(), 4);
        assert!(prepared.test.is_empty());

        // Timestamps decrease with the movie id, so windows run backwards.
        assert_eq!(
            prepared.train[0].sequence_movie_ids,
            vec!["movie_5", "movie_4", "movie_3", "movie_2"]
        );
        assert_eq!(prepared.train[0].sequence_ratings, vec![5.0, 4.0, 3.0, 2.0]);

        let examples = prepared.train_examples().unwrap();
        assert_eq!(examples.len(), 4);
        assert_eq!(examples.data()[0].target_movie_id, "movie_2");
    }

    #[test]
    fn seeded_splits_are_reproducible() {
        let config = PipelineConfig::new().sequence_length(2).step_size(1).seed(7);

        let first = prepare(&raw_tables(), &config).unwrap();
        let second = prepare(&raw_tables(), &config).unwrap();

        assert_eq!(first.train, second.train);
        assert_eq!(first.test, second.test);
        assert_eq!(first.train.len() + first.test.len(), 4 + 5 + 2);
    }

    #[test]
    fn rejects_invalid_configs() {
        let raw = raw_tables();

        assert!(prepare(&raw, &PipelineConfig::new().train_fraction(1.5)).is_err());
        assert!(prepare(&raw, &PipelineConfig::new().train_fraction(-0.1)).is_err());
        assert!(prepare(&raw, &PipelineConfig::new().sequence_length(0)).is_err());
        assert!(prepare(&raw, &PipelineConfig::new().step_size(0)).is_err());
    }

    #[test]
    fn ratings_without_users_fail() {
        let mut raw = raw_tables();
        raw.users.truncate(1);

        assert!(prepare(&raw, &PipelineConfig::new().seed(1)).is_err());
    }

    #[test]
    fn seed_expansion_is_shared_and_deterministic() {
        let config = PipelineConfig::new().seed(0);
        let bytes = config.seed_bytes().unwrap();

        assert!(bytes.iter().any(|&byte| byte != 0));
        assert_eq!(PipelineConfig::new().seed(0).seed_bytes(), Some(bytes));
        assert!(PipelineConfig::new().seed(1).seed_bytes() != Some(bytes));
        assert_eq!(PipelineConfig::new().seed_bytes(), None);

        let mut from_config = config.rng();
        let mut from_bytes = XorShiftRng::from_seed(bytes);
        for _ in 0..8 {
            assert_eq!(from_config.gen::<u64>(), from_bytes.gen::<u64>());
        }
    }

    #[test]
    fn partial_json_configs_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut file = File::create(&path).unwrap();
        file.write_all(br#"{"sequence_length": 8, "seed": 3, "genre_policy": "Reject"}"#)
            .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();

        assert_eq!(config.sequence_length, 8);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.step_size, 2);
        assert_eq!(config.train_fraction, DEFAULT_RETENTION);
        assert_eq!(
            config,
            PipelineConfig::new()
                .sequence_length(8)
                .seed(3)
                .genre_policy(GenrePolicy::Reject)
        );
    }

    #[test]
    fn run_writes_both_splits() {
        let data_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();

        let files = [
            ("users.dat", "1::F::1::10::48067\n2::M::56::16::70072\n"),
            (
                "ratings.dat",
                "1::1::5::10\n1::2::3::20\n1::3::4::30\n1::4::2::40\n1::5::1::50\n\
                 2::3::4::10\n2::2::5::20\n",
            ),
            (
                "movies.dat",
                "1::A (1995)::Comedy\n2::B (1995)::Drama\n3::C (1995)::Action\n\
                 4::D (1995)::Horror\n5::E (1995)::War\n",
            ),
        ];

        for &(name, contents) in &files {
            let mut file = File::create(data_dir.path().join(name)).unwrap();
            file.write_all(contents.as_bytes()).unwrap();
        }

        let config = PipelineConfig::new().sequence_length(2).step_size(1).seed(11);
        let prepared = run(data_dir.path(), output_dir.path(), &config).unwrap();

        let train = read_examples(
            output_dir.path().join("train_data.csv"),
            &prepared.schema,
            2,
        ).unwrap();
        let test = read_examples(
            output_dir.path().join("test_data.csv"),
            &prepared.schema,
            2,
        ).unwrap();

        // 4 windows for user 1, 1 for user 2.
        assert_eq!(train.len() + test.len(), 5);
        assert_eq!(train.len(), prepared.train.len());
        assert_eq!(test.data(), prepared.test_examples().unwrap().data());
    }
}
