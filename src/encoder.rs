//! Embedding examples into the features of a behavioural sequence model.
//!
//! Every categorical token is looked up in an embedding table with
//! `floor(sqrt(vocabulary size))` columns. Movies may additionally be
//! fused with their fixed genre vector:
//!
//! ```text
//! movie(m) = relu(W [embedding(m) ; genres(m)] + b)
//! ```
//!
//! The sequence fed to attention has one row per window step. History
//! step `i` is `(movie(h_i) + position_i) * rating_i`, so poorly rated
//! movies contribute little; the last row is `movie(target)`.
//! User features are encoded separately, to be joined with the pooled
//! attention output.
use std::cmp;
use std::sync::Arc;

use ndarray::{Array1, Array2};
use rand;
use rand::distributions::{Distribution, Normal};
use rand::prng::XorShiftRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use wyrm;
use wyrm::{Arr, Variable};

use dataset::Example;
use features::{CategoricalFeature, FeatureSpace, Vocabulary, NUM_GENRES};

fn embedding_init<T: Rng>(rows: usize, cols: usize, rng: &mut T) -> Arr {
    let normal = Normal::new(0.0, 1.0 / cols as f64);
    Arr::zeros((rows, cols)).map(|_| normal.sample(rng) as f32)
}

fn dense_init<T: Rng>(rows: usize, cols: usize, rng: &mut T) -> Arr {
    let normal = Normal::new(0.0, (2.0 / (rows + cols) as f64).sqrt());
    Arr::zeros((rows, cols)).map(|_| normal.sample(rng) as f32)
}

/// Embedding width for a vocabulary: the truncated square root of its
/// size, and at least one.
pub fn embedding_dim(vocabulary_len: usize) -> usize {
    cmp::max(1, (vocabulary_len as f64).sqrt() as usize)
}

/// Encoding error types.
#[derive(Debug, Fail)]
pub enum EncodingError {
    /// Windows need at least the target step.
    #[fail(display = "Sequence length must be at least 1.")]
    ZeroSequenceLength,
    /// History of the wrong length.
    #[fail(display = "Expected {} history steps, found {}.", expected, found)]
    HistoryLength {
        /// Sequence length minus one.
        expected: usize,
        /// Steps found.
        found: usize,
    },
    /// History movies and ratings of different lengths.
    #[fail(display = "{} history movies but {} ratings.", movie_ids, ratings)]
    RatingsLength {
        /// Number of movies.
        movie_ids: usize,
        /// Number of ratings.
        ratings: usize,
    },
}

/// Embedding table for one categorical feature.
///
/// Row 0 is the unknown-token bucket, so lookups never fail.
#[derive(Clone, Debug)]
pub struct EmbeddingTable {
    feature: CategoricalFeature,
    vocabulary: Vocabulary,
    dim: usize,
    parameter: Arc<wyrm::HogwildParameter>,
}

impl EmbeddingTable {
    /// Build a randomly initialized table sized from the vocabulary.
    pub fn new<R: Rng>(feature: CategoricalFeature, vocabulary: &Vocabulary, rng: &mut R) -> Self {
        let dim = embedding_dim(vocabulary.len());
        let parameter = Arc::new(wyrm::HogwildParameter::new(embedding_init(
            vocabulary.cardinality(),
            dim,
            rng,
        )));

        EmbeddingTable {
            feature,
            vocabulary: vocabulary.clone(),
            dim,
            parameter,
        }
    }

    /// The feature this table embeds.
    pub fn feature(&self) -> CategoricalFeature {
        self.feature
    }

    /// Embedding width.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Row index of a token.
    pub fn index(&self, token: &str) -> usize {
        self.vocabulary.index(token)
    }

    /// Embedding of a token.
    pub fn encode(&self, token: &str) -> Array1<f32> {
        self.lookup(self.index(token))
    }

    fn lookup(&self, idx: usize) -> Array1<f32> {
        self.parameter.value().row(idx).to_owned()
    }

    /// The trainable table.
    pub fn parameter(&self) -> &Arc<wyrm::HogwildParameter> {
        &self.parameter
    }
}

#[derive(Clone, Debug)]
struct Dense {
    weights: Arc<wyrm::HogwildParameter>,
    biases: Arc<wyrm::HogwildParameter>,
}

impl Dense {
    fn new<R: Rng>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        Dense {
            weights: Arc::new(wyrm::HogwildParameter::new(dense_init(
                input_dim, output_dim, rng,
            ))),
            biases: Arc::new(wyrm::HogwildParameter::new(Arr::zeros((1, output_dim)))),
        }
    }

    fn forward(&self, input: &Array1<f32>) -> Array1<f32> {
        let mut output = input.dot(self.weights.value());
        output += &self.biases.value().row(0);
        output.mapv_inplace(|x| x.max(0.0));

        output
    }
}

#[derive(Clone, Debug)]
struct GenreFusion {
    // Fixed; not trained.
    table: Array2<f32>,
    projection: Dense,
}

/// Encodes movie tokens, optionally fused with their genres.
#[derive(Clone, Debug)]
pub struct MovieEncoder {
    embedding: EmbeddingTable,
    genres: Option<GenreFusion>,
}

impl MovieEncoder {
    /// Width of the encoding; the same with or without genre fusion.
    pub fn dim(&self) -> usize {
        self.embedding.dim()
    }

    /// Encode a movie token.
    pub fn encode(&self, movie_id: &str) -> Array1<f32> {
        let idx = self.embedding.index(movie_id);
        let embedding = self.embedding.lookup(idx);

        match self.genres {
            None => embedding,
            Some(ref fusion) => {
                let input: Vec<f32> = embedding
                    .iter()
                    .chain(fusion.table.row(idx).iter())
                    .cloned()
                    .collect();

                fusion.projection.forward(&Array1::from_vec(input))
            }
        }
    }
}

/// An example in model-ready form.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedExample {
    /// One row per window step; the last row is the target movie.
    pub sequence: Array2<f32>,
    /// Concatenated user feature embeddings; empty if none are included.
    pub other_features: Array1<f32>,
    /// Rating to predict.
    pub target_rating: f32,
}

/// Hyperparameters describing the feature encoder.
#[derive(Clone, Debug)]
pub struct Hyperparameters {
    sequence_length: usize,
    include_user_id: bool,
    include_user_features: bool,
    include_movie_features: bool,
    rng: XorShiftRng,
}

impl Hyperparameters {
    /// Build new hyperparameters for windows of `sequence_length` steps.
    pub fn new(sequence_length: usize) -> Self {
        Hyperparameters {
            sequence_length: sequence_length,
            include_user_id: true,
            include_user_features: true,
            include_movie_features: true,
            rng: XorShiftRng::from_seed(rand::thread_rng().gen()),
        }
    }

    /// Whether to embed the user token.
    pub fn include_user_id(mut self, include: bool) -> Self {
        self.include_user_id = include;
        self
    }

    /// Whether to embed sex, age group and occupation.
    pub fn include_user_features(mut self, include: bool) -> Self {
        self.include_user_features = include;
        self
    }

    /// Whether to fuse movie embeddings with genre vectors.
    pub fn include_movie_features(mut self, include: bool) -> Self {
        self.include_movie_features = include;
        self
    }

    /// Set the random number generator.
    pub fn rng(mut self, rng: XorShiftRng) -> Self {
        self.rng = rng;
        self
    }

    /// Set the random number generator from seed.
    pub fn from_seed(mut self, seed: [u8; 16]) -> Self {
        self.rng = XorShiftRng::from_seed(seed);
        self
    }

    /// Build the encoder. Table sizes are fixed from the feature space's
    /// vocabularies at this point.
    pub fn build(mut self, space: &FeatureSpace) -> Result<FeatureEncoder, EncodingError> {
        if self.sequence_length == 0 {
            return Err(EncodingError::ZeroSequenceLength);
        }

        let rng = &mut self.rng;

        let embedding = EmbeddingTable::new(
            CategoricalFeature::MovieId,
            space.vocabulary(CategoricalFeature::MovieId),
            rng,
        );
        let dim = embedding.dim();

        let genres = if self.include_movie_features {
            Some(GenreFusion {
                table: space.genre_table().clone(),
                projection: Dense::new(dim + NUM_GENRES, dim, rng),
            })
        } else {
            None
        };

        let positions = Arc::new(wyrm::HogwildParameter::new(embedding_init(
            self.sequence_length,
            dim,
            rng,
        )));

        let mut features = Vec::new();
        if self.include_user_id {
            features.push(CategoricalFeature::UserId);
        }
        if self.include_user_features {
            features.extend_from_slice(&CategoricalFeature::USER_FEATURES);
        }

        let other = features
            .into_iter()
            .map(|feature| EmbeddingTable::new(feature, space.vocabulary(feature), rng))
            .collect();

        Ok(FeatureEncoder {
            sequence_length: self.sequence_length,
            movies: MovieEncoder { embedding, genres },
            positions,
            other,
        })
    }
}

/// Encodes examples into a step sequence and a user feature vector.
#[derive(Clone, Debug)]
pub struct FeatureEncoder {
    sequence_length: usize,
    movies: MovieEncoder,
    positions: Arc<wyrm::HogwildParameter>,
    other: Vec<EmbeddingTable>,
}

impl FeatureEncoder {
    /// Number of window steps, target included.
    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// The movie encoder shared by history and target steps.
    pub fn movies(&self) -> &MovieEncoder {
        &self.movies
    }

    /// Width of each sequence row.
    pub fn sequence_dim(&self) -> usize {
        self.movies.dim()
    }

    /// Width of the user feature vector.
    pub fn other_dim(&self) -> usize {
        self.other.iter().map(|table| table.dim()).sum()
    }

    /// Encode history movies with their ratings and positions, then append
    /// the target movie.
    pub fn encode_sequence(
        &self,
        movie_ids: &[String],
        ratings: &[f32],
        target_movie_id: &str,
    ) -> Result<Array2<f32>, EncodingError> {
        let history_length = self.sequence_length - 1;

        if movie_ids.len() != history_length {
            return Err(EncodingError::HistoryLength {
                expected: history_length,
                found: movie_ids.len(),
            });
        }
        if ratings.len() != movie_ids.len() {
            return Err(EncodingError::RatingsLength {
                movie_ids: movie_ids.len(),
                ratings: ratings.len(),
            });
        }

        let positions = self.positions.value();
        let mut sequence = Array2::zeros((self.sequence_length, self.sequence_dim()));

        for (idx, movie_id, &rating) in izip!(0.., movie_ids, ratings) {
            let step = (self.movies.encode(movie_id) + &positions.row(idx)) * rating;
            sequence.row_mut(idx).assign(&step);
        }

        sequence
            .row_mut(history_length)
            .assign(&self.movies.encode(target_movie_id));

        Ok(sequence)
    }

    /// Concatenate the embeddings of the included user features.
    pub fn encode_other(&self, example: &Example) -> Array1<f32> {
        let values: Vec<f32> = self.other
            .iter()
            .flat_map(|table| table.encode(example.feature(table.feature())).to_vec())
            .collect();

        Array1::from_vec(values)
    }

    /// Encode one example.
    pub fn encode(&self, example: &Example) -> Result<EncodedExample, EncodingError> {
        Ok(EncodedExample {
            sequence: self.encode_sequence(
                &example.sequence_movie_ids,
                &example.sequence_ratings,
                &example.target_movie_id,
            )?,
            other_features: self.encode_other(example),
            target_rating: example.target_rating,
        })
    }

    /// Encode a batch of examples in parallel.
    pub fn encode_batch(&self, examples: &[Example]) -> Result<Vec<EncodedExample>, EncodingError> {
        examples
            .par_iter()
            .map(|example| self.encode(example))
            .collect()
    }

    /// The trainable tables: movie embeddings, genre projection (if any),
    /// position embeddings, then user feature embeddings.
    pub fn parameters(&self) -> Vec<Arc<wyrm::HogwildParameter>> {
        let mut parameters = vec![self.movies.embedding.parameter().clone()];

        if let Some(ref fusion) = self.movies.genres {
            parameters.push(fusion.projection.weights.clone());
            parameters.push(fusion.projection.biases.clone());
        }

        parameters.push(self.positions.clone());
        parameters.extend(self.other.iter().map(|table| table.parameter().clone()));

        parameters
    }

    /// The trainable tables as nodes sharing their values, for use in a
    /// training graph.
    pub fn parameter_nodes(&self) -> Vec<Variable<wyrm::ParameterNode>> {
        self.parameters()
            .into_iter()
            .map(wyrm::ParameterNode::shared)
            .collect()
    }
}
