#![deny(missing_docs)]
//! # bst
//!
//! `bst` prepares user/movie rating histories for behavioural-sequence
//! rating models: given the movies a user has recently rated, a model
//! predicts the rating the user will give the next movie.
//!
//! The crate covers the data side of such a model:
//!
//! - loading the MovieLens-1M tables ([`data`]),
//! - namespacing identifiers and building vocabularies and genre vectors
//!   ([`features`]),
//! - slicing each user's time-ordered ratings into fixed-width windows
//!   ([`sequences`]),
//! - turning windows into pipe-delimited train/test rows and reading them
//!   back as model examples ([`dataset`]),
//! - embedding examples into the per-step feature matrix fed to
//!   self-attention ([`encoder`]).
//!
//! [`pipeline`] ties the first four stages together behind a JSON-loadable
//! configuration, and [`evaluation`] runs any [`RatingModel`] over examples.
//!
//! ## Example
//!
//! ```rust,no_run
//! # extern crate bst;
//! use bst::encoder::Hyperparameters;
//! use bst::pipeline::{self, PipelineConfig};
//!
//! let config = PipelineConfig::new().sequence_length(4).step_size(2).seed(42);
//! let prepared = pipeline::run("ml-1m", ".", &config).unwrap();
//!
//! let train = prepared.train_examples().unwrap();
//! let encoder = Hyperparameters::new(4)
//!     .from_seed([42; 16])
//!     .build(&prepared.feature_space)
//!     .unwrap();
//!
//! let batch = train.iter_minibatch(128).next().unwrap();
//! let encoded = encoder.encode_batch(batch).unwrap();
//!
//! println!("Sequence features: {:?}", encoded[0].sequence.dim());
//! ```
#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate itertools;

#[macro_use]
extern crate failure;

#[macro_use]
extern crate tracing;

extern crate csv;
extern crate ndarray;
extern crate rand;
extern crate rayon;
extern crate serde;
extern crate serde_json;
extern crate wyrm;

#[cfg(test)]
extern crate tempfile;

pub mod data;
pub mod dataset;
pub mod encoder;
pub mod evaluation;
pub mod features;
pub mod pipeline;
pub mod sequences;

/// Alias for rating timestamps (seconds since the Unix epoch).
pub type Timestamp = u64;

/// Prediction error types.
#[derive(Debug, Fail)]
pub enum PredictionError {
    /// Failed prediction due to numerical issues.
    #[fail(display = "Invalid prediction value: non-finite or not a number.")]
    InvalidPredictionValue,
    /// The model could not turn the example into features.
    #[fail(display = "Cannot encode example: {}", _0)]
    Encoding(#[cause] encoder::EncodingError),
}

impl From<encoder::EncodingError> for PredictionError {
    fn from(error: encoder::EncodingError) -> Self {
        PredictionError::Encoding(error)
    }
}

/// Trait describing models that predict the rating a user gives
/// the target movie of an example, given the example's history
/// and the user's features.
pub trait RatingModel {
    /// Predict the rating of `example.target_movie_id`.
    fn predict(&self, example: &dataset::Example) -> Result<f32, PredictionError>;
}
