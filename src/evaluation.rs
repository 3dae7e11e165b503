//! Running rating models over examples.
use rayon::prelude::*;

use super::{PredictionError, RatingModel};
use dataset::Example;

/// Predict the target rating of every example, in parallel.
///
/// Fails on the first non-finite prediction.
pub fn predict_examples<T: RatingModel + Sync>(
    model: &T,
    examples: &[Example],
) -> Result<Vec<f32>, PredictionError> {
    examples
        .par_iter()
        .map(|example| {
            let prediction = model.predict(example)?;

            if prediction.is_finite() {
                Ok(prediction)
            } else {
                Err(PredictionError::InvalidPredictionValue)
            }
        })
        .collect()
}

/// Root mean squared error of the model's predictions against
/// the target ratings. Zero for no examples.
pub fn rmse_score<T: RatingModel + Sync>(
    model: &T,
    examples: &[Example],
) -> Result<f32, PredictionError> {
    if examples.is_empty() {
        return Ok(0.0);
    }

    let predictions = predict_examples(model, examples)?;
    let squared_error: f32 = predictions
        .iter()
        .zip(examples)
        .map(|(prediction, example)| (prediction - example.target_rating).powi(2))
        .sum();

    Ok((squared_error / examples.len() as f32).sqrt())
}

#[cfg(test)]
mod tests {
    use std;

    use super::*;

    struct LastRating;

    impl RatingModel for LastRating {
        fn predict(&self, example: &Example) -> Result<f32, PredictionError> {
            Ok(*example.sequence_ratings.last().unwrap_or(&3.0))
        }
    }

    struct Broken;

    impl RatingModel for Broken {
        fn predict(&self, _: &Example) -> Result<f32, PredictionError> {
            Ok(std::f32::NAN)
        }
    }

    fn example(ratings: &[f32]) -> Example {
        let movie_ids: Vec<String> = (0..ratings.len())
            .map(|idx| format!("movie_{}", idx))
            .collect();

        Example {
            user_id: "user_1".to_owned(),
            sequence_movie_ids: movie_ids[..movie_ids.len() - 1].to_vec(),
            target_movie_id: movie_ids[movie_ids.len() - 1].clone(),
            sequence_ratings: ratings[..ratings.len() - 1].to_vec(),
            target_rating: ratings[ratings.len() - 1],
            sex: "M".to_owned(),
            age_group: "group_25".to_owned(),
            occupation: "occupation_4".to_owned(),
        }
    }

    #[test]
    fn predictions_keep_example_order() {
        let examples: Vec<Example> = (1..6)
            .map(|rating| example(&[1.0, rating as f32, 5.0]))
            .collect();

        let predictions = predict_examples(&LastRating, &examples).unwrap();

        assert_eq!(predictions, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn rejects_non_finite_predictions() {
        let examples = vec![example(&[1.0, 2.0])];

        match predict_examples(&Broken, &examples) {
            Err(PredictionError::InvalidPredictionValue) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
        assert!(rmse_score(&Broken, &examples).is_err());
    }

    #[test]
    fn rmse_of_last_rating_baseline() {
        // Errors of 0 and 2.
        let examples = vec![example(&[4.0, 4.0]), example(&[1.0, 3.0])];

        let rmse = rmse_score(&LastRating, &examples).unwrap();

        assert!((rmse - 2.0f32.sqrt()).abs() < 1e-6);
        assert_eq!(rmse_score(&LastRating, &[]).unwrap(), 0.0);
    }
}
