//! Per-user, time-ordered rating sequences and fixed-width windows over them.
use std::cmp::Ordering;

use features::Event;
use Timestamp;

/// Window error types.
#[derive(Debug, Fail)]
pub enum WindowError {
    /// Windows must hold at least one event.
    #[fail(display = "Window size must be at least 1.")]
    ZeroSize,
    /// The window must advance.
    #[fail(display = "Window stride must be at least 1.")]
    ZeroStride,
}

/// Window size and stride.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    size: usize,
    stride: usize,
}

impl WindowConfig {
    /// Build a window configuration; both values must be positive.
    pub fn new(size: usize, stride: usize) -> Result<Self, WindowError> {
        if size == 0 {
            return Err(WindowError::ZeroSize);
        }
        if stride == 0 {
            return Err(WindowError::ZeroStride);
        }

        Ok(WindowConfig { size, stride })
    }

    /// Number of events per window.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Distance between successive window starts.
    pub fn stride(&self) -> usize {
        self.stride
    }
}

/// Start offsets of the windows over a sequence of `len` elements.
///
/// Windows start at 0 and advance by the stride while a full window
/// fits. If the last full window stops short of the end of the sequence,
/// one extra window covering the last `size` elements is added.
/// Sequences shorter than a window have none.
pub fn window_offsets(len: usize, config: &WindowConfig) -> Vec<usize> {
    let mut offsets = Vec::new();

    if len < config.size {
        return offsets;
    }

    let mut start = 0;
    while start + config.size <= len {
        offsets.push(start);
        start += config.stride;
    }

    let tail = len - config.size;
    if offsets.last().map_or(true, |&last| last < tail) {
        offsets.push(tail);
    }

    offsets
}

/// Slice `values` into windows.
pub fn windows<'a, T>(values: &'a [T], config: &WindowConfig) -> Vec<&'a [T]> {
    window_offsets(values.len(), config)
        .into_iter()
        .map(|start| &values[start..start + config.size])
        .collect()
}

fn cmp_timestamp(x: &Event, y: &Event) -> Ordering {
    let uid_comparison = x.user_id.cmp(&y.user_id);

    if uid_comparison == Ordering::Equal {
        x.timestamp.cmp(&y.timestamp)
    } else {
        uid_comparison
    }
}

/// Rating events grouped by user and ordered by time.
///
/// Users are ordered by token. Events with equal timestamps keep
/// their input order.
#[derive(Clone, Debug, Default)]
pub struct UserSequences {
    user_ids: Vec<String>,
    user_pointers: Vec<usize>,
    movie_ids: Vec<String>,
    ratings: Vec<f32>,
    timestamps: Vec<Timestamp>,
}

impl<'a> From<&'a [Event]> for UserSequences {
    fn from(events: &[Event]) -> UserSequences {
        let mut data: Vec<&Event> = events.iter().collect();

        // Stable: ties keep file order.
        data.sort_by(|x, y| cmp_timestamp(x, y));

        let mut user_ids: Vec<String> = Vec::new();
        let mut user_pointers = Vec::new();
        let mut movie_ids = Vec::with_capacity(data.len());
        let mut ratings = Vec::with_capacity(data.len());
        let mut timestamps = Vec::with_capacity(data.len());

        for datum in data {
            if user_ids.last() != Some(&datum.user_id) {
                user_ids.push(datum.user_id.clone());
                user_pointers.push(movie_ids.len());
            }

            movie_ids.push(datum.movie_id.clone());
            ratings.push(datum.rating);
            timestamps.push(datum.timestamp);
        }

        user_pointers.push(movie_ids.len());

        UserSequences {
            user_ids,
            user_pointers,
            movie_ids,
            ratings,
            timestamps,
        }
    }
}

impl UserSequences {
    /// Iterate over users in token order.
    pub fn iter_users(&self) -> UserSequencesIterator {
        UserSequencesIterator {
            sequences: self,
            idx: 0,
        }
    }

    /// The sequence of a single user.
    pub fn get_user(&self, user_id: &str) -> Option<UserSequence> {
        self.user_ids
            .binary_search_by(|probe| probe.as_str().cmp(user_id))
            .ok()
            .map(|idx| self.user(idx))
    }

    fn user(&self, idx: usize) -> UserSequence {
        let start = self.user_pointers[idx];
        let stop = self.user_pointers[idx + 1];

        UserSequence {
            user_id: &self.user_ids[idx],
            movie_ids: &self.movie_ids[start..stop],
            ratings: &self.ratings[start..stop],
            timestamps: &self.timestamps[start..stop],
        }
    }

    /// Number of users with at least one event.
    pub fn num_users(&self) -> usize {
        self.user_ids.len()
    }

    /// Total number of events.
    pub fn len(&self) -> usize {
        self.movie_ids.len()
    }

    /// Whether there are no events.
    pub fn is_empty(&self) -> bool {
        self.movie_ids.is_empty()
    }

    /// Total number of windows over all users.
    pub fn num_windows(&self, config: &WindowConfig) -> usize {
        self.iter_users()
            .map(|user| window_offsets(user.len(), config).len())
            .sum()
    }
}

/// Iterator over the users of [`UserSequences`].
pub struct UserSequencesIterator<'a> {
    sequences: &'a UserSequences,
    idx: usize,
}

impl<'a> Iterator for UserSequencesIterator<'a> {
    type Item = UserSequence<'a>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.sequences.num_users() {
            return None;
        }

        let value = self.sequences.user(self.idx);
        self.idx += 1;

        Some(value)
    }
}

/// One user's events, oldest first.
#[derive(Clone, Copy, Debug)]
pub struct UserSequence<'a> {
    /// User token.
    pub user_id: &'a str,
    /// Movie tokens.
    pub movie_ids: &'a [String],
    /// Ratings, aligned with `movie_ids`.
    pub ratings: &'a [f32],
    /// Timestamps, aligned with `movie_ids`.
    pub timestamps: &'a [Timestamp],
}

impl<'a> UserSequence<'a> {
    /// Number of events.
    pub fn len(&self) -> usize {
        self.movie_ids.len()
    }

    /// Whether the user has no events.
    pub fn is_empty(&self) -> bool {
        self.movie_ids.is_empty()
    }

    /// Windows over the user's events. Movies and ratings are cut
    /// at the same offsets.
    pub fn windows(&self, config: &WindowConfig) -> Vec<Window<'a>> {
        window_offsets(self.len(), config)
            .into_iter()
            .map(|start| {
                let stop = start + config.size();

                Window {
                    user_id: self.user_id,
                    movie_ids: &self.movie_ids[start..stop],
                    ratings: &self.ratings[start..stop],
                }
            })
            .collect()
    }
}

/// A fixed-width slice of one user's events. The last event is the
/// target, the ones before it the history.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Window<'a> {
    /// User token.
    pub user_id: &'a str,
    /// Movie tokens.
    pub movie_ids: &'a [String],
    /// Ratings, aligned with `movie_ids`.
    pub ratings: &'a [f32],
}
