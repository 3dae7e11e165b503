#[macro_use]
extern crate criterion;

extern crate bst;
extern crate rand;

use criterion::Criterion;
use rand::prng::XorShiftRng;
use rand::{Rng, SeedableRng};

use bst::dataset::{materialize, write_rows_to, RowSchema};
use bst::features::{namespaced, Event, UserProfile, AGE_GROUP_PREFIX, MOVIE_PREFIX,
                    OCCUPATION_PREFIX, USER_PREFIX};
use bst::sequences::{UserSequences, WindowConfig};

fn synthetic_history(num_users: u32, events_per_user: u32) -> (Vec<UserProfile>, Vec<Event>) {
    let mut rng = XorShiftRng::from_seed([42; 16]);

    let users = (1..num_users + 1)
        .map(|user_id| UserProfile {
            user_id: namespaced(USER_PREFIX, user_id),
            sex: if user_id % 2 == 0 { "M" } else { "F" }.to_owned(),
            age_group: namespaced(AGE_GROUP_PREFIX, user_id % 7),
            occupation: namespaced(OCCUPATION_PREFIX, user_id % 21),
        })
        .collect();

    let mut events = Vec::new();
    for user_id in 1..num_users + 1 {
        for _ in 0..events_per_user {
            events.push(Event {
                user_id: namespaced(USER_PREFIX, user_id),
                movie_id: namespaced(MOVIE_PREFIX, rng.gen_range(1, 3884)),
                rating: rng.gen_range(1, 6) as f32,
                timestamp: rng.gen_range(956_703_932, 1_046_454_590),
            });
        }
    }

    rng.shuffle(&mut events);

    (users, events)
}

fn bench_windowing(c: &mut Criterion) {
    c.bench_function("window_and_materialize", |b| {
        let (users, events) = synthetic_history(1000, 160);
        let config = WindowConfig::new(4, 2).unwrap();

        b.iter(|| {
            let sequences = UserSequences::from(&events[..]);
            materialize(&sequences, &users, &config).unwrap()
        })
    });
}

fn bench_writing(c: &mut Criterion) {
    c.bench_function("write_rows", |b| {
        let (users, events) = synthetic_history(1000, 160);
        let config = WindowConfig::new(4, 2).unwrap();
        let rows = materialize(&UserSequences::from(&events[..]), &users, &config).unwrap();
        let schema = RowSchema::default();

        b.iter(|| {
            let mut buffer = Vec::new();
            write_rows_to(&mut buffer, &rows, &schema).unwrap();
            buffer
        })
    });
}

criterion_group!{
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_windowing, bench_writing
}
criterion_main!(benches);
