use crate::config::stars::{HIGH, LOW, MAX_STARS};

/// Number of stars (0–5) shown next to a paper in the digest. 0 means no rating is shown.
pub fn star_rating(score: f64) -> u8 {
    if score <= LOW {
        0
    } else if score >= HIGH {
        MAX_STARS
    } else {
        stars_for_fraction((score - LOW) / (HIGH - LOW))
    }
}

/// Position inside the band, `0..1`, to stars. Halves round to even.
fn stars_for_fraction(fraction: f64) -> u8 {
    (fraction * MAX_STARS as f64).round_ties_even().clamp(1.0, MAX_STARS as f64) as u8
}
