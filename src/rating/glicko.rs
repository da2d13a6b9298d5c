use std::f64::consts::PI;

use super::types::{OpponentSample, RatingAlgorithm, RatingState};
use crate::config::settings::RatingSettings;

// Glicko-2 internal scale factor (400 / ln 10)
const SCALE: f64 = 173.7178;
const VOLATILITY_EPSILON: f64 = 1e-6;
const MAX_VOLATILITY_ITERATIONS: usize = 100;

/// Glicko-2 as described by Mark Glickman, one rating period per session.
#[derive(Debug, Clone)]
pub struct Glicko2 {
    default_rating: f64,
    default_deviation: f64,
    default_volatility: f64,
    tau: f64,
}

impl Glicko2 {
    pub fn new(settings: &RatingSettings) -> Self {
        Self {
            default_rating: settings.default_rating,
            default_deviation: settings.default_deviation,
            default_volatility: settings.default_volatility,
            tau: settings.tau,
        }
    }

    fn to_mu(&self, rating: f64) -> f64 {
        (rating - self.default_rating) / SCALE
    }

    fn from_mu(&self, mu: f64) -> f64 {
        mu * SCALE + self.default_rating
    }

    /// Illinois iteration for the new volatility (step 5 of the paper).
    fn new_volatility(&self, phi: f64, sigma: f64, v: f64, delta: f64) -> f64 {
        let a = (sigma * sigma).ln();
        let tau = self.tau;
        let f = |x: f64| {
            let ex = x.exp();
            let denom = phi * phi + v + ex;
            ex * (delta * delta - phi * phi - v - ex) / (2.0 * denom * denom) - (x - a) / (tau * tau)
        };

        let mut lower = a;
        let mut upper = if delta * delta > phi * phi + v {
            (delta * delta - phi * phi - v).ln()
        } else {
            let mut k = 1.0;
            while f(a - k * tau) < 0.0 {
                k += 1.0;
            }
            a - k * tau
        };

        let mut f_lower = f(lower);
        let mut f_upper = f(upper);
        for _ in 0..MAX_VOLATILITY_ITERATIONS {
            if (upper - lower).abs() <= VOLATILITY_EPSILON {
                break;
            }
            let candidate = lower + (lower - upper) * f_lower / (f_upper - f_lower);
            let f_candidate = f(candidate);
            if f_candidate * f_upper <= 0.0 {
                lower = upper;
                f_lower = f_upper;
            } else {
                f_lower /= 2.0;
            }
            upper = candidate;
            f_upper = f_candidate;
        }

        (lower / 2.0).exp()
    }
}

fn g(phi: f64) -> f64 {
    1.0 / (1.0 + 3.0 * phi * phi / (PI * PI)).sqrt()
}

fn expected(mu: f64, mu_j: f64, phi_j: f64) -> f64 {
    1.0 / (1.0 + (-g(phi_j) * (mu - mu_j)).exp())
}

impl RatingAlgorithm for Glicko2 {
    fn initial(&self) -> RatingState {
        RatingState {
            rating: self.default_rating,
            deviation: self.default_deviation,
            volatility: self.default_volatility,
        }
    }

    fn rate(&self, current: RatingState, samples: &[OpponentSample]) -> RatingState {
        if samples.is_empty() {
            return current;
        }

        let mu = self.to_mu(current.rating);
        let phi = current.deviation / SCALE;

        let mut v_inv = 0.0;
        let mut delta_sum = 0.0;
        for sample in samples {
            let mu_j = self.to_mu(sample.opponent.rating);
            let phi_j = sample.opponent.deviation / SCALE;
            let g_j = g(phi_j);
            let e_j = expected(mu, mu_j, phi_j);
            v_inv += g_j * g_j * e_j * (1.0 - e_j);
            delta_sum += g_j * (sample.score - e_j);
        }
        if v_inv <= 0.0 {
            return current;
        }

        let v = 1.0 / v_inv;
        let delta = v * delta_sum;
        let sigma = self.new_volatility(phi, current.volatility, v, delta);

        let phi_star = (phi * phi + sigma * sigma).sqrt();
        let phi_new = 1.0 / (1.0 / (phi_star * phi_star) + 1.0 / v).sqrt();
        let mu_new = mu + phi_new * phi_new * delta_sum;

        RatingState {
            rating: self.from_mu(mu_new),
            // deviation only grows through decay, never through play
            deviation: (phi_new * SCALE).min(current.deviation),
            volatility: sigma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glicko() -> Glicko2 {
        Glicko2::new(&RatingSettings::default())
    }

    fn state(rating: f64, deviation: f64) -> RatingState {
        RatingState {
            rating,
            deviation,
            volatility: 0.06,
        }
    }

    #[test]
    fn test_glickman_reference_example() {
        // Worked example from the Glicko-2 paper, tau = 0.5
        let player = state(1500.0, 200.0);
        let samples = [
            OpponentSample { opponent: state(1400.0, 30.0), score: 1.0 },
            OpponentSample { opponent: state(1550.0, 100.0), score: 0.0 },
            OpponentSample { opponent: state(1700.0, 300.0), score: 0.0 },
        ];

        let rated = glicko().rate(player, &samples);

        assert!((rated.rating - 1464.06).abs() < 0.05, "rating {}", rated.rating);
        assert!((rated.deviation - 151.52).abs() < 0.05, "deviation {}", rated.deviation);
        assert!((rated.volatility - 0.05999).abs() < 0.0001, "volatility {}", rated.volatility);
    }

    #[test]
    fn test_winner_gains_loser_drops() {
        let g = glicko();
        let a = g.initial();
        let b = g.initial();

        let a2 = g.rate(a, &[OpponentSample { opponent: b, score: 1.0 }]);
        let b2 = g.rate(b, &[OpponentSample { opponent: a, score: 0.0 }]);

        assert!(a2.rating > a.rating);
        assert!(b2.rating < b.rating);
        assert!((a2.rating - 1500.0 - (1500.0 - b2.rating)).abs() < 1e-9);
    }

    #[test]
    fn test_deviation_never_increases_through_play() {
        let g = glicko();
        let confident = state(1500.0, 40.0);
        let unknown = state(1500.0, 350.0);

        let rated = g.rate(confident, &[OpponentSample { opponent: unknown, score: 0.5 }]);
        assert!(rated.deviation <= confident.deviation);
    }

    #[test]
    fn test_no_games_is_identity() {
        let g = glicko();
        let s = state(1612.5, 80.0);
        assert_eq!(g.rate(s, &[]), s);
    }

    #[test]
    fn test_rate_is_bit_reproducible() {
        let g = glicko();
        let samples = [OpponentSample { opponent: state(1720.0, 90.0), score: 1.0 }];
        let first = g.rate(state(1480.0, 120.0), &samples);
        let second = g.rate(state(1480.0, 120.0), &samples);
        assert_eq!(first.rating.to_bits(), second.rating.to_bits());
        assert_eq!(first.deviation.to_bits(), second.deviation.to_bits());
    }
}
