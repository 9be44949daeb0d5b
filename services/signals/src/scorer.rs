//! Fusion of rule score and model probability into a final signal score.

use types::Side;

/// Direction decision threshold on the fused score.
pub const DIRECTION_THRESHOLD: f64 = 0.35;

/// Fused result: score in [-1, +1], direction and confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalScore {
    pub score: f64,
    pub side: Side,
    pub confidence: f64,
}

/// `0.6 · clamp(rule, −1, 1) + 0.4 · (2·clamp(p, 0, 1) − 1)`.
pub fn final_score(rule_score: f64, prob_tp: f64) -> f64 {
    let rule = rule_score.clamp(-1.0, 1.0);
    let ml_scaled = 2.0 * prob_tp.clamp(0.0, 1.0) - 1.0;
    0.6 * rule + 0.4 * ml_scaled
}

pub fn direction_from_score(score: f64) -> Side {
    if score >= DIRECTION_THRESHOLD {
        Side::Long
    } else if score <= -DIRECTION_THRESHOLD {
        Side::Short
    } else {
        Side::Neutral
    }
}

pub fn score_to_confidence(score: f64) -> f64 {
    score.abs().clamp(0.0, 1.0)
}

/// Full fusion: score, direction and confidence in one step.
pub fn fuse(rule_score: f64, prob_tp: f64) -> FinalScore {
    let score = final_score(rule_score, prob_tp);
    FinalScore {
        score,
        side: direction_from_score(score),
        confidence: score_to_confidence(score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn long_short_neutral_examples() {
        // 0.6*0.5 + 0.4*(2*0.8-1) = 0.54
        let long = fuse(0.5, 0.8);
        assert!((long.score - 0.54).abs() < 1e-12);
        assert_eq!(long.side, Side::Long);
        assert!((long.confidence - 0.54).abs() < 1e-12);

        // 0.6*(-0.6) + 0.4*(2*0.2-1) = -0.60
        let short = fuse(-0.6, 0.2);
        assert!((short.score + 0.60).abs() < 1e-12);
        assert_eq!(short.side, Side::Short);
        assert!((short.confidence - 0.60).abs() < 1e-12);

        // 0.6*0.1 + 0.4*0 = 0.06
        let neutral = fuse(0.1, 0.5);
        assert!((neutral.score - 0.06).abs() < 1e-12);
        assert_eq!(neutral.side, Side::Neutral);
        assert!((neutral.confidence - 0.06).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        assert_eq!(final_score(5.0, 2.0), 1.0);
        assert_eq!(final_score(-5.0, -1.0), -1.0);
    }

    proptest! {
        // monotone in each argument with the other fixed
        #[test]
        fn monotone_in_rule_score(a in -1.0f64..1.0, b in -1.0f64..1.0, p in 0.0f64..1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(final_score(lo, p) <= final_score(hi, p) + 1e-12);
        }

        #[test]
        fn monotone_in_prob(rule in -1.0f64..1.0, p in 0.0f64..1.0, q in 0.0f64..1.0) {
            let (lo, hi) = if p <= q { (p, q) } else { (q, p) };
            prop_assert!(final_score(rule, lo) <= final_score(rule, hi) + 1e-12);
        }

        #[test]
        fn score_stays_bounded(rule in -2.0f64..2.0, p in -1.0f64..2.0) {
            let s = final_score(rule, p);
            prop_assert!((-1.0..=1.0).contains(&s));
        }
    }
}
