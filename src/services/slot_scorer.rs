use std::collections::HashMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Rates a candidate slot in `[0, 1]`, higher is better.
///
/// Only consulted to choose between slots that already satisfy every hard
/// constraint. Implementations must be deterministic and side-effect free.
pub trait SlotScorer: Send + Sync {
    fn score(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64;
}

/// Weekday mid-mornings score highest, evenings and weekends lowest.
#[derive(Debug, Clone, Copy)]
pub struct RuleBasedSlotScorer {
    tz: Tz,
}

impl RuleBasedSlotScorer {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Default for RuleBasedSlotScorer {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl SlotScorer for RuleBasedSlotScorer {
    fn score(&self, start: DateTime<Utc>, _end: DateTime<Utc>) -> f64 {
        let local = start.with_timezone(&self.tz);
        let hour_score: f64 = match local.hour() {
            9..=11 => 0.7,
            13..=16 => 0.5,
            8 | 12 | 17 => 0.3,
            _ => 0.1,
        };
        let weekday_score = if local.weekday().num_days_from_monday() < 5 {
            0.3
        } else {
            0.0
        };
        (hour_score + weekday_score).clamp(0.0, 1.0)
    }
}

/// Observed behaviour for one (weekday, hour) cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HourlyPattern {
    pub completion_rate: f64,
    pub productivity_score: f64,
    pub samples: u32,
}

/// Slot scorer learned from a user's completion history.
///
/// Cells without observations fall back to the rule-based score; observed cells
/// blend the rule-based score with the learned productivity half and half.
#[derive(Debug, Clone)]
pub struct HabitSlotScorer {
    fallback: RuleBasedSlotScorer,
    tz: Tz,
    patterns: HashMap<(u32, u32), HourlyPattern>,
}

impl HabitSlotScorer {
    pub fn new(tz: Tz) -> Self {
        Self {
            fallback: RuleBasedSlotScorer::new(tz),
            tz,
            patterns: HashMap::new(),
        }
    }

    /// `weekday` counts from Monday = 0.
    ///
    /// Repeated observations are exponentially smoothed with weight 1/2: the cell becomes
    /// `(old + new) / 2`, so recent observations dominate. `samples` only counts them.
    pub fn record(&mut self, weekday: u32, hour: u32, completion_rate: f64, productivity_score: f64) {
        let completion_rate = completion_rate.clamp(0.0, 1.0);
        let productivity_score = productivity_score.clamp(0.0, 1.0);
        self.patterns
            .entry((weekday % 7, hour % 24))
            .and_modify(|pattern| {
                pattern.completion_rate = (pattern.completion_rate + completion_rate) / 2.0;
                pattern.productivity_score =
                    (pattern.productivity_score + productivity_score) / 2.0;
                pattern.samples += 1;
            })
            .or_insert(HourlyPattern {
                completion_rate,
                productivity_score,
                samples: 1,
            });
    }

    pub fn pattern(&self, weekday: u32, hour: u32) -> Option<&HourlyPattern> {
        self.patterns.get(&(weekday, hour))
    }
}

impl SlotScorer for HabitSlotScorer {
    fn score(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        let base = self.fallback.score(start, end);
        let local = start.with_timezone(&self.tz);
        let key = (local.weekday().num_days_from_monday(), local.hour());
        match self.patterns.get(&key) {
            Some(pattern) => {
                let learned = (pattern.completion_rate + pattern.productivity_score) / 2.0;
                (0.5 * base + 0.5 * learned).clamp(0.0, 1.0)
            }
            None => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    // 2025-05-05 is a Monday
    fn monday(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 5, h, 0, 0).unwrap()
    }

    #[test]
    fn weekday_mid_morning_is_best() {
        let scorer = RuleBasedSlotScorer::default();
        let best = scorer.score(monday(10), monday(11));
        assert!((best - 1.0).abs() < f64::EPSILON);
        assert!(scorer.score(monday(14), monday(15)) < best);
        let saturday = monday(10) + Duration::days(5);
        assert!(scorer.score(saturday, saturday + Duration::hours(1)) < best);
    }

    #[test]
    fn scores_stay_in_unit_range() {
        let scorer = RuleBasedSlotScorer::default();
        for hour in 0..24 {
            let s = scorer.score(monday(hour), monday(hour) + Duration::minutes(30));
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn habit_scorer_blends_observed_cells_only() {
        let mut scorer = HabitSlotScorer::new(Tz::UTC);
        scorer.record(0, 15, 1.0, 1.0);
        let rule = RuleBasedSlotScorer::default();

        let observed = scorer.score(monday(15), monday(16));
        assert!(observed > rule.score(monday(15), monday(16)));
        assert_eq!(scorer.score(monday(10), monday(11)), rule.score(monday(10), monday(11)));

        scorer.record(0, 15, 0.0, 0.0);
        let pattern = scorer.pattern(0, 15).unwrap();
        assert_eq!(pattern.samples, 2);
        assert!((pattern.completion_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn habit_cells_weight_recent_observations() {
        let mut scorer = HabitSlotScorer::new(Tz::UTC);
        scorer.record(2, 9, 1.0, 1.0);
        scorer.record(2, 9, 0.0, 0.0);
        scorer.record(2, 9, 0.0, 0.0);

        // 1.0 -> 0.5 -> 0.25, not the plain mean of 1/3.
        let pattern = scorer.pattern(2, 9).unwrap();
        assert_eq!(pattern.samples, 3);
        assert!((pattern.completion_rate - 0.25).abs() < f64::EPSILON);
        assert!((pattern.productivity_score - 0.25).abs() < f64::EPSILON);
    }
}
