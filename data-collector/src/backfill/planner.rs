//! Chunk planning
//!
//! Splits an overall `[start, end)` range and an entity list into
//! provider-compliant tasks. Entities are grouped by scope (first-seen
//! order), batched by the provider's per-request limit, and every batch is
//! crossed with the windows of its scope's chunk strategy.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use thiserror::Error;

use crate::schema::{EntitySpec, FetchTask, TimeWindow};
use collector_common::error::{ErrorCategory, ErrorClassification};

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum PlanError {
    #[error("range end {end} is before start {start}")]
    InvertedRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("invalid chunk strategy: {0}")]
    InvalidStrategy(String),
}

impl ErrorClassification for PlanError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Per-call value budget: the provider caps the number of values one
/// response may carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueBudget {
    pub max_values_per_call: u64,
    pub columns: u64,
    /// Rows the provider returns per `unit` for one entity
    pub intervals_per_unit: u64,
    pub unit: Duration,
}

impl ValueBudget {
    /// Number of whole units one call may span for `entities` entities,
    /// minus one unit of slack, never below one unit.
    pub fn units_per_call(&self, entities: usize) -> i64 {
        let per_unit = self
            .columns
            .saturating_mul(self.intervals_per_unit)
            .saturating_mul(entities.max(1) as u64);
        if per_unit == 0 {
            return 1;
        }
        let units = i64::try_from(self.max_values_per_call / per_unit).unwrap_or(i64::MAX);
        (units - 1).max(1)
    }

    /// Saturates at the largest span chrono can represent.
    pub fn span(&self, entities: usize) -> Duration {
        let units = i32::try_from(self.units_per_call(entities)).unwrap_or(i32::MAX);
        self.unit.checked_mul(units).unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChunkStrategy {
    /// Windows of a constant maximum span, last one clipped
    Fixed(Duration),
    /// Span derived from the provider's value budget
    ValueBudget(ValueBudget),
    /// One window per calendar month
    CalendarMonth,
    /// One window per calendar day
    CalendarDay,
    /// The whole range in a single request
    Single,
}

/// Windows covering `[start, end)` for one entity batch.
pub fn plan_windows(
    strategy: ChunkStrategy,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    batch_len: usize,
) -> Result<Vec<TimeWindow>, PlanError> {
    if end < start {
        return Err(PlanError::InvertedRange { start, end });
    }
    if end == start {
        return Ok(Vec::new());
    }

    let mut windows = Vec::new();
    match strategy {
        ChunkStrategy::Single => windows.push(window(start, end)?),
        ChunkStrategy::Fixed(span) => fixed_windows(&mut windows, start, end, span)?,
        ChunkStrategy::ValueBudget(budget) => {
            fixed_windows(&mut windows, start, end, budget.span(batch_len))?
        }
        ChunkStrategy::CalendarMonth => {
            let mut cursor = first_of_month(start.date_naive());
            while to_utc(cursor) < end {
                let next = cursor
                    .checked_add_months(Months::new(1))
                    .ok_or_else(|| PlanError::InvalidStrategy("month overflow".into()))?;
                windows.push(window(to_utc(cursor).max(start), to_utc(next).min(end))?);
                cursor = next;
            }
        }
        ChunkStrategy::CalendarDay => {
            let mut cursor = start.date_naive();
            while to_utc(cursor) < end {
                let next = cursor
                    .succ_opt()
                    .ok_or_else(|| PlanError::InvalidStrategy("day overflow".into()))?;
                windows.push(window(to_utc(cursor).max(start), to_utc(next).min(end))?);
                cursor = next;
            }
        }
    }
    Ok(windows)
}

fn fixed_windows(
    out: &mut Vec<TimeWindow>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    span: Duration,
) -> Result<(), PlanError> {
    if span <= Duration::zero() {
        return Err(PlanError::InvalidStrategy(format!(
            "chunk span must be positive, got {}",
            span
        )));
    }
    let mut cursor = start;
    while cursor < end {
        let next = cursor.checked_add_signed(span).map_or(end, |next| next.min(end));
        out.push(window(cursor, next)?);
        cursor = next;
    }
    Ok(())
}

fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<TimeWindow, PlanError> {
    TimeWindow::new(start, end).map_err(|e| PlanError::InvalidStrategy(e.to_string()))
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn to_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Cross entity batches with time windows.
///
/// `strategy_for` picks the chunking for each scope group. An empty entity
/// list or an empty range yields no tasks.
pub fn plan_tasks<F>(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    entities: &[EntitySpec],
    max_per_request: usize,
    strategy_for: F,
) -> Result<Vec<FetchTask>, PlanError>
where
    F: Fn(Option<&str>) -> ChunkStrategy,
{
    if end < start {
        return Err(PlanError::InvertedRange { start, end });
    }
    if entities.is_empty() || end == start {
        return Ok(Vec::new());
    }

    // Group by scope, keeping first-seen order of scopes and entities
    let mut groups: Vec<(Option<String>, Vec<String>)> = Vec::new();
    for entity in entities {
        match groups.iter_mut().find(|(scope, _)| *scope == entity.scope) {
            Some((_, ids)) => {
                if !ids.contains(&entity.id) {
                    ids.push(entity.id.clone())
                }
            }
            None => groups.push((entity.scope.clone(), vec![entity.id.clone()])),
        }
    }

    let batch_size = max_per_request.max(1);
    let mut tasks = Vec::new();
    for (scope, ids) in groups {
        let strategy = strategy_for(scope.as_deref());
        for batch in ids.chunks(batch_size) {
            for window in plan_windows(strategy, start, end, batch.len())? {
                tasks.push(FetchTask {
                    id: tasks.len(),
                    entities: batch.to_vec(),
                    scope: scope.clone(),
                    window,
                });
            }
        }
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn assert_covers(windows: &[TimeWindow], start: DateTime<Utc>, end: DateTime<Utc>) {
        assert_eq!(windows.first().unwrap().start(), start);
        assert_eq!(windows.last().unwrap().end(), end);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start(), "gap or overlap at {}", pair[0]);
        }
        let total = windows.iter().fold(Duration::zero(), |acc, w| acc + w.span());
        assert_eq!(total, end - start);
    }

    #[test]
    fn test_calendar_months_q1_2024() {
        let windows =
            plan_windows(ChunkStrategy::CalendarMonth, day(2024, 1, 1), day(2024, 4, 1), 1).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[1].span(), Duration::days(29));
        assert_covers(&windows, day(2024, 1, 1), day(2024, 4, 1));
        let days: i64 = windows.iter().map(|w| w.span().num_days()).sum();
        assert_eq!(days, 91);
    }

    #[test]
    fn test_fixed_30_days_clips_last_chunk() {
        let windows = plan_windows(
            ChunkStrategy::Fixed(Duration::days(30)),
            day(2024, 1, 1),
            day(2024, 4, 1),
            1,
        )
        .unwrap();
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[3].span(), Duration::days(1));
        assert_covers(&windows, day(2024, 1, 1), day(2024, 4, 1));
    }

    #[test]
    fn test_fixed_windows_cover_range_for_many_spans() {
        let start = day(2023, 3, 17) + Duration::hours(5);
        let end = day(2024, 11, 2) + Duration::minutes(13);
        for span_days in [1, 7, 30, 90, 365, 1000] {
            let windows =
                plan_windows(ChunkStrategy::Fixed(Duration::days(span_days)), start, end, 1).unwrap();
            assert_covers(&windows, start, end);
            assert!(windows.iter().all(|w| w.span() <= Duration::days(span_days)));
        }
    }

    #[test]
    fn test_calendar_month_clips_partial_months() {
        let start = day(2024, 1, 15);
        let end = day(2024, 3, 10);
        let windows = plan_windows(ChunkStrategy::CalendarMonth, start, end, 1).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].end(), day(2024, 2, 1));
        assert_eq!(windows[2].start(), day(2024, 3, 1));
        assert_covers(&windows, start, end);
    }

    #[test]
    fn test_calendar_day() {
        let start = day(2024, 1, 1) + Duration::hours(12);
        let end = day(2024, 1, 4);
        let windows = plan_windows(ChunkStrategy::CalendarDay, start, end, 1).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].span(), Duration::hours(12));
        assert_covers(&windows, start, end);
    }

    #[test]
    fn test_value_budget_span() {
        let budget = ValueBudget {
            max_values_per_call: 22_500,
            columns: 5,
            intervals_per_unit: 60,
            unit: Duration::hours(1),
        };
        // 22500 / (5 * 60) = 75 hours, one hour of slack
        assert_eq!(budget.units_per_call(1), 74);
        assert_eq!(budget.span(1), Duration::hours(74));
        // two entities halve the budget
        assert_eq!(budget.units_per_call(2), 36);

        let tiny = ValueBudget {
            max_values_per_call: 10,
            columns: 5,
            intervals_per_unit: 60,
            unit: Duration::hours(1),
        };
        assert_eq!(tiny.units_per_call(1), 1);
    }

    #[test]
    fn test_oversized_value_budget_saturates() {
        let huge = ValueBudget {
            max_values_per_call: u64::MAX,
            columns: 1,
            intervals_per_unit: 1,
            unit: Duration::days(1),
        };
        assert_eq!(huge.units_per_call(1), i64::MAX - 1);
        assert!(huge.span(1) > Duration::days(365 * 1000));

        let windows = plan_windows(
            ChunkStrategy::ValueBudget(huge),
            day(2020, 1, 1),
            day(2024, 1, 1),
            1,
        )
        .unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].span(), day(2024, 1, 1) - day(2020, 1, 1));
    }

    #[test]
    fn test_single_window() {
        let windows = plan_windows(ChunkStrategy::Single, day(2020, 1, 1), day(2024, 1, 1), 1).unwrap();
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn test_degenerate_inputs_yield_no_tasks() {
        let t = day(2024, 1, 1);
        let entities = vec![EntitySpec::new("bitcoin")];
        let tasks = plan_tasks(t, t, &entities, 1, |_| ChunkStrategy::Single).unwrap();
        assert!(tasks.is_empty());

        let tasks = plan_tasks(t, day(2024, 2, 1), &[], 1, |_| ChunkStrategy::Single).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_inverted_range_is_an_error() {
        let entities = vec![EntitySpec::new("bitcoin")];
        let err = plan_tasks(day(2024, 2, 1), day(2024, 1, 1), &entities, 1, |_| {
            ChunkStrategy::Single
        });
        assert!(matches!(err, Err(PlanError::InvertedRange { .. })));
    }

    #[test]
    fn test_zero_span_is_rejected() {
        let err = plan_windows(
            ChunkStrategy::Fixed(Duration::zero()),
            day(2024, 1, 1),
            day(2024, 2, 1),
            1,
        );
        assert!(matches!(err, Err(PlanError::InvalidStrategy(_))));
    }

    #[test]
    fn test_batching_composes_with_windows() {
        let entities: Vec<EntitySpec> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|id| EntitySpec::scoped(*id, "FEES"))
            .chain(std::iter::once(EntitySpec::scoped("a", "PRICE")))
            .collect();

        let tasks = plan_tasks(day(2024, 1, 1), day(2024, 3, 1), &entities, 2, |_| {
            ChunkStrategy::CalendarMonth
        })
        .unwrap();

        // FEES: 3 batches x 2 months, PRICE: 1 batch x 2 months
        assert_eq!(tasks.len(), 8);
        assert_eq!(tasks[0].entities, vec!["a", "b"]);
        assert_eq!(tasks[0].scope.as_deref(), Some("FEES"));
        assert_eq!(tasks[4].entities, vec!["e"]);
        assert_eq!(tasks[7].scope.as_deref(), Some("PRICE"));
        assert!(tasks.iter().enumerate().all(|(i, t)| t.id == i));
    }

    #[test]
    fn test_strategy_is_chosen_per_scope() {
        let entities = vec![
            EntitySpec::scoped("aave", "fees"),
            EntitySpec::scoped("ethereum", "inflows"),
        ];
        let tasks = plan_tasks(day(2024, 1, 1), day(2024, 1, 4), &entities, 1, |scope| {
            match scope {
                Some("inflows") => ChunkStrategy::CalendarDay,
                _ => ChunkStrategy::Single,
            }
        })
        .unwrap();
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0].window.span(), Duration::days(3));
        assert!(tasks[1..].iter().all(|t| t.window.span() == Duration::days(1)));
    }

    #[test]
    fn test_duplicate_entities_are_planned_once() {
        let entities = vec![EntitySpec::new("bitcoin"), EntitySpec::new("bitcoin")];
        let tasks = plan_tasks(day(2024, 1, 1), day(2024, 1, 2), &entities, 10, |_| {
            ChunkStrategy::Single
        })
        .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].entities, vec!["bitcoin"]);
    }
}
