//! Catch-up scheduling for rules whose evaluations were missed.

use tracing::{debug, info, warn};

use takt_core::{AlertRule, EvalJob};

/// Build catch-up jobs for a batch of missed rules.
///
/// For a rule whose frequency fits inside the delay window (`60 <= frequency
/// <= delay_window_secs`), one job is emitted per doubling step `factor = 1,
/// 2, 4, 8, …` while `factor <= delay_window_secs / 60`, each standing for a
/// synthetic re-evaluation at `now - factor * frequency`. The geometric
/// progression samples older misses more sparsely instead of replaying every
/// missed minute.
///
/// A frequency above the delay window gets exactly one job, `1 + frequency/60`
/// cycles back: catch up the one missed cycle and rejoin the normal cadence.
/// Sub-minute frequencies are skipped entirely; they are too granular to
/// reconstruct meaningfully.
///
/// A rule that cannot be turned into a job is logged and skipped; it never
/// aborts the rest of the batch.
pub fn schedule_missed_rules(missed: &[AlertRule], delay_window_secs: i64) -> Vec<EvalJob> {
    let steps = delay_window_secs / 60;
    let mut jobs = Vec::new();

    for rule in missed {
        let frequency = rule.frequency_secs;
        if frequency < 60 {
            debug!(rule_id = rule.id, frequency, "skipped missed rule: sub-minute frequency");
            continue;
        }
        if frequency <= delay_window_secs {
            let mut factor = 1;
            while factor <= steps {
                push_catch_up(&mut jobs, rule, factor);
                factor += factor;
            }
        } else {
            push_catch_up(&mut jobs, rule, 1 + frequency / 60);
        }
    }

    info!(
        rules = missed.len(),
        jobs = jobs.len(),
        "missed rules scheduled for catch-up"
    );
    jobs
}

fn push_catch_up(jobs: &mut Vec<EvalJob>, rule: &AlertRule, factor: i64) {
    // A catch-up job re-evaluates at `now - factor * frequency`; an offset
    // that cannot be represented means the rule record is corrupt.
    match factor.checked_mul(rule.frequency_secs) {
        Some(_) => jobs.push(EvalJob::catch_up(rule.clone(), factor)),
        None => warn!(
            rule_id = rule.id,
            factor,
            frequency = rule.frequency_secs,
            "could not build catch-up job for rule, skipping"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const DELAY_WINDOW: i64 = 600;

    fn rule(id: i64, frequency_secs: i64) -> AlertRule {
        AlertRule {
            id,
            name: format!("rule-{id}"),
            frequency_secs,
            last_eval: Utc::now(),
        }
    }

    fn factors(jobs: &[EvalJob]) -> Vec<i64> {
        jobs.iter().map(|j| j.offset_factor).collect()
    }

    #[test]
    fn one_minute_frequency_gets_doubling_steps() {
        let jobs = schedule_missed_rules(&[rule(1, 60)], DELAY_WINDOW);
        assert_eq!(factors(&jobs), vec![1, 2, 4, 8]);
    }

    #[test]
    fn frequency_at_window_edge_gets_doubling_steps() {
        let jobs = schedule_missed_rules(&[rule(1, 600)], DELAY_WINDOW);
        assert_eq!(factors(&jobs), vec![1, 2, 4, 8]);
    }

    #[test]
    fn frequency_above_window_gets_one_cycle_back() {
        // 840s = 14 min: one catch-up job, 1 + 840/60 = 15 cycles back.
        let jobs = schedule_missed_rules(&[rule(1, 840)], DELAY_WINDOW);
        assert_eq!(factors(&jobs), vec![15]);
    }

    #[test]
    fn sub_minute_frequency_is_skipped() {
        assert!(schedule_missed_rules(&[rule(1, 30)], DELAY_WINDOW).is_empty());
    }

    #[test]
    fn mixed_batch_schedules_each_rule_independently() {
        let jobs = schedule_missed_rules(&[rule(1, 30), rule(2, 120), rule(3, 840)], DELAY_WINDOW);
        let per_rule: Vec<(i64, i64)> = jobs.iter().map(|j| (j.rule.id, j.offset_factor)).collect();
        assert_eq!(per_rule, vec![(2, 1), (2, 2), (2, 4), (2, 8), (3, 15)]);
    }

    #[test]
    fn empty_batch_yields_no_jobs() {
        assert!(schedule_missed_rules(&[], DELAY_WINDOW).is_empty());
    }
}
