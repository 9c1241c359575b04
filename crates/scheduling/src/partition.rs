//! Per-minute shard assignment: which of the eligible rules this node owns.

use tracing::{debug, info};

use takt_core::model::truncate_to_minute;
use takt_core::{AlertRule, EvalJob};

use crate::ScheduleError;

/// Select the jobs one partition owns for the minute interval starting at
/// `interval` (unix seconds, minute-truncated).
///
/// A rule is *eligible* when its next evaluation (`last_eval` truncated to the
/// minute, plus its frequency) falls inside the interval. Eligible rules are
/// owned by exactly one partition, chosen as `rule.id % node_count`. Run
/// independently on every partition over the same rule slice, the outputs
/// partition the eligible set: no overlap, no omission.
///
/// Sub-minute frequencies stay eligible; they collapse to at most one
/// evaluation per minute tick, a known granularity limit of the minute-based
/// interval.
pub fn partition_rules(
    rules: &[AlertRule],
    part_id: i32,
    node_count: usize,
    interval: i64,
) -> Result<Vec<EvalJob>, ScheduleError> {
    if node_count == 0 {
        return Err(ScheduleError::NodeCountZero);
    }
    if part_id < 0 || part_id as usize >= node_count {
        return Err(ScheduleError::InvalidPartition {
            part_id,
            node_count,
        });
    }

    let interval_end = interval + 60;
    let mut jobs = Vec::new();
    for rule in rules {
        let next_eval = truncate_to_minute(rule.last_eval.timestamp()) + rule.frequency_secs;
        if next_eval > interval_end {
            debug!(
                rule_id = rule.id,
                next_eval, interval_end, "skipped rule: not yet due"
            );
            continue;
        }
        if rule.id.rem_euclid(node_count as i64) == part_id as i64 {
            jobs.push(EvalJob::regular(rule.clone()));
        } else {
            debug!(
                rule_id = rule.id,
                part_id, node_count, "skipped rule: owned by another partition"
            );
        }
    }

    info!(
        scheduled = jobs.len(),
        total = rules.len(),
        part_id,
        node_count,
        interval,
        "rules scheduled for partition"
    );
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const INTERVAL: i64 = 1_493_233_440;

    fn due_rule(id: i64) -> AlertRule {
        AlertRule {
            id,
            name: format!("rule-{id}"),
            frequency_secs: 60,
            last_eval: Utc.timestamp_opt(INTERVAL - 60, 0).unwrap(),
        }
    }

    #[test]
    fn node_count_zero_is_an_error() {
        assert_eq!(
            partition_rules(&[], 0, 0, INTERVAL),
            Err(ScheduleError::NodeCountZero)
        );
    }

    #[test]
    fn part_id_must_be_below_node_count() {
        assert_eq!(
            partition_rules(&[], 2, 2, INTERVAL),
            Err(ScheduleError::InvalidPartition {
                part_id: 2,
                node_count: 2
            })
        );
    }

    #[test]
    fn two_partitions_split_rules_by_id_parity() {
        let rules: Vec<AlertRule> = (0..10).map(due_rule).collect();

        let p0 = partition_rules(&rules, 0, 2, INTERVAL).unwrap();
        let p1 = partition_rules(&rules, 1, 2, INTERVAL).unwrap();

        let ids0: Vec<i64> = p0.iter().map(|j| j.rule.id).collect();
        let ids1: Vec<i64> = p1.iter().map(|j| j.rule.id).collect();
        assert_eq!(ids0, vec![0, 2, 4, 6, 8]);
        assert_eq!(ids1, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn partitions_cover_eligible_set_without_overlap() {
        let rules: Vec<AlertRule> = (0..37).map(due_rule).collect();
        let node_count = 5;

        let mut seen = std::collections::BTreeSet::new();
        for part_id in 0..node_count {
            for job in partition_rules(&rules, part_id as i32, node_count, INTERVAL).unwrap() {
                assert!(seen.insert(job.rule.id), "rule {} scheduled twice", job.rule.id);
            }
        }
        assert_eq!(seen.len(), rules.len());
    }

    #[test]
    fn rules_not_yet_due_are_excluded() {
        let mut rule = due_rule(0);
        rule.frequency_secs = 300; // next eval 4 minutes out
        let jobs = partition_rules(&[rule], 0, 1, INTERVAL).unwrap();
        assert!(jobs.is_empty());
    }

    #[test]
    fn next_eval_exactly_at_interval_end_is_eligible() {
        let mut rule = due_rule(0);
        rule.frequency_secs = 120; // next eval == interval_end
        let jobs = partition_rules(&[rule], 0, 1, INTERVAL).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].offset_factor, 0);
    }

    #[test]
    fn sub_minute_frequency_stays_eligible() {
        let mut rule = due_rule(0);
        rule.frequency_secs = 10;
        let jobs = partition_rules(&[rule], 0, 1, INTERVAL).unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn single_node_owns_everything() {
        let rules: Vec<AlertRule> = (0..7).map(due_rule).collect();
        let jobs = partition_rules(&rules, 0, 1, INTERVAL).unwrap();
        assert_eq!(jobs.len(), 7);
    }
}
