use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tokio::time::Instant;

use crate::target::{TargetOffset, TargetSet};

/// Live state of the host's adjustable timer, overwritten wholesale on every
/// timer update message.
#[derive(Debug, Clone, Default)]
pub struct TimerState {
    /// Whether the timer is actively counting.
    pub running: bool,
    /// Wall-clock instant corresponding to elapsed = 0 of the current run
    /// segment. Set if and only if `running` is true.
    pub started_at: Option<Instant>,
    /// The timer's configured total duration in milliseconds.
    pub duration_millis: u64,
}

impl TimerState {
    /// Apply a timer update from the host.
    ///
    /// A fresh update while already running still resets `started_at`: the
    /// duration change itself redefines the run segment's origin.
    pub fn update(&mut self, ticking: bool, duration_millis: u64, now: Instant) {
        self.running = ticking;
        self.started_at = ticking.then_some(now);
        self.duration_millis = duration_millis;
    }
}

/// Schedules one-shot alerts against the live timer.
///
/// All mutable state lives here and is touched only from the single
/// event-processing task that owns the scheduler. Pending alerts are rebuilt
/// from scratch on every [`recompute`](Self::recompute); there is no
/// incremental patching, which eliminates stale-timer races at the cost of a
/// little redundant work.
#[derive(Debug, Default)]
pub struct AlertScheduler {
    timer: TimerState,
    targets: TargetSet,
    /// Armed alerts: offset -> absolute fire instant. Cleared and rebuilt by
    /// every `recompute`.
    pending: BTreeMap<TargetOffset, Instant>,
    /// Offsets already reported during the current show. Wiped only by
    /// [`show_reset`](Self::show_reset).
    fired_this_show: BTreeSet<TargetOffset>,
    /// Report offsets the timer was manually adjusted past while ticking.
    pub report_if_skipped_past: bool,
    /// Allow the same offset to be reported more than once per show.
    pub allow_multiple_reports_per_show: bool,
}

impl AlertScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timer(&self) -> &TimerState {
        &self.timer
    }

    /// Replace the target set wholesale. The caller must follow up with
    /// [`recompute`](Self::recompute).
    pub fn set_targets(&mut self, targets: TargetSet) {
        self.targets = targets;
    }

    /// Apply a timer update. The caller must follow up with
    /// [`recompute`](Self::recompute).
    pub fn update_timer(&mut self, ticking: bool, duration_millis: u64, now: Instant) {
        self.timer.update(ticking, duration_millis, now);
    }

    /// Clear the per-show dedup set. Timer state, targets and pending alerts
    /// are untouched.
    pub fn show_reset(&mut self) {
        self.fired_this_show.clear();
    }

    /// Reconcile pending alerts against the latest timer state and target
    /// set, returning the offsets that fired immediately and passed the
    /// dedup policy.
    ///
    /// Runs in three steps: fire previously pending offsets that are already
    /// reached (skipped past while ticking, or landed on when the timer
    /// stopped), clear the whole arm set, then re-arm every target offset
    /// still in the future of the current run segment.
    pub fn recompute(&mut self, now: Instant) -> Vec<TargetOffset> {
        let mut fired = Vec::new();

        if !self.pending.is_empty() {
            // An offset the timer was adjusted past never gets to fire
            // naturally, and an offset the timer stopped exactly on races
            // against its own fire instant. Both reduce to the same check on
            // the just-updated duration.
            if (self.timer.running && self.report_if_skipped_past) || !self.timer.running {
                let reached: Vec<TargetOffset> = self
                    .pending
                    .keys()
                    .copied()
                    .filter(|offset| self.timer.duration_millis <= offset.as_millis())
                    .collect();
                for offset in reached {
                    self.fire(offset, &mut fired);
                }
            }

            log::debug!("clearing {} pending alert(s)", self.pending.len());
            self.pending.clear();
        }

        if self.timer.running && !self.targets.is_empty() {
            if let Some(started_at) = self.timer.started_at {
                let elapsed = now.saturating_duration_since(started_at).as_millis() as i64;
                for offset in self.targets.iter() {
                    let time_to_alert =
                        self.timer.duration_millis as i64 - offset.as_millis() as i64 - elapsed;
                    if time_to_alert > 0 {
                        log::debug!("arming alert for {offset} in {time_to_alert}ms");
                        self.pending
                            .insert(offset, now + Duration::from_millis(time_to_alert as u64));
                    }
                }
            }
        }

        fired
    }

    /// Fire every pending alert whose instant has been reached, removing it
    /// from the arm set. Called from the owning task's heartbeat tick.
    pub fn collect_due(&mut self, now: Instant) -> Vec<TargetOffset> {
        let due: Vec<TargetOffset> = self
            .pending
            .iter()
            .filter(|(_, fire_at)| **fire_at <= now)
            .map(|(offset, _)| *offset)
            .collect();

        let mut fired = Vec::new();
        for offset in due {
            self.pending.remove(&offset);
            self.fire(offset, &mut fired);
        }
        fired
    }

    /// Shared alert-send step: report the offset unless it has already been
    /// reported this show and multiple reports are disallowed.
    fn fire(&mut self, offset: TargetOffset, fired: &mut Vec<TargetOffset>) {
        if self.allow_multiple_reports_per_show || !self.fired_this_show.contains(&offset) {
            log::debug!("alerting for {offset}");
            self.fired_this_show.insert(offset);
            fired.push(offset);
        } else {
            log::debug!("suppressing repeat alert for {offset}");
        }
    }

    #[cfg(test)]
    fn pending_fire_at(&self, offset: TargetOffset) -> Option<Instant> {
        self.pending.get(&offset).copied()
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetFormat;

    // All tests use start_paused so Instant::now() is deterministic and
    // time::advance() controls the clock.

    fn targets(text: &str) -> TargetSet {
        TargetSet::parse(text, TargetFormat::MinutesSeconds)
    }

    #[tokio::test(start_paused = true)]
    async fn arms_future_offsets_only() {
        let mut scheduler = AlertScheduler::new();
        scheduler.set_targets(targets("01:30,00:00"));
        let now = Instant::now();
        scheduler.update_timer(true, 120_000, now);

        let fired = scheduler.recompute(now);
        assert!(fired.is_empty());
        // 120000 - 90000 = 30s out; offset 0 fires when the whole duration
        // elapses, 120s out.
        assert_eq!(
            scheduler.pending_fire_at(TargetOffset::from_millis(90_000)),
            Some(now + Duration::from_secs(30))
        );
        assert_eq!(
            scheduler.pending_fire_at(TargetOffset::from_millis(0)),
            Some(now + Duration::from_secs(120))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recompute_is_idempotent_under_unchanged_state() {
        let mut scheduler = AlertScheduler::new();
        scheduler.set_targets(targets("01:30"));
        let start = Instant::now();
        scheduler.update_timer(true, 120_000, start);
        scheduler.recompute(start);

        let expected = start + Duration::from_secs(30);
        assert_eq!(
            scheduler.pending_fire_at(TargetOffset::from_millis(90_000)),
            Some(expected)
        );

        // Rebuilding 10s later with unchanged state re-arms at the same
        // absolute instant.
        tokio::time::advance(Duration::from_secs(10)).await;
        let fired = scheduler.recompute(Instant::now());
        assert!(fired.is_empty());
        assert_eq!(
            scheduler.pending_fire_at(TargetOffset::from_millis(90_000)),
            Some(expected)
        );
        assert_eq!(scheduler.pending_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn collect_due_fires_once_reached() {
        let mut scheduler = AlertScheduler::new();
        scheduler.set_targets(targets("01:30"));
        let now = Instant::now();
        scheduler.update_timer(true, 120_000, now);
        scheduler.recompute(now);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(scheduler.collect_due(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(
            scheduler.collect_due(Instant::now()),
            vec![TargetOffset::from_millis(90_000)]
        );
        assert_eq!(scheduler.pending_len(), 0);

        // Already removed from the arm set; nothing further to fire.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(scheduler.collect_due(Instant::now()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_past_offset_fires_immediately_when_enabled() {
        let mut scheduler = AlertScheduler::new();
        scheduler.report_if_skipped_past = true;
        scheduler.set_targets(targets("01:30"));
        let now = Instant::now();
        scheduler.update_timer(true, 100_000, now);
        scheduler.recompute(now);

        // Timer manually adjusted from 100s down to 80s while ticking:
        // remaining time for the 90s offset is now negative.
        scheduler.update_timer(true, 80_000, now);
        let fired = scheduler.recompute(now);
        assert_eq!(fired, vec![TargetOffset::from_millis(90_000)]);
        // Not re-armed: it is in the past of the new run segment.
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_past_offset_silent_when_disabled() {
        let mut scheduler = AlertScheduler::new();
        scheduler.set_targets(targets("01:30"));
        let now = Instant::now();
        scheduler.update_timer(true, 100_000, now);
        scheduler.recompute(now);

        scheduler.update_timer(true, 80_000, now);
        assert!(scheduler.recompute(now).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_on_offset_fires_exactly_once() {
        let mut scheduler = AlertScheduler::new();
        scheduler.set_targets(targets("00:00"));
        let start = Instant::now();
        scheduler.update_timer(true, 120_000, start);
        scheduler.recompute(start);

        // Host stops the timer exactly at zero, racing the deferred fire.
        tokio::time::advance(Duration::from_secs(120)).await;
        scheduler.update_timer(false, 0, Instant::now());
        let fired = scheduler.recompute(Instant::now());
        assert_eq!(fired, vec![TargetOffset::from_millis(0)]);

        // The heartbeat afterwards finds nothing armed and the dedup set
        // blocks a repeat.
        assert!(scheduler.collect_due(Instant::now()).is_empty());
        scheduler.update_timer(false, 0, Instant::now());
        assert!(scheduler.recompute(Instant::now()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_updates_redefine_run_segment_origin() {
        let mut scheduler = AlertScheduler::new();
        let first_start = Instant::now();
        scheduler.update_timer(true, 60_000, first_start);
        assert!(scheduler.timer().running);
        assert_eq!(scheduler.timer().started_at, Some(first_start));
        assert_eq!(scheduler.timer().duration_millis, 60_000);

        // A fresh update while already running moves the segment origin.
        tokio::time::advance(Duration::from_secs(5)).await;
        let second_start = Instant::now();
        scheduler.update_timer(true, 45_000, second_start);
        assert_eq!(scheduler.timer().started_at, Some(second_start));
        assert_eq!(scheduler.timer().duration_millis, 45_000);

        // started_at is set if and only if the timer is running.
        scheduler.update_timer(false, 45_000, Instant::now());
        assert!(!scheduler.timer().running);
        assert_eq!(scheduler.timer().started_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_timer_arms_nothing() {
        let mut scheduler = AlertScheduler::new();
        scheduler.set_targets(targets("01:30"));
        scheduler.update_timer(false, 120_000, Instant::now());
        assert!(scheduler.recompute(Instant::now()).is_empty());
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dedup_suppresses_repeats_until_show_reset() {
        let mut scheduler = AlertScheduler::new();
        scheduler.report_if_skipped_past = true;
        scheduler.set_targets(targets("01:30"));

        let fire = |scheduler: &mut AlertScheduler| {
            let now = Instant::now();
            scheduler.update_timer(true, 100_000, now);
            scheduler.recompute(now);
            scheduler.update_timer(true, 80_000, now);
            scheduler.recompute(now)
        };

        assert_eq!(fire(&mut scheduler), vec![TargetOffset::from_millis(90_000)]);
        // Same skip-past again in the same show: suppressed.
        assert!(fire(&mut scheduler).is_empty());

        scheduler.show_reset();
        assert_eq!(fire(&mut scheduler), vec![TargetOffset::from_millis(90_000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn multiple_reports_policy_bypasses_dedup() {
        let mut scheduler = AlertScheduler::new();
        scheduler.report_if_skipped_past = true;
        scheduler.allow_multiple_reports_per_show = true;
        scheduler.set_targets(targets("01:30"));

        for _ in 0..2 {
            let now = Instant::now();
            scheduler.update_timer(true, 100_000, now);
            scheduler.recompute(now);
            scheduler.update_timer(true, 80_000, now);
            assert_eq!(
                scheduler.recompute(now),
                vec![TargetOffset::from_millis(90_000)]
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_targets_rebuilds_arm_set() {
        let mut scheduler = AlertScheduler::new();
        scheduler.set_targets(targets("01:30"));
        let now = Instant::now();
        scheduler.update_timer(true, 120_000, now);
        scheduler.recompute(now);
        assert_eq!(scheduler.pending_len(), 1);

        scheduler.set_targets(targets("00:10,00:20"));
        scheduler.recompute(now);
        assert_eq!(scheduler.pending_len(), 2);
        assert_eq!(
            scheduler.pending_fire_at(TargetOffset::from_millis(90_000)),
            None
        );
    }
}
