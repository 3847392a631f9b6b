//! Reminder Scheduler
//!
//! A daily cycle that looks a fixed number of days ahead for license payments,
//! assessor recertifications and CPD shortfalls. Each (type, target,
//! threshold) is claimed in the reminder ledger before dispatch and marked
//! sent only after every recipient was resolved and notified. A claim whose
//! recipients cannot be resolved is released so a later run retries it, and a
//! claim abandoned mid-dispatch becomes reclaimable once its lease expires.
//!
//! Matching is on the exact target date. `ReminderLoop` remembers the last
//! day it processed and replays any days it missed, so a late or skipped tick
//! does not skip a threshold.

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::PortalResult;
use crate::models::*;
use crate::notify::{NotificationDispatcher, NotificationDraft};
use crate::store::PortalStore;

/// Days-before thresholds, largest first
pub const REMINDER_THRESHOLDS: [i32; 4] = [60, 30, 15, 5];

/// How long a claim blocks other runs before it is treated as abandoned
pub const CLAIM_LEASE: Duration = Duration::from_secs(15 * 60);

/// Outcome of one daily cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub date: Option<NaiveDate>,
    pub license_reminders: usize,
    pub recertification_reminders: usize,
    pub cpd_reminders: usize,
    /// Reminders found but already sent or held by another run
    pub already_sent: usize,
    /// Claims released because recipients could not be resolved
    pub failed: usize,
    pub notifications: usize,
    pub records_lapsed: usize,
}

impl CycleReport {
    pub fn reminders_sent(&self) -> usize {
        self.license_reminders + self.recertification_reminders + self.cpd_reminders
    }
}

/// Recipients and the message each group receives
type Deliveries = Vec<(Vec<User>, NotificationDraft)>;

pub struct ReminderScheduler {
    store: Arc<dyn PortalStore>,
    notifier: Arc<NotificationDispatcher>,
    claim_lease: Duration,
}

impl ReminderScheduler {
    pub fn new(store: Arc<dyn PortalStore>, notifier: Arc<NotificationDispatcher>) -> Self {
        Self {
            store,
            notifier,
            claim_lease: CLAIM_LEASE,
        }
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    /// Run every reminder category for `today`, then lapse expired cycles
    pub async fn run_daily_cycle(&self, today: NaiveDate) -> PortalResult<CycleReport> {
        let mut report = CycleReport {
            date: Some(today),
            ..CycleReport::default()
        };

        for days in REMINDER_THRESHOLDS {
            let Some(target) = today.checked_add_days(Days::new(days as u64)) else {
                continue;
            };
            self.license_reminders(target, days, &mut report).await?;
            self.recertification_reminders(target, days, &mut report)
                .await?;
            self.cpd_reminders(target, days, &mut report).await?;
        }

        report.records_lapsed = self.lapse_cycles(today).await?;

        info!(
            date = %today,
            sent = report.reminders_sent(),
            already_sent = report.already_sent,
            failed = report.failed,
            lapsed = report.records_lapsed,
            "Reminder cycle complete"
        );
        Ok(report)
    }

    async fn claim(
        &self,
        reminder_type: ReminderType,
        target_type: TargetType,
        target_id: uuid::Uuid,
        days: i32,
        due: NaiveDate,
        report: &mut CycleReport,
    ) -> PortalResult<Option<ReminderKey>> {
        let key = ReminderKey {
            reminder_type,
            target_type,
            target_id,
            days_before: days,
        };
        let now = Utc::now();
        let lease = chrono::Duration::from_std(self.claim_lease)
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
        let claimed = self
            .store
            .claim_reminder(&key, due, now, now - lease)
            .await?;
        if !claimed {
            debug!(reminder = %key, "Reminder already sent or in flight");
            report.already_sent += 1;
            return Ok(None);
        }
        Ok(Some(key))
    }

    /// Dispatch a claimed reminder and close it in the ledger, or release
    /// the claim when its recipients could not be resolved.
    async fn settle(
        &self,
        key: &ReminderKey,
        deliveries: PortalResult<Deliveries>,
        report: &mut CycleReport,
    ) -> PortalResult<bool> {
        let deliveries = match deliveries {
            Ok(deliveries) => deliveries,
            Err(e) => {
                warn!(reminder = %key, "Reminder recipients unavailable, releasing claim: {}", e);
                self.store.release_reminder(key).await?;
                report.failed += 1;
                return Ok(false);
            }
        };

        for (users, draft) in &deliveries {
            report.notifications += self.notifier.notify_many(users, draft).await;
        }
        self.store.mark_reminder_sent(key, Utc::now()).await?;
        Ok(true)
    }

    async fn license_reminders(
        &self,
        due: NaiveDate,
        days: i32,
        report: &mut CycleReport,
    ) -> PortalResult<()> {
        for glab in self.store.glabs_with_payment_due(due).await? {
            let Some(key) = self
                .claim(
                    ReminderType::LicensePayment,
                    TargetType::Glab,
                    glab.glab_id,
                    days,
                    due,
                    report,
                )
                .await?
            else {
                continue;
            };

            let due_text = due.format("%B %d, %Y");
            let admins = NotificationDraft::new(
                NotificationType::LicenseReminder,
                format!("License Payment Due in {} Days", days),
                format!(
                    "Your GLAB license payment is due on {}. Please ensure timely payment to maintain your license.",
                    due_text
                ),
            )
            .link(LinkType::Glab, glab.glab_id);
            let oversight = NotificationDraft::new(
                NotificationType::LicenseReminder,
                format!("GLAB License Payment Due: {}", glab.name),
                format!(
                    "{} license payment is due in {} days ({}).",
                    glab.name, days, due_text
                ),
            )
            .link(LinkType::Glab, glab.glab_id);

            let deliveries = match (
                self.notifier.glab_admins(glab.glab_id).await,
                self.notifier.gea_reviewers().await,
            ) {
                (Ok(lab), Ok(gea)) => Ok(vec![(lab, admins), (gea, oversight)]),
                (Err(e), _) | (_, Err(e)) => Err(e),
            };
            if self.settle(&key, deliveries, report).await? {
                report.license_reminders += 1;
            }
        }
        Ok(())
    }

    async fn recertification_reminders(
        &self,
        due: NaiveDate,
        days: i32,
        report: &mut CycleReport,
    ) -> PortalResult<()> {
        for assessor in self.store.assessors_with_recertification_due(due).await? {
            let Some(key) = self
                .claim(
                    ReminderType::Recertification,
                    TargetType::Assessor,
                    assessor.user_id,
                    days,
                    due,
                    report,
                )
                .await?
            else {
                continue;
            };

            let draft = NotificationDraft::new(
                NotificationType::RecertificationReminder,
                format!("Recertification Due in {} Days", days),
                format!(
                    "Your assessor certification expires on {}. Please ensure you have completed the required CPD hours and apply for recertification.",
                    due.format("%B %d, %Y")
                ),
            );
            let deliveries = self
                .store
                .active_recertification(assessor.user_id)
                .await
                .map(|record| {
                    let draft = match record {
                        Some(record) => {
                            draft.link(LinkType::RecertificationRecord, record.record_id)
                        }
                        None => draft,
                    };
                    vec![(vec![assessor.clone()], draft)]
                });
            if self.settle(&key, deliveries, report).await? {
                report.recertification_reminders += 1;
            }
        }
        Ok(())
    }

    async fn cpd_reminders(
        &self,
        due: NaiveDate,
        days: i32,
        report: &mut CycleReport,
    ) -> PortalResult<()> {
        for record in self.store.records_short_of_hours_ending(due).await? {
            let Some(key) = self
                .claim(
                    ReminderType::CpdCompliance,
                    TargetType::RecertificationRecord,
                    record.record_id,
                    days,
                    due,
                    report,
                )
                .await?
            else {
                continue;
            };

            let draft = NotificationDraft::new(
                NotificationType::CpdReminder,
                format!("CPD Hours Due in {} Days", days),
                format!(
                    "Your recertification cycle ends on {}. You still need {} approved CPD hours ({} of {} logged).",
                    due.format("%B %d, %Y"),
                    record.remaining_hours(),
                    record.accumulated_hours,
                    record.required_hours
                ),
            )
            .link(LinkType::RecertificationRecord, record.record_id);
            let deliveries = self
                .store
                .get_user(record.assessor_id)
                .await
                .map(|assessor| match assessor {
                    Some(assessor) if assessor.is_active => vec![(vec![assessor], draft)],
                    _ => {
                        debug!(record = %record.record_id, "CPD reminder target inactive or missing");
                        Vec::new()
                    }
                });
            if self.settle(&key, deliveries, report).await? {
                report.cpd_reminders += 1;
            }
        }
        Ok(())
    }

    async fn lapse_cycles(&self, today: NaiveDate) -> PortalResult<usize> {
        let mut lapsed = 0;
        for record in self.store.records_to_lapse(today).await? {
            if self
                .store
                .close_recertification(record.record_id, CycleStatus::Lapsed, Utc::now())
                .await?
                .is_some()
            {
                warn!(
                    assessor = %record.assessor_id,
                    cycle_end = %record.cycle_end,
                    shortfall = %record.remaining_hours(),
                    "Recertification cycle lapsed"
                );
                lapsed += 1;
            }
        }
        Ok(lapsed)
    }
}

/// Oldest missed day the loop replays; earlier days have no threshold left
const MAX_CATCH_UP_DAYS: u64 = REMINDER_THRESHOLDS[0] as u64;

/// Days after `last` up to and including `today`. A loop with no history
/// processes `today` alone.
pub fn pending_days(last: Option<NaiveDate>, today: NaiveDate) -> Vec<NaiveDate> {
    let Some(last) = last else {
        return vec![today];
    };
    let floor = today
        .checked_sub_days(Days::new(MAX_CATCH_UP_DAYS))
        .unwrap_or(today);
    let mut day = last.succ_opt().unwrap_or(today).max(floor);
    let mut days = Vec::new();
    while day <= today {
        days.push(day);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    days
}

/// Runs the daily cycle on a fixed interval until shutdown
pub struct ReminderLoop {
    scheduler: Arc<ReminderScheduler>,
    interval: Duration,
}

impl ReminderLoop {
    pub fn new(scheduler: Arc<ReminderScheduler>, interval: Duration) -> Self {
        Self {
            scheduler,
            interval,
        }
    }

    /// Run every day after `last` through `today`. Returns the last day that
    /// completed; a failed day stops the replay so the next tick retries it.
    pub async fn catch_up(&self, last: Option<NaiveDate>, today: NaiveDate) -> Option<NaiveDate> {
        let mut processed = last;
        for day in pending_days(last, today) {
            match self.scheduler.run_daily_cycle(day).await {
                Ok(_) => processed = Some(day),
                Err(e) => {
                    error!(?e, date = %day, "Reminder cycle failed; retrying next tick");
                    break;
                }
            }
        }
        processed
    }

    /// Run once immediately, then every interval. Returns on shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Reminder loop started");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_processed = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let today = Utc::now().date_naive();
                    last_processed = self.catch_up(last_processed, today).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reminder loop shutting down");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
