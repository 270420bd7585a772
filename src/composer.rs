//! Reminder composition
//!
//! Picks what a reminder says at delivery time. A single decision table covers
//! escalation for stale tasks and the regular day-based rotation.

use chrono::{Datelike, NaiveDateTime};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::{Task, TaskId, UserId};
use crate::phrases;
use crate::schedule::ReminderSettings;

/// Which message variant was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReminderVariant {
    Rotation,
    RotationWithAside,
    Escalation { days: i64 },
}

/// Action attached to every reminder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReminderAction {
    Complete { task: TaskId },
}

impl ReminderAction {
    pub fn label(&self) -> &'static str {
        match self {
            ReminderAction::Complete { .. } => "Mark done",
        }
    }
}

/// A message ready to hand to a notifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderMessage {
    pub user: UserId,
    pub task: TaskId,
    pub text: String,
    pub variant: ReminderVariant,
    pub action: ReminderAction,
}

/// Composes the reminder for an active task at local time `now`.
///
/// Callers must not compose for completed tasks; the scheduler drops those
/// before getting here.
pub fn compose<R: Rng + ?Sized>(
    task: &Task,
    now: NaiveDateTime,
    settings: &ReminderSettings,
    rng: &mut R,
) -> ReminderMessage {
    let elapsed = task.elapsed_days(now);

    let (text, variant) = if elapsed >= settings.escalation_days {
        (
            format!(
                "You've been ignoring this for {} days: {}\nEnough waiting. Do it today.",
                elapsed, task.text
            ),
            ReminderVariant::Escalation { days: elapsed },
        )
    } else {
        let index = now.day() as usize % phrases::REMINDER_TEMPLATES.len();
        let mut text = phrases::render(phrases::REMINDER_TEMPLATES[index], &task.text);

        if rng.gen_bool(settings.aside_probability.clamp(0.0, 1.0)) {
            text.push_str("\n\n");
            text.push_str(phrases::aside(rng));
            (text, ReminderVariant::RotationWithAside)
        } else {
            (text, ReminderVariant::Rotation)
        }
    };

    ReminderMessage {
        user: task.owner,
        task: task.id,
        text,
        variant,
        action: ReminderAction::Complete { task: task.id },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, TaskStatus};
    use chrono::{Duration, NaiveDate};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn created() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn task() -> Task {
        Task {
            id: TaskId::new(3),
            owner: UserId::new(9),
            text: "renew passport".to_string(),
            days: 7,
            created_at: created(),
            status: TaskStatus::Active,
            report: None,
            priority: Priority::Normal,
            deadline: None,
            checklist: None,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_escalation_threshold() {
        let settings = ReminderSettings::default();
        let task = task();
        let mut rng = StdRng::seed_from_u64(1);

        for minutes in [0, 60, 24 * 60, 3 * 24 * 60 - 1] {
            let now = created() + Duration::minutes(minutes);
            let message = compose(&task, now, &settings, &mut rng);
            assert!(!matches!(message.variant, ReminderVariant::Escalation { .. }));
        }

        for days in [3, 4, 10] {
            let now = created() + Duration::days(days) + Duration::minutes(5);
            let message = compose(&task, now, &settings, &mut rng);
            assert_eq!(message.variant, ReminderVariant::Escalation { days });
            assert!(message.text.contains(&days.to_string()));
            assert!(message.text.contains("renew passport"));
        }
    }

    #[test]
    fn test_rotation_follows_calendar_day() {
        let settings = ReminderSettings {
            aside_probability: 0.0,
            ..ReminderSettings::default()
        };
        let task = task();
        let mut rng = StdRng::seed_from_u64(2);

        let morning = created() + Duration::hours(1);
        let evening = created() + Duration::hours(9);
        let a = compose(&task, morning, &settings, &mut rng);
        let b = compose(&task, evening, &settings, &mut rng);
        assert_eq!(a.text, b.text);
        assert_eq!(a.variant, ReminderVariant::Rotation);

        let tomorrow = compose(&task, morning + Duration::days(1), &settings, &mut rng);
        assert_ne!(a.text, tomorrow.text);
        assert!(tomorrow.text.contains("renew passport"));
    }

    #[test]
    fn test_aside_probability_bounds() {
        let task = task();
        let now = created() + Duration::hours(2);
        let mut rng = StdRng::seed_from_u64(3);

        let always = ReminderSettings {
            aside_probability: 1.0,
            ..ReminderSettings::default()
        };
        let message = compose(&task, now, &always, &mut rng);
        assert_eq!(message.variant, ReminderVariant::RotationWithAside);
        assert!(phrases::ASIDES.iter().any(|a| message.text.ends_with(a)));

        let mut with_aside = 0;
        for _ in 0..1000 {
            let message = compose(&task, now, &ReminderSettings::default(), &mut rng);
            if message.variant == ReminderVariant::RotationWithAside {
                with_aside += 1;
            }
        }
        assert!((300..500).contains(&with_aside), "{}", with_aside);
    }

    #[test]
    fn test_message_carries_complete_action() {
        let task = task();
        let message = compose(
            &task,
            created(),
            &ReminderSettings::default(),
            &mut StdRng::seed_from_u64(4),
        );
        assert_eq!(message.user, UserId::new(9));
        assert_eq!(message.action, ReminderAction::Complete { task: task.id });
        assert_eq!(message.action.label(), "Mark done");
    }
}
