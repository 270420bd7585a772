//! Static message pools
//!
//! Rotation templates, asides, praise, motivation and hints used when talking
//! to the user. Templates use `{task}` as the placeholder for the task text.

use lazy_static::lazy_static;
use rand::seq::SliceRandom;
use rand::Rng;

/// Regular reminder templates, rotated by calendar day
pub const REMINDER_TEMPLATES: &[&str] = &[
    "Still on the list: {task}. Five minutes now beats an hour of guilt later.",
    "Knock knock. It's {task}. It has not done itself yet.",
    "Friendly nudge about {task}. Start with the smallest piece.",
    "{task} is waiting patiently. Patience is not infinite.",
    "Remember {task}? It remembers you.",
    "Quick check-in on {task}. Could today be the day?",
    "A tiny step on {task} counts. Go take it.",
];

/// Light remarks occasionally appended to a regular reminder
pub const ASIDES: &[&str] = &[
    "Procrastination is just enthusiasm that hasn't found its shoes yet.",
    "Coffee first, then the task. That's the deal, right?",
    "Future you already sent a thank-you note.",
    "The task can't see you scrolling. I can.",
    "Tiny steps still leave footprints.",
    "Even the couch thinks you should get up.",
];

/// Shown when a task is marked complete
pub const PRAISES: &[&str] = &[
    "Done and dusted. Nicely handled!",
    "That's how it's done. One less thing on your mind.",
    "Great work! Treat yourself to something small.",
    "Another one off the list. You're on a roll.",
];

/// Quotes for the motivation-of-the-day request
pub const MOTIVATION_QUOTES: &[&str] = &[
    "Today is a fine day to get at least something done.",
    "Don't give up, the finish line is closer than it looks.",
    "Every finished task is a finished task.",
    "Starting is the hard part; finishing is the fun part.",
    "You can do more than you think you can.",
];

/// Fallback hints when no keyword matches
pub const GENERIC_HINTS: &[&str] = &[
    "Break the task into three small steps and do the first one now.",
    "Block twenty minutes on your calendar for it.",
    "Tell someone you're doing it; it's harder to skip then.",
    "Remove one distraction before you start.",
];

/// Weekend-mode replies
pub const WEEKEND_MESSAGE: &str =
    "It's the weekend! Fewer nudges today. Get some rest, but keep your tasks in mind.";
pub const WORKDAY_MESSAGE: &str = "It's a workday. Reminders follow the usual schedule.";

/// Prompt offered right after completion
pub const REPORT_PROMPT: &str =
    "Want to leave a short report on how it went? Send it now, or skip it.";

/// Hint keyed by substrings of the task text
struct HintRule {
    keywords: &'static [&'static str],
    hint: &'static str,
}

lazy_static! {
    static ref HINT_RULES: Vec<HintRule> = vec![
        HintRule {
            keywords: &["report", "document"],
            hint: "Gather all the data up front so the report is complete.",
        },
        HintRule {
            keywords: &["call", "meeting"],
            hint: "Prepare a list of questions before the call.",
        },
        HintRule {
            keywords: &["presentation", "slides"],
            hint: "Keep the slides short with one clear point each.",
        },
        HintRule {
            keywords: &["email", "letter"],
            hint: "Re-read the message for mistakes before sending.",
        },
        HintRule {
            keywords: &["code", "script", "program"],
            hint: "Write the code in small pieces and test each one right away.",
        },
    ];
}

fn pick<'a, R: Rng + ?Sized>(pool: &'a [&'static str], rng: &mut R) -> &'a str {
    pool.choose(rng).copied().unwrap_or_default()
}

/// Formats a template with the task text
pub fn render(template: &str, task: &str) -> String {
    template.replace("{task}", task)
}

pub fn aside<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    pick(ASIDES, rng)
}

pub fn praise<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    pick(PRAISES, rng)
}

pub fn motivation<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    pick(MOTIVATION_QUOTES, rng)
}

/// Keyword-matched hint for a task, or a random generic one
pub fn hint_for<R: Rng + ?Sized>(task: &str, rng: &mut R) -> &'static str {
    let text = task.to_lowercase();
    HINT_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| text.contains(k)))
        .map(|rule| rule.hint)
        .unwrap_or_else(|| pick(GENERIC_HINTS, rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_hint_matches_keywords() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            hint_for("Finish the quarterly REPORT", &mut rng),
            "Gather all the data up front so the report is complete."
        );
        assert_eq!(
            hint_for("fix the deploy script", &mut rng),
            "Write the code in small pieces and test each one right away."
        );
        assert!(GENERIC_HINTS.contains(&hint_for("water the plants", &mut rng)));
    }

    #[test]
    fn test_templates_carry_placeholder() {
        for template in REMINDER_TEMPLATES {
            assert!(template.contains("{task}"), "{}", template);
            assert!(render(template, "laundry").contains("laundry"));
        }
    }
}
