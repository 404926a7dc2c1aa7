//! Built-in practice sequences.

use serde::{Deserialize, Serialize};

use crate::types::TimerStep;

/// A named, reusable sequence of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<TimerStep>,
}

impl Preset {
    /// Sum of all step durations in seconds.
    pub fn total_duration(&self) -> u64 {
        self.steps.iter().map(|s| u64::from(s.duration)).sum()
    }
}

fn preset(id: &str, name: &str, steps: &[(&str, &str, u32)]) -> Preset {
    Preset {
        id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
        steps: steps
            .iter()
            .map(|(step_id, label, duration)| TimerStep::new(*step_id, *label, *duration))
            .collect(),
    }
}

/// Returns the presets shipped with the application.
pub fn default_presets() -> Vec<Preset> {
    vec![
        preset(
            "default-1",
            "Short practice",
            &[("1-1", "Kirtan", 600), ("1-2", "Meditation", 1200)],
        ),
        preset(
            "default-2",
            "Standard practice",
            &[("2-1", "Kirtan", 1200), ("2-2", "Meditation", 1200)],
        ),
        preset(
            "default-3",
            "Long practice",
            &[
                ("3-1", "Kirtan", 1200),
                ("3-2", "Meditation", 1200),
                ("3-3", "Kirtan", 1200),
                ("3-4", "Meditation", 1200),
                ("3-5", "Kirtan", 1200),
                ("3-6", "Meditation", 1200),
            ],
        ),
    ]
}

/// Looks up a built-in preset by id.
pub fn find_preset(id: &str) -> Option<Preset> {
    default_presets().into_iter().find(|p| p.id == id)
}
