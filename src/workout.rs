//! Workout profile - цель, уровень, формат тренировки и параметры тела

use std::ops::RangeInclusive;

use thiserror::Error;

/// Допустимый рост, см
pub const HEIGHT_RANGE: RangeInclusive<u32> = 100..=250;
/// Допустимый вес, кг
pub const WEIGHT_RANGE: RangeInclusive<u32> = 30..=200;

/// Training goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Goal {
    MassGain, // Набор массы
    Cutting,  // Сушка
    Strength, // Сила
}

impl Goal {
    pub fn id(&self) -> &'static str {
        match self {
            Goal::MassGain => "mass",
            Goal::Cutting => "cut",
            Goal::Strength => "strength",
        }
    }

    pub fn name_ru(&self) -> &'static str {
        match self {
            Goal::MassGain => "набор массы",
            Goal::Cutting => "сушка",
            Goal::Strength => "сила",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Goal::MassGain => "💪",
            Goal::Cutting => "🔥",
            Goal::Strength => "🏋️",
        }
    }

    pub fn all() -> &'static [Goal] {
        &[Goal::MassGain, Goal::Cutting, Goal::Strength]
    }
}

/// Experience level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Level {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl Level {
    pub fn id(&self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }

    pub fn name_ru(&self) -> &'static str {
        match self {
            Level::Beginner => "новичок",
            Level::Intermediate => "средний",
            Level::Advanced => "продвинутый",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Level::Beginner => "🌱",
            Level::Intermediate => "⚡",
            Level::Advanced => "🏆",
        }
    }

    pub fn all() -> &'static [Level] {
        &[Level::Beginner, Level::Intermediate, Level::Advanced]
    }
}

/// Preferred workout format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WorkoutType {
    #[default]
    FullBody,
    Split,
    CardioStrength, // Кардио + силовая
}

impl WorkoutType {
    pub fn id(&self) -> &'static str {
        match self {
            WorkoutType::FullBody => "fullbody",
            WorkoutType::Split => "split",
            WorkoutType::CardioStrength => "cardio",
        }
    }

    pub fn name_ru(&self) -> &'static str {
        match self {
            WorkoutType::FullBody => "фулбоди",
            WorkoutType::Split => "сплит",
            WorkoutType::CardioStrength => "кардио + силовая",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            WorkoutType::FullBody => "🧍",
            WorkoutType::Split => "🔀",
            WorkoutType::CardioStrength => "🏃",
        }
    }

    pub fn all() -> &'static [WorkoutType] {
        &[WorkoutType::FullBody, WorkoutType::Split, WorkoutType::CardioStrength]
    }
}

/// Common lookup for the three choice enums
pub trait Choice: Copy + 'static {
    fn variants() -> &'static [Self];
    fn choice_id(&self) -> &'static str;
    fn label(&self) -> &'static str;

    fn from_id(id: &str) -> Option<Self> {
        Self::variants().iter().copied().find(|c| c.choice_id() == id)
    }

    /// Match free text against the localized name (case-insensitive)
    fn from_label(text: &str) -> Option<Self> {
        let text = text.trim().to_lowercase();
        Self::variants()
            .iter()
            .copied()
            .find(|c| c.label() == text || c.choice_id() == text)
    }
}

impl Choice for Goal {
    fn variants() -> &'static [Self] {
        Goal::all()
    }
    fn choice_id(&self) -> &'static str {
        self.id()
    }
    fn label(&self) -> &'static str {
        self.name_ru()
    }
}

impl Choice for Level {
    fn variants() -> &'static [Self] {
        Level::all()
    }
    fn choice_id(&self) -> &'static str {
        self.id()
    }
    fn label(&self) -> &'static str {
        self.name_ru()
    }
}

impl Choice for WorkoutType {
    fn variants() -> &'static [Self] {
        WorkoutType::all()
    }
    fn choice_id(&self) -> &'static str {
        self.id()
    }
    fn label(&self) -> &'static str {
        self.name_ru()
    }
}

/// Validated height and weight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub height_cm: u32,
    pub weight_kg: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("expected two numbers, got {0} tokens")]
    TokenCount(usize),
    #[error("not an integer: {0:?}")]
    NotANumber(String),
    #[error("height {0} cm out of range")]
    HeightOutOfRange(u32),
    #[error("weight {0} kg out of range")]
    WeightOutOfRange(u32),
}

/// Parse "185 75" into validated stats
pub fn parse_stats(text: &str) -> Result<Stats, StatsError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let [height, weight] = tokens.as_slice() else {
        return Err(StatsError::TokenCount(tokens.len()));
    };

    let height_cm = parse_number(height)?;
    let weight_kg = parse_number(weight)?;

    if !HEIGHT_RANGE.contains(&height_cm) {
        return Err(StatsError::HeightOutOfRange(height_cm));
    }
    if !WEIGHT_RANGE.contains(&weight_kg) {
        return Err(StatsError::WeightOutOfRange(weight_kg));
    }

    Ok(Stats { height_cm, weight_kg })
}

fn parse_number(token: &str) -> Result<u32, StatsError> {
    token
        .parse::<u32>()
        .map_err(|_| StatsError::NotANumber(token.to_string()))
}
