//! Prompt for the workout generator

use crate::workout::{Goal, Level, WorkoutType};

/// Build the instruction sent to the language model.
///
/// Inputs are expected to be validated already; the function never fails.
pub fn build_prompt(
    goal: Goal,
    height_cm: u32,
    weight_kg: u32,
    level: Level,
    workout_type: WorkoutType,
) -> String {
    format!(
        "Пользователь с ростом {height_cm} см и весом {weight_kg} кг. \
        Цель: {goal}. Уровень подготовки: {level}. Формат тренировки: {workout_type}. \
        Составь структурированный план тренировки в тренажёрном зале на 45–60 минут \
        с акцентом на его цель: разминка, основная часть и заминка. \
        Для каждого упражнения укажи подходы и повторения, рекомендации по рабочему весу \
        и время отдыха между подходами, а также коротко опиши технику выполнения.",
        goal = goal.name_ru(),
        level = level.name_ru(),
        workout_type = workout_type.name_ru(),
    )
}
