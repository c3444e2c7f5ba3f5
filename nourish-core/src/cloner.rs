//! Day cloning: replicate one day's meals and items onto other days.

use uuid::Uuid;

use crate::model::{Meal, MealItem};

/// Fresh copies of a day's meals and their items for `target_day_id`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClonedDay {
    pub meals: Vec<Meal>,
    pub items: Vec<MealItem>,
}

impl ClonedDay {
    pub fn is_empty(&self) -> bool {
        self.meals.is_empty()
    }
}

/// Copy `source_meals` (in start-time order) with new ids onto `target_day_id`.
///
/// Items follow their meal and keep `sort_order`. Logs are never part of a clone.
pub fn clone_meals(source_meals: &[Meal], source_items: &[MealItem], target_day_id: Uuid) -> ClonedDay {
    let mut meals: Vec<&Meal> = source_meals.iter().collect();
    meals.sort_by_key(|m| m.start_time);

    let mut out = ClonedDay::default();
    for src in meals {
        let meal = Meal {
            id: Uuid::new_v4(),
            day_id: target_day_id,
            ..src.clone()
        };
        out.items.extend(
            source_items
                .iter()
                .filter(|i| i.meal_id == src.id)
                .map(|i| MealItem {
                    id: Uuid::new_v4(),
                    meal_id: meal.id,
                    ..i.clone()
                }),
        );
        out.meals.push(meal);
    }
    out
}
