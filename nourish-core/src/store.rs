//! Persistence seam.
//!
//! The tracker talks to a generic record store: insert, filtered/ordered query,
//! patch-style update and filtered delete. `MemoryStore` is the in-process
//! implementation used by tests and embedders; the CLI ships a file-backed one.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Day, LogStatus, Meal, MealItem, MealLog, Program, WaterLog};

/// A comparable field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `None` when either side is null or the kinds differ.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Value),
    Gt(&'static str, Value),
    Gte(&'static str, Value),
    Lt(&'static str, Value),
    Lte(&'static str, Value),
    In(&'static str, Vec<Value>),
}

impl Filter {
    pub fn matches<R: Record>(&self, row: &R) -> bool {
        use Ordering::{Equal, Greater, Less};

        match self {
            Filter::Eq(f, v) => row.field(f).compare(v) == Some(Equal),
            Filter::Gt(f, v) => row.field(f).compare(v) == Some(Greater),
            Filter::Gte(f, v) => matches!(row.field(f).compare(v), Some(Greater | Equal)),
            Filter::Lt(f, v) => row.field(f).compare(v) == Some(Less),
            Filter::Lte(f, v) => matches!(row.field(f).compare(v), Some(Less | Equal)),
            Filter::In(f, vs) => {
                let actual = row.field(f);
                vs.iter().any(|v| actual.compare(v) == Some(Equal))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nulls {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: &'static str,
    pub direction: Direction,
    pub nulls: Nulls,
}

impl Order {
    pub fn asc(field: &'static str) -> Self {
        Self {
            field,
            direction: Direction::Asc,
            nulls: Nulls::Last,
        }
    }

    pub fn desc(field: &'static str) -> Self {
        Self {
            field,
            direction: Direction::Desc,
            nulls: Nulls::Last,
        }
    }

    pub fn nulls(mut self, nulls: Nulls) -> Self {
        self.nulls = nulls;
        self
    }

    fn compare<R: Record>(&self, a: &R, b: &R) -> Ordering {
        let (va, vb) = (a.field(self.field), b.field(self.field));
        match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match self.nulls {
                Nulls::First => Ordering::Less,
                Nulls::Last => Ordering::Greater,
            },
            (false, true) => match self.nulls {
                Nulls::First => Ordering::Greater,
                Nulls::Last => Ordering::Less,
            },
            (false, false) => {
                let ord = va.compare(&vb).unwrap_or(Ordering::Equal);
                match self.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            }
        }
    }
}

/// Conjunction of filters plus optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self::new().eq("id", id)
    }

    pub fn eq(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field, value.into()));
        self
    }

    pub fn gt(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gt(field, value.into()));
        self
    }

    pub fn gte(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(field, value.into()));
        self
    }

    pub fn lt(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lt(field, value.into()));
        self
    }

    pub fn lte(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte(field, value.into()));
        self
    }

    pub fn is_in<V: Into<Value>>(mut self, field: &'static str, values: impl IntoIterator<Item = V>) -> Self {
        self.filters
            .push(Filter::In(field, values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches<R: Record>(&self, row: &R) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Filter, stable-sort and truncate `rows`.
    pub fn apply<R: Record>(&self, rows: impl IntoIterator<Item = R>) -> Vec<R> {
        let mut out: Vec<R> = rows.into_iter().filter(|r| self.matches(r)).collect();
        if let Some(order) = &self.order {
            out.sort_by(|a, b| order.compare(a, b));
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

/// A persistable entity with named, comparable fields.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    const TABLE: &'static str;

    fn id(&self) -> Uuid;

    /// Unknown field names read as `Value::Null`.
    fn field(&self, name: &str) -> Value;
}

pub trait Store: Send + Sync {
    fn insert<R: Record>(&self, rows: Vec<R>) -> Result<Vec<R>, StoreError>;

    fn query<R: Record>(&self, query: &Query) -> Result<Vec<R>, StoreError>;

    /// Apply `patch` to every matching row; returns the number of rows touched.
    fn update<R: Record>(&self, query: &Query, patch: &dyn Fn(&mut R)) -> Result<usize, StoreError>;

    fn delete<R: Record>(&self, query: &Query) -> Result<usize, StoreError>;

    fn insert_one<R: Record>(&self, row: R) -> Result<R, StoreError> {
        self.insert(vec![row])?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Unavailable(format!("insert into {} returned no rows", R::TABLE)))
    }

    fn find<R: Record>(&self, id: Uuid) -> Result<Option<R>, StoreError> {
        Ok(self.query::<R>(&Query::by_id(id).limit(1))?.into_iter().next())
    }
}

impl<S: Store> Store for Arc<S> {
    fn insert<R: Record>(&self, rows: Vec<R>) -> Result<Vec<R>, StoreError> {
        (**self).insert(rows)
    }

    fn query<R: Record>(&self, query: &Query) -> Result<Vec<R>, StoreError> {
        (**self).query(query)
    }

    fn update<R: Record>(&self, query: &Query, patch: &dyn Fn(&mut R)) -> Result<usize, StoreError> {
        (**self).update(query, patch)
    }

    fn delete<R: Record>(&self, query: &Query) -> Result<usize, StoreError> {
        (**self).delete::<R>(query)
    }
}

/// In-process store: one typed table per record type.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<R: Record, T>(&self, f: impl FnOnce(&mut Vec<R>) -> T) -> Result<T, StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        let entry = tables
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Box::new(Vec::<R>::new()));
        let rows = entry.downcast_mut::<Vec<R>>().ok_or_else(|| StoreError::Corrupt {
            table: R::TABLE,
            message: "table holds a different record type".to_string(),
        })?;
        Ok(f(rows))
    }
}

impl Store for MemoryStore {
    fn insert<R: Record>(&self, rows: Vec<R>) -> Result<Vec<R>, StoreError> {
        self.with_table(|table: &mut Vec<R>| {
            table.extend(rows.iter().cloned());
            rows
        })
    }

    fn query<R: Record>(&self, query: &Query) -> Result<Vec<R>, StoreError> {
        self.with_table(|table: &mut Vec<R>| query.apply(table.iter().cloned()))
    }

    fn update<R: Record>(&self, query: &Query, patch: &dyn Fn(&mut R)) -> Result<usize, StoreError> {
        self.with_table(|table: &mut Vec<R>| {
            let mut touched = 0;
            for row in table.iter_mut() {
                if query.matches(&*row) {
                    patch(row);
                    touched += 1;
                }
            }
            touched
        })
    }

    fn delete<R: Record>(&self, query: &Query) -> Result<usize, StoreError> {
        self.with_table(|table: &mut Vec<R>| {
            let before = table.len();
            table.retain(|r| !query.matches(r));
            before - table.len()
        })
    }
}

impl Record for Program {
    const TABLE: &'static str = "programs";

    fn id(&self) -> Uuid {
        self.id
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "subject_id" => self.subject_id.into(),
            "start_date" => self.start_date.into(),
            "end_date" => self.end_date.into(),
            "day_count" => self.day_count.into(),
            "daily_water_target_ml" => self.daily_water_target_ml.into(),
            _ => Value::Null,
        }
    }
}

impl Record for Day {
    const TABLE: &'static str = "program_days";

    fn id(&self) -> Uuid {
        self.id
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "program_id" => self.program_id.into(),
            "date" => self.date.into(),
            _ => Value::Null,
        }
    }
}

impl Record for Meal {
    const TABLE: &'static str = "meals";

    fn id(&self) -> Uuid {
        self.id
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "day_id" => self.day_id.into(),
            "slot" => self.slot.key().into(),
            "start_time" => self.start_time.into(),
            "end_time" => self.end_time.into(),
            "title" => self.title.clone().into(),
            "kcal" => self.kcal.into(),
            _ => Value::Null,
        }
    }
}

impl Record for MealItem {
    const TABLE: &'static str = "meal_items";

    fn id(&self) -> Uuid {
        self.id
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "meal_id" => self.meal_id.into(),
            "name" => self.name.as_str().into(),
            "sort_order" => self.sort_order.into(),
            "kcal" => self.kcal.into(),
            _ => Value::Null,
        }
    }
}

impl Record for MealLog {
    const TABLE: &'static str = "meal_logs";

    fn id(&self) -> Uuid {
        self.id
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "meal_id" => self.meal_id.into(),
            "subject_id" => self.subject_id.into(),
            "status" => match self.status {
                LogStatus::Eaten => "eaten".into(),
                LogStatus::Skipped => "skipped".into(),
            },
            "logged_at" => self.logged_at_utc.into(),
            _ => Value::Null,
        }
    }
}

impl Record for WaterLog {
    const TABLE: &'static str = "water_logs";

    fn id(&self) -> Uuid {
        self.id
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "day_id" => self.day_id.into(),
            "subject_id" => self.subject_id.into(),
            "milliliters" => self.milliliters.into(),
            "logged_at" => self.logged_at_utc.into(),
            _ => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MealSlot;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        let day = Uuid::new_v4();
        let other_day = Uuid::new_v4();
        store
            .insert(vec![
                Meal::new(day, MealSlot::Dinner, t(19, 0), t(20, 0)),
                Meal::new(day, MealSlot::Breakfast, t(8, 0), t(9, 0)),
                Meal::new(other_day, MealSlot::Lunch, t(13, 0), t(14, 0)),
                Meal::new(day, MealSlot::Lunch, t(13, 0), t(14, 0)),
            ])
            .unwrap();

        let meals: Vec<Meal> = store
            .query(&Query::new().eq("day_id", day).order_by(Order::asc("start_time")))
            .unwrap();
        let slots: Vec<_> = meals.iter().map(|m| m.slot).collect();
        assert_eq!(slots, vec![MealSlot::Breakfast, MealSlot::Lunch, MealSlot::Dinner]);

        let late: Vec<Meal> = store
            .query(&Query::new().gte("start_time", t(13, 0)).order_by(Order::desc("start_time")).limit(1))
            .unwrap();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].slot, MealSlot::Dinner);
    }

    #[test]
    fn nulls_placement_is_independent_of_direction() {
        let store = MemoryStore::new();
        let meal = Uuid::new_v4();
        store
            .insert(vec![
                MealItem::new(meal, "unsorted"),
                MealItem::new(meal, "second").with_sort_order(2),
                MealItem::new(meal, "first").with_sort_order(1),
            ])
            .unwrap();

        let last: Vec<MealItem> = store.query(&Query::new().order_by(Order::asc("sort_order"))).unwrap();
        let names: Vec<_> = last.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "unsorted"]);

        let first: Vec<MealItem> = store
            .query(&Query::new().order_by(Order::desc("sort_order").nulls(Nulls::First)))
            .unwrap();
        let names: Vec<_> = first.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["unsorted", "second", "first"]);
    }

    #[test]
    fn set_membership_update_and_delete() {
        let store = MemoryStore::new();
        let a = Meal::new(Uuid::new_v4(), MealSlot::Lunch, t(12, 0), t(13, 0));
        let b = Meal::new(Uuid::new_v4(), MealSlot::Dinner, t(19, 0), t(20, 0));
        let c = Meal::new(Uuid::new_v4(), MealSlot::Breakfast, t(8, 0), t(9, 0));
        store.insert(vec![a.clone(), b.clone(), c.clone()]).unwrap();

        let touched = store
            .update::<Meal>(&Query::new().is_in("id", [a.id, b.id]), &|m| m.kcal = Some(500))
            .unwrap();
        assert_eq!(touched, 2);
        let found: Meal = store.find(a.id).unwrap().unwrap();
        assert_eq!(found.kcal, Some(500));

        assert_eq!(store.delete::<Meal>(&Query::by_id(c.id)).unwrap(), 1);
        assert!(store.find::<Meal>(c.id).unwrap().is_none());
        assert_eq!(store.query::<Meal>(&Query::new()).unwrap().len(), 2);
    }

    #[test]
    fn shared_store_forwards_every_operation() {
        let store = Arc::new(MemoryStore::new());
        let shared = Arc::clone(&store);
        let lunch = Meal::new(Uuid::new_v4(), MealSlot::Lunch, t(12, 0), t(13, 0));
        shared.insert_one(lunch.clone()).unwrap();
        shared.update::<Meal>(&Query::by_id(lunch.id), &|m| m.kcal = Some(420)).unwrap();
        assert_eq!(store.find::<Meal>(lunch.id).unwrap().unwrap().kcal, Some(420));

        assert_eq!(shared.delete::<Meal>(&Query::by_id(lunch.id)).unwrap(), 1);
        assert!(store.query::<Meal>(&Query::new()).unwrap().is_empty());
    }

    #[test]
    fn null_never_satisfies_comparisons() {
        let item = MealItem::new(Uuid::new_v4(), "water");
        assert!(!Filter::Eq("sort_order", Value::Int(0)).matches(&item));
        assert!(!Filter::Lt("sort_order", Value::Int(10)).matches(&item));
    }
}
