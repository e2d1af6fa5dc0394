//! Sequence methods.
//!
//! Searches on a mutable wrapper depend on every index and on `length`, and
//! compare against the raw items, retrying with the raw form of the needle
//! so a wrapper finds the target it wraps. Mutators run with tracking
//! paused: their own reads of `length` and of shifted items must not
//! subscribe the running effect to the sequence it is editing. They still
//! write through the wrapper, so every change triggers as a plain write
//! would.

use crate::error::{ReactiveError, Result};
use crate::graph::{Key, TrackOpType};
use crate::reactive::{track, TrackingPause};
use crate::value::{same_value_zero, strict_eq, Target, Value};

use super::{to_raw, Reactive};

type Finder = fn(&[Value], &Value) -> Option<usize>;

fn find_zero(items: &[Value], needle: &Value) -> Option<usize> {
    items.iter().position(|item| same_value_zero(item, needle))
}

fn find_first(items: &[Value], needle: &Value) -> Option<usize> {
    items.iter().position(|item| strict_eq(item, needle))
}

fn find_last(items: &[Value], needle: &Value) -> Option<usize> {
    items.iter().rposition(|item| strict_eq(item, needle))
}

impl Reactive {
    fn sequence_target(&self, op: &'static str) -> Result<Target> {
        let target = self.to_raw();
        if target.is_sequence() {
            Ok(target)
        } else {
            Err(ReactiveError::NotASequence { op })
        }
    }

    fn search(&self, op: &'static str, needle: Value, find: Finder) -> Result<Option<usize>> {
        let target = self.sequence_target(op)?;

        if self.is_readonly() {
            let items: Vec<Value> = (0..self.len()).map(|i| self.get(Key::Index(i))).collect();
            return Ok(find(&items, &needle));
        }

        let len = self.len();
        for index in 0..len {
            track(&target, TrackOpType::Get, Key::Index(index));
        }

        let items = target.to_vec();
        Ok(find(&items, &needle).or_else(|| find(&items, &to_raw(&needle))))
    }

    /// Whether the sequence contains `value`. `NaN` is found.
    pub fn includes(&self, value: impl Into<Value>) -> Result<bool> {
        Ok(self.search("includes", value.into(), find_zero)?.is_some())
    }

    /// Index of the first item equal to `value`.
    pub fn index_of(&self, value: impl Into<Value>) -> Result<Option<usize>> {
        self.search("index_of", value.into(), find_first)
    }

    /// Index of the last item equal to `value`.
    pub fn last_index_of(&self, value: impl Into<Value>) -> Result<Option<usize>> {
        self.search("last_index_of", value.into(), find_last)
    }

    /// Append items, returning the new length.
    pub fn push<I, V>(&self, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.sequence_target("push")?;
        let _pause = TrackingPause::new();

        let mut len = self.len();
        for item in items {
            self.set(Key::Index(len), item)?;
            len += 1;
        }
        self.set(Key::length(), len)?;
        Ok(len)
    }

    /// Remove and return the last item, or `Null` when empty.
    pub fn pop(&self) -> Result<Value> {
        self.sequence_target("pop")?;
        let _pause = TrackingPause::new();

        let len = self.len();
        if len == 0 {
            self.set(Key::length(), 0)?;
            return Ok(Value::Null);
        }
        let last = self.get(Key::Index(len - 1));
        self.delete(Key::Index(len - 1))?;
        self.set(Key::length(), len - 1)?;
        Ok(last)
    }

    /// Remove and return the first item, or `Null` when empty.
    pub fn shift(&self) -> Result<Value> {
        self.sequence_target("shift")?;
        let _pause = TrackingPause::new();

        let len = self.len();
        if len == 0 {
            self.set(Key::length(), 0)?;
            return Ok(Value::Null);
        }
        let first = self.get(Key::Index(0));
        for index in 1..len {
            let moved = self.get(Key::Index(index));
            self.set(Key::Index(index - 1), moved)?;
        }
        self.delete(Key::Index(len - 1))?;
        self.set(Key::length(), len - 1)?;
        Ok(first)
    }

    /// Prepend items, returning the new length.
    pub fn unshift<I, V>(&self, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.sequence_target("unshift")?;
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let _pause = TrackingPause::new();

        let len = self.len();
        let count = items.len();
        for index in (0..len).rev() {
            let moved = self.get(Key::Index(index));
            self.set(Key::Index(index + count), moved)?;
        }
        for (offset, item) in items.into_iter().enumerate() {
            self.set(Key::Index(offset), item)?;
        }
        self.set(Key::length(), len + count)?;
        Ok(len + count)
    }

    /// Remove `delete_count` items starting at `start` and insert `items`
    /// in their place. Returns the removed items.
    ///
    /// `start` and `delete_count` are clamped to the sequence.
    pub fn splice<I, V>(&self, start: usize, delete_count: usize, items: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.sequence_target("splice")?;
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let _pause = TrackingPause::new();

        let len = self.len();
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);
        let insert_count = items.len();

        let removed: Vec<Value> = (start..start + delete_count)
            .map(|index| self.get(Key::Index(index)))
            .collect();

        if insert_count < delete_count {
            for index in start..len - delete_count {
                let moved = self.get(Key::Index(index + delete_count));
                self.set(Key::Index(index + insert_count), moved)?;
            }
            for index in (len - delete_count + insert_count..len).rev() {
                self.delete(Key::Index(index))?;
            }
        } else if insert_count > delete_count {
            for index in (start..len - delete_count).rev() {
                let moved = self.get(Key::Index(index + delete_count));
                self.set(Key::Index(index + insert_count), moved)?;
            }
        }

        for (offset, item) in items.into_iter().enumerate() {
            self.set(Key::Index(start + offset), item)?;
        }
        self.set(Key::length(), len - delete_count + insert_count)?;
        Ok(removed)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{reactive, readonly};
    use crate::reactive::ReactiveEffect;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn numbers(target: &Target) -> Vec<f64> {
        target.to_vec().iter().filter_map(Value::as_number).collect()
    }

    #[test]
    fn search_finds_raw_items_by_wrapper() {
        let item = Target::record();
        let list = reactive(Target::sequence([Value::from(&item)])).unwrap();
        let wrapped_item = reactive(&item).unwrap();

        assert!(list.includes(&wrapped_item).unwrap());
        assert_eq!(list.index_of(&wrapped_item).unwrap(), Some(0));
        assert!(list.includes(&item).unwrap());
    }

    #[test]
    fn includes_and_index_of_treat_nan_differently() {
        let list = reactive(Target::sequence([1.0, f64::NAN, 1.0])).unwrap();
        assert!(list.includes(f64::NAN).unwrap());
        assert_eq!(list.index_of(f64::NAN).unwrap(), None);
        assert_eq!(list.last_index_of(1.0).unwrap(), Some(2));
    }

    #[test]
    fn search_depends_on_every_index() {
        let target = Target::sequence([1, 2, 3]);
        let list = reactive(&target).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let effect = {
            let list = list.clone();
            let runs = runs.clone();
            ReactiveEffect::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                let _ = list.includes(3);
            })
        };
        effect.run();
        // length plus three indices
        assert_eq!(effect.dependency_count(), 4);

        list.set(Key::Index(1), 5).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn readonly_search_compares_wrapped_items() {
        let item = Target::record();
        let list = readonly(Target::sequence([Value::from(&item)])).unwrap();
        let view = readonly(&item).unwrap();
        assert!(list.includes(&view).unwrap());
    }

    #[test]
    fn push_does_not_track_length() {
        let target = Target::sequence([1, 2, 3]);
        let list = reactive(&target).unwrap();
        let effect = {
            let list = list.clone();
            ReactiveEffect::new(move || {
                list.push([4]).unwrap();
            })
        };
        effect.run();

        assert_eq!(effect.dependency_count(), 0);
        assert_eq!(numbers(&target), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn push_triggers_length_subscribers() {
        let list = reactive(Target::sequence([1])).unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let _effect = {
            let list = list.clone();
            let seen = seen.clone();
            let effect = ReactiveEffect::new(move || {
                seen.store(list.len(), Ordering::SeqCst);
            });
            effect.run();
            effect
        };

        assert_eq!(list.push([2, 3]).unwrap(), 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn pop_and_shift() {
        let target = Target::sequence([1, 2, 3]);
        let list = reactive(&target).unwrap();

        assert_eq!(list.pop().unwrap(), Value::from(3));
        assert_eq!(list.shift().unwrap(), Value::from(1));
        assert_eq!(numbers(&target), vec![2.0]);

        list.pop().unwrap();
        assert_eq!(list.pop().unwrap(), Value::Null);
        assert!(target.is_empty());
    }

    #[test]
    fn unshift_prepends() {
        let target = Target::sequence([3]);
        let list = reactive(&target).unwrap();
        assert_eq!(list.unshift([1, 2]).unwrap(), 3);
        assert_eq!(numbers(&target), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn splice_removes_and_inserts() {
        let target = Target::sequence([1, 2, 3, 4, 5]);
        let list = reactive(&target).unwrap();

        let removed = list.splice(1, 2, [9]).unwrap();
        assert_eq!(removed, vec![Value::from(2), Value::from(3)]);
        assert_eq!(numbers(&target), vec![1.0, 9.0, 4.0, 5.0]);

        let removed = list.splice(1, 0, [7, 8]).unwrap();
        assert!(removed.is_empty());
        assert_eq!(numbers(&target), vec![1.0, 7.0, 8.0, 9.0, 4.0, 5.0]);

        let removed = list.splice(4, 10, Vec::<Value>::new()).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(target.len(), 4);
    }

    #[test]
    fn mutators_reject_readonly_and_records() {
        let list = readonly(Target::sequence([1])).unwrap();
        assert!(matches!(list.push([2]), Err(ReactiveError::ReadonlyTarget { .. })));
        assert!(list.pop().is_err());

        let record = reactive(Target::record()).unwrap();
        assert!(matches!(
            record.push([1]),
            Err(ReactiveError::NotASequence { op: "push" })
        ));
        assert!(record.includes(1).is_err());
    }
}
