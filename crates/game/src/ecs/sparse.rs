/// Per-component storage: one optional slot per entity index.
///
/// The backing vector only ever grows. `len` is the high-water mark of
/// the highest index ever written, not the number of populated slots.
#[derive(Debug, Clone)]
pub struct SparseArray<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for SparseArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SparseArray<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    pub fn set(&mut self, index: usize, value: T) -> Option<T> {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index].replace(value)
    }

    pub fn clear(&mut self, index: usize) -> Option<T> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn population(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn slots(&self) -> &[Option<T>] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [Option<T>] {
        &mut self.slots
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|value| (index, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_is_absent() {
        let store: SparseArray<u32> = SparseArray::new();
        assert!(store.get(0).is_none());
        assert!(store.get(1_000).is_none());
    }

    #[test]
    fn set_grows_to_high_water_mark() {
        let mut store = SparseArray::new();
        store.set(7, "seven");

        assert_eq!(store.len(), 8);
        assert_eq!(store.population(), 1);
        assert_eq!(store.get(7), Some(&"seven"));
        assert!(store.get(3).is_none());
    }

    #[test]
    fn clear_does_not_shrink() {
        let mut store = SparseArray::new();
        store.set(2, 10);
        store.set(5, 20);

        assert_eq!(store.clear(5), Some(20));
        assert_eq!(store.len(), 6);
        assert!(!store.contains(5));
        assert_eq!(store.clear(40), None);
    }

    #[test]
    fn set_replaces_previous_value() {
        let mut store = SparseArray::new();
        assert_eq!(store.set(1, 'a'), None);
        assert_eq!(store.set(1, 'b'), Some('a'));
        assert_eq!(store.iter().collect::<Vec<_>>(), vec![(1, &'b')]);
    }
}
