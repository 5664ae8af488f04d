//! Draw order of a scene's instances.

/// Ids in the order they are drawn. Reordering an unknown id is a no-op that
/// reports `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOrder {
    ids: Vec<String>,
}

impl RenderOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub(crate) fn push(&mut self, id: String) {
        self.ids.push(id);
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(index) => {
                self.ids.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.ids.clear();
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|i| i == id)
    }

    fn move_to(&mut self, id: &str, target: impl FnOnce(usize, usize) -> usize) -> bool {
        let Some(index) = self.position(id) else {
            log::warn!("cannot reorder `{id}`: no such instance");
            return false;
        };
        let target = target(index, self.ids.len() - 1);
        if target != index {
            let id = self.ids.remove(index);
            self.ids.insert(target, id);
            log::debug!("render order: {:?}", self.ids);
        }
        true
    }

    pub fn first(&mut self, id: &str) -> bool {
        self.move_to(id, |_, _| 0)
    }

    pub fn last(&mut self, id: &str) -> bool {
        self.move_to(id, |_, last| last)
    }

    /// Swaps with the previous id. The first id stays put.
    pub fn sooner(&mut self, id: &str) -> bool {
        self.move_to(id, |index, _| {
            if index == 0 {
                log::warn!("`{id}` is already drawn first");
            }
            index.saturating_sub(1)
        })
    }

    /// Swaps with the next id. The last id stays put.
    pub fn later(&mut self, id: &str) -> bool {
        self.move_to(id, |index, last| {
            if index == last {
                log::warn!("`{id}` is already drawn last");
            }
            (index + 1).min(last)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(ids: &[&str]) -> RenderOrder {
        let mut order = RenderOrder::new();
        for id in ids {
            order.push(id.to_string());
        }
        order
    }

    fn ids(order: &RenderOrder) -> Vec<&str> {
        order.iter().collect()
    }

    #[test]
    fn first_and_last() {
        let mut o = order(&["a", "b", "c"]);
        assert!(o.last("a"));
        assert_eq!(ids(&o), ["b", "c", "a"]);
        assert!(o.first("c"));
        assert_eq!(ids(&o), ["c", "b", "a"]);
    }

    #[test]
    fn sooner_and_later_stop_at_the_ends() {
        let mut o = order(&["a", "b", "c"]);
        assert!(o.sooner("b"));
        assert_eq!(ids(&o), ["b", "a", "c"]);
        assert!(o.sooner("b"));
        assert_eq!(ids(&o), ["b", "a", "c"]);
        assert!(o.later("a"));
        assert_eq!(ids(&o), ["b", "c", "a"]);
        assert!(o.later("a"));
        assert_eq!(ids(&o), ["b", "c", "a"]);
    }

    #[test]
    fn unknown_ids_are_reported() {
        let mut o = order(&["a"]);
        assert!(!o.last("z"));
        assert!(!o.remove("z"));
        assert!(o.remove("a"));
        assert!(o.is_empty());
    }
}
