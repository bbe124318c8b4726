use indexmap::IndexMap;

use crate::types::{Alias, RemoteId};

/// Append-only registry mapping row aliases to remote ids, plus compound
/// `alias.Field` keys for values captured after insert.
///
/// Entries are never removed, not even when the underlying record is deleted:
/// teardown passes and late files still resolve references recorded earlier
/// in the run. Iteration order is insertion order.
#[derive(Debug, Default, Clone)]
pub struct KeyMap {
    entries: IndexMap<String, RemoteId>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `alias -> id`, overwriting any id previously recorded for the
    /// alias (an upsert match may re-point an alias at the matched record).
    pub fn set(&mut self, alias: impl Into<Alias>, id: impl Into<RemoteId>) {
        self.entries.insert(alias.into(), id.into());
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.entries.get(alias).map(String::as_str)
    }

    /// Records a captured field value under the compound `alias.Field` key.
    pub fn set_field(&mut self, alias: &str, field: &str, value: impl Into<String>) {
        self.entries.insert(format!("{alias}.{field}"), value.into());
    }

    pub fn get_field(&self, alias: &str, field: &str) -> Option<&str> {
        self.entries
            .get(&format!("{alias}.{field}"))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut keys = KeyMap::new();
        keys.set("StdAccount1", "acc-001");
        assert_eq!(keys.get("StdAccount1"), Some("acc-001"));
        assert_eq!(keys.get("Missing"), None);
    }

    #[test]
    fn set_overwrites_existing_alias() {
        let mut keys = KeyMap::new();
        keys.set("StdAccount1", "acc-001");
        keys.set("StdAccount1", "acc-777");
        assert_eq!(keys.get("StdAccount1"), Some("acc-777"));
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn compound_keys_live_alongside_plain_aliases() {
        let mut keys = KeyMap::new();
        keys.set("StdAccount1", "acc-001");
        keys.set_field("StdAccount1", "PersonContactId", "ctc-100");
        assert_eq!(keys.get("StdAccount1"), Some("acc-001"));
        assert_eq!(
            keys.get_field("StdAccount1", "PersonContactId"),
            Some("ctc-100")
        );
        assert_eq!(keys.get("StdAccount1.PersonContactId"), Some("ctc-100"));
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut keys = KeyMap::new();
        keys.set("B", "2");
        keys.set("A", "1");
        keys.set("C", "3");
        let order: Vec<&str> = keys.iter().map(|(alias, _)| alias).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
    }
}
