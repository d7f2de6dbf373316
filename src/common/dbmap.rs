//! The database map, §3 "Database map". Must be identical across all
//! active nodes (set-equal on `dbid`).

use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DbEntry {
    pub dbid: u32,
    pub name: String,
    pub persistent: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DbMap {
    pub dbs: Vec<DbEntry>,
}

impl DbMap {
    pub fn new(dbs: Vec<DbEntry>) -> Self { DbMap { dbs } }

    pub fn dbids(&self) -> BTreeSet<u32> { self.dbs.iter().map(|d| d.dbid).collect() }

    pub fn contains_name(&self, name: &str) -> bool { self.dbs.iter().any(|d| d.name == name) }

    pub fn get(&self, dbid: u32) -> Option<&DbEntry> { self.dbs.iter().find(|d| d.dbid == dbid) }

    /// Set-equal on dbid against a peer's reported dbmap.
    pub fn set_equal(&self, other: &DbMap) -> bool { self.dbids() == other.dbids() }

    pub fn missing_from(&self, other: &DbMap) -> Vec<&DbEntry> {
        self.dbs.iter().filter(|d| !other.contains_name(&d.name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, name: &str) -> DbEntry { DbEntry { dbid: id, name: name.into(), persistent: true } }

    #[test]
    fn set_equality_ignores_order() {
        let a = DbMap::new(vec![entry(1, "a"), entry(2, "b")]);
        let b = DbMap::new(vec![entry(2, "b"), entry(1, "a")]);
        assert!(a.set_equal(&b));
    }

    #[test]
    fn missing_from_detects_name_gaps() {
        let local = DbMap::new(vec![entry(1, "a"), entry(2, "b")]);
        let remote = DbMap::new(vec![entry(1, "a")]);
        let missing = local.missing_from(&remote);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "b");
    }
}
