// ── Per-BSSID failure blacklist ──
//
// Counts connection failures per BSSID. Counts only grow; the only way
// down is a full `clear()`.

use indexmap::IndexMap;

use crate::model::MacAddr;

#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    entries: IndexMap<MacAddr, u32>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more failure for `bssid`; returns the new count.
    pub fn add(&mut self, bssid: MacAddr) -> u32 {
        let count = self.entries.entry(bssid).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Failure count, zero when absent.
    pub fn count(&self, bssid: MacAddr) -> u32 {
        self.entries.get(&bssid).copied().unwrap_or(0)
    }

    pub fn contains(&self, bssid: MacAddr) -> bool {
        self.entries.contains_key(&bssid)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MacAddr, u32)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_until_clear() {
        let mut bl = Blacklist::new();
        let a = MacAddr::new([2, 0, 0, 0, 0, 1]);
        assert_eq!(bl.add(a), 1);
        assert_eq!(bl.add(a), 2);
        assert_eq!(bl.count(a), 2);
        assert_eq!(bl.count(MacAddr::new([2, 0, 0, 0, 0, 2])), 0);
        bl.clear();
        assert!(bl.is_empty());
        assert_eq!(bl.count(a), 0);
    }
}
