// ── Profile store ──
//
// Ordered network profiles keyed by a stable ProfileId. Iteration for
// selection goes through `groups()`, which returns a snapshot of IDs so
// callers may add or remove profiles while walking it.

use indexmap::IndexMap;

use crate::model::{NetworkProfile, ProfileId};

#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    profiles: IndexMap<ProfileId, NetworkProfile>,
    next_id: u32,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_profiles(profiles: impl IntoIterator<Item = NetworkProfile>) -> Self {
        let mut store = Self::new();
        for p in profiles {
            store.add(p);
        }
        store
    }

    /// Append a profile; IDs are never reused.
    pub fn add(&mut self, profile: NetworkProfile) -> ProfileId {
        let id = ProfileId(self.next_id);
        self.next_id += 1;
        self.profiles.insert(id, profile);
        id
    }

    /// Remove a profile, preserving the order of the rest.
    pub fn remove(&mut self, id: ProfileId) -> Option<NetworkProfile> {
        self.profiles.shift_remove(&id)
    }

    pub fn get(&self, id: ProfileId) -> Option<&NetworkProfile> {
        self.profiles.get(&id)
    }

    pub fn get_mut(&mut self, id: ProfileId) -> Option<&mut NetworkProfile> {
        self.profiles.get_mut(&id)
    }

    pub fn contains(&self, id: ProfileId) -> bool {
        self.profiles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Snapshot of every ID in insertion order.
    pub fn ids(&self) -> Vec<ProfileId> {
        self.profiles.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProfileId, &NetworkProfile)> {
        self.profiles.iter().map(|(id, p)| (*id, p))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ProfileId, &mut NetworkProfile)> {
        self.profiles.iter_mut().map(|(id, p)| (*id, p))
    }

    /// Priority groups, highest priority first; insertion order within
    /// a group.
    pub fn groups(&self) -> Vec<Vec<ProfileId>> {
        let mut priorities: Vec<i32> = self.profiles.values().map(|p| p.priority).collect();
        priorities.sort_unstable_by(|a, b| b.cmp(a));
        priorities.dedup();
        priorities
            .into_iter()
            .map(|prio| {
                self.profiles
                    .iter()
                    .filter(|(_, p)| p.priority == prio)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .collect()
    }

    /// IDs of profiles not disabled for any reason.
    pub fn enabled(&self) -> Vec<ProfileId> {
        self.profiles
            .iter()
            .filter(|(_, p)| !p.is_disabled())
            .map(|(id, _)| *id)
            .collect()
    }
}
