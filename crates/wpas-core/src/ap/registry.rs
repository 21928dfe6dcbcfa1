// ── AP interface registry ──
//
// Every radio the AP side manages, keyed by its primary BSS name.

use std::time::Duration;

use tracing::info;

use crate::ap::iface::{ApEvent, ApInterface};
use crate::error::CoreError;

#[derive(Debug, Default)]
pub struct ApRegistry {
    ifaces: Vec<ApInterface>,
}

/// What `remove_iface` took away.
#[derive(Debug)]
pub enum Removed {
    Interface(ApInterface),
    Bss { iface: String },
}

impl ApRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_iface(&mut self, iface: ApInterface) -> Result<&mut ApInterface, CoreError> {
        if self.owner_of(iface.name()).is_some() {
            return Err(CoreError::Rejected {
                message: format!("interface {} already exists", iface.name()),
            });
        }
        self.ifaces.push(iface);
        let last = self.ifaces.len() - 1;
        Ok(&mut self.ifaces[last])
    }

    /// Remove a whole interface when `name` is a primary BSS, otherwise
    /// just the secondary BSS called `name`.
    pub fn remove_iface(&mut self, name: &str) -> Result<Removed, CoreError> {
        if let Some(pos) = self.ifaces.iter().position(|i| i.name() == name) {
            let mut iface = self.ifaces.remove(pos);
            iface.disable();
            info!(iface = %name, "interface removed");
            return Ok(Removed::Interface(iface));
        }
        let pos = self
            .owner_of(name)
            .ok_or_else(|| CoreError::InterfaceNotFound { name: name.into() })?;
        let iface = &mut self.ifaces[pos];
        if let Some(idx) = iface.bss().iter().position(|b| b.name() == name) {
            iface.remove_bss(idx);
        }
        Ok(Removed::Bss {
            iface: iface.name().to_owned(),
        })
    }

    /// Index of the interface hosting a BSS called `name`.
    fn owner_of(&self, name: &str) -> Option<usize> {
        self.ifaces
            .iter()
            .position(|i| i.find_bss(name).is_some())
    }

    pub fn get(&self, name: &str) -> Option<&ApInterface> {
        self.ifaces.iter().find(|i| i.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ApInterface> {
        self.ifaces.iter_mut().find(|i| i.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApInterface> {
        self.ifaces.iter()
    }

    pub fn len(&self) -> usize {
        self.ifaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ifaces.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.ifaces.iter().filter_map(ApInterface::next_deadline).min()
    }

    pub fn advance(&mut self, now: Duration) {
        for iface in &mut self.ifaces {
            iface.advance(now);
        }
    }

    /// Events from every interface, tagged with the primary BSS name.
    pub fn drain_events(&mut self) -> Vec<(String, ApEvent)> {
        let mut out = Vec::new();
        for iface in &mut self.ifaces {
            let name = iface.name().to_owned();
            out.extend(iface.drain_events().into_iter().map(|e| (name.clone(), e)));
        }
        out
    }
}
