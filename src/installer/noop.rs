use std::{cell::RefCell, rc::Rc};

use log::debug;

use crate::repository::Package;

use super::PackageInstaller;

#[derive(Debug, Default)]
struct Journal {
    installs: Vec<Package>,
    updates: Vec<(Package, Package)>,
    removals: Vec<Package>,
}

/// An installer that touches nothing and always succeeds.
///
/// Requested operations are only noted in memory. Clones share the same
/// journal, so a test can keep a handle while the installer itself is moved
/// into the code under test.
#[derive(Debug, Clone, Default)]
pub struct NoopInstaller {
    journal: Rc<RefCell<Journal>>,
}

impl NoopInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn installs(&self) -> Vec<Package> {
        self.journal.borrow().installs.clone()
    }

    pub fn updates(&self) -> Vec<(Package, Package)> {
        self.journal.borrow().updates.clone()
    }

    pub fn removals(&self) -> Vec<Package> {
        self.journal.borrow().removals.clone()
    }
}

impl PackageInstaller for NoopInstaller {
    fn install(&mut self, package: &Package) -> anyhow::Result<()> {
        debug!("Skipping install of {}", package);
        self.journal.borrow_mut().installs.push(package.clone());
        Ok(())
    }

    fn update(&mut self, from: &Package, to: &Package) -> anyhow::Result<()> {
        debug!("Skipping update of {} to {}", from, to);
        self.journal
            .borrow_mut()
            .updates
            .push((from.clone(), to.clone()));
        Ok(())
    }

    fn remove(&mut self, package: &Package) -> anyhow::Result<()> {
        debug!("Skipping removal of {}", package);
        self.journal.borrow_mut().removals.push(package.clone());
        Ok(())
    }
}
