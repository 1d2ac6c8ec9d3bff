//! `NoDropContext` / `RouterContext`: scoped acquire-then-guaranteed-release
//! guards (spec.md §4.9), modelled the way the teacher's database `Cork`
//! guard restores state on every exit path via `Drop`.

use spalloc_core::Result;

/// External collaborator seam for the reinjection/router-table toggles
/// these contexts perform. Out of scope to implement against real
/// hardware (spec.md §2); the contexts just need something to call.
pub trait CoreStateDriver: Send + Sync {
    fn reinjection_enabled(&self, core: u32) -> Result<bool>;
    fn set_reinjection_enabled(&self, core: u32, enabled: bool) -> Result<()>;
    fn clear_reinjection_queues(&self, core: u32) -> Result<()>;
    fn set_reinjection_timeout_infinite(&self, core: u32) -> Result<()>;
    fn set_emergency_timeout(&self, core: u32, retries: u8, timeout: u8) -> Result<()>;
    fn check_core_state(&self, core: u32) -> Result<String>;
}

/// Opened once per download (spec.md §4.9): disables packet reinjection on
/// every monitor for the duration, restoring on drop.
pub struct NoDropContext<'a> {
    driver: &'a dyn CoreStateDriver,
    saved: Vec<(u32, bool)>,
}

impl<'a> NoDropContext<'a> {
    pub fn open(driver: &'a dyn CoreStateDriver, cores: Vec<u32>) -> Result<Self> {
        let mut saved = Vec::with_capacity(cores.len());
        for &core in &cores {
            saved.push((core, driver.reinjection_enabled(core)?));
            driver.set_reinjection_enabled(core, false)?;
            driver.clear_reinjection_queues(core)?;
            driver.set_reinjection_timeout_infinite(core)?;
            driver.set_emergency_timeout(core, 1, 1)?;
        }
        Ok(Self { driver, saved })
    }
}

impl Drop for NoDropContext<'_> {
    fn drop(&mut self) {
        for &(core, was_enabled) in &self.saved {
            if let Err(err) = self.driver.set_reinjection_enabled(core, was_enabled) {
                if let Ok(state) = self.driver.check_core_state(core) {
                    tracing::error!(core, state, %err, "failed to restore reinjection state");
                } else {
                    tracing::error!(core, %err, "failed to restore reinjection state and core state is unreadable");
                }
            }
        }
    }
}

/// Steers data-speed-up traffic to the gatherer for the duration of a
/// download, restoring application router tables on close (spec.md §4.9).
pub trait RouterTableDriver: Send + Sync {
    fn install_system_tables(&self, chip: u32) -> Result<()>;
    fn restore_application_tables(&self, chip: u32) -> Result<()>;
    fn check_core_state(&self, chip: u32) -> Result<String>;
}

pub struct RouterContext<'a> {
    driver: &'a dyn RouterTableDriver,
    chips: Vec<u32>,
}

impl<'a> RouterContext<'a> {
    pub fn open(driver: &'a dyn RouterTableDriver, chips: Vec<u32>) -> Result<Self> {
        for &chip in &chips {
            driver.install_system_tables(chip)?;
        }
        Ok(Self { driver, chips })
    }
}

impl Drop for RouterContext<'_> {
    fn drop(&mut self) {
        for &chip in &self.chips {
            if let Err(err) = self.driver.restore_application_tables(chip) {
                if let Ok(state) = self.driver.check_core_state(chip) {
                    tracing::error!(chip, state, %err, "failed to restore application router tables");
                } else {
                    tracing::error!(chip, %err, "failed to restore application router tables and chip state is unreadable");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDriver {
        enabled: Mutex<std::collections::HashMap<u32, bool>>,
        restore_calls: Mutex<u32>,
    }

    impl CoreStateDriver for FakeDriver {
        fn reinjection_enabled(&self, core: u32) -> Result<bool> {
            Ok(*self.enabled.lock().unwrap().entry(core).or_insert(true))
        }
        fn set_reinjection_enabled(&self, core: u32, enabled: bool) -> Result<()> {
            *self.restore_calls.lock().unwrap() += 1;
            self.enabled.lock().unwrap().insert(core, enabled);
            Ok(())
        }
        fn clear_reinjection_queues(&self, _core: u32) -> Result<()> {
            Ok(())
        }
        fn set_reinjection_timeout_infinite(&self, _core: u32) -> Result<()> {
            Ok(())
        }
        fn set_emergency_timeout(&self, _core: u32, _retries: u8, _timeout: u8) -> Result<()> {
            Ok(())
        }
        fn check_core_state(&self, _core: u32) -> Result<String> {
            Ok("ok".into())
        }
    }

    #[test]
    fn context_restores_saved_reinjection_state_on_drop() {
        let driver = FakeDriver::default();
        {
            let _ctx = NoDropContext::open(&driver, vec![1, 2]).unwrap();
            assert_eq!(*driver.enabled.lock().unwrap().get(&1).unwrap(), false);
        }
        assert_eq!(*driver.enabled.lock().unwrap().get(&1).unwrap(), true, "drop must restore the original state");
        assert_eq!(*driver.enabled.lock().unwrap().get(&2).unwrap(), true);
    }
}
