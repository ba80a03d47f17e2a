//! Chain sessions and the session manager.
//!
//! Handles are monotonically issued integers looked up in an ordered map,
//! revalidated on every dereference, so a destroyed session's handle stays
//! dead forever instead of aliasing a later chain. `shutdown` drops only
//! the controller and keeps the slot (and its temp directory) inspectable.

use crate::error::HostError;
use simchain_chain::{extract_chain_id, read_snapshot, Controller, GenesisState};
use simchain_crypto::Keypair;
use simchain_types::{BlockInfo, Checksum256};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;

/// One independent, disposable blockchain instance.
pub struct ChainSession {
    dir: TempDir,
    controller: Option<Controller>,
    producer_key: Keypair,
}

impl ChainSession {
    fn from_genesis() -> Result<Self, HostError> {
        let dir = TempDir::new().map_err(|e| HostError::Chain(e.into()))?;
        let controller = Controller::new(&GenesisState::default(), dir.path())?;
        Ok(Self {
            dir,
            controller: Some(controller),
            producer_key: Keypair::producer(),
        })
    }

    fn from_snapshot(snapshot_path: &Path) -> Result<Self, HostError> {
        // Validate the header and embedded identity before building anything.
        let chain_id = extract_chain_id(snapshot_path)?;
        let snapshot = read_snapshot(snapshot_path)?;
        if snapshot.chain_id != chain_id {
            return Err(HostError::Chain(simchain_chain::ChainError::Snapshot(
                "chain id mismatch".to_string(),
            )));
        }
        let dir = TempDir::new().map_err(|e| HostError::Chain(e.into()))?;
        let controller = Controller::from_snapshot(snapshot, dir.path())?;
        Ok(Self {
            dir,
            controller: Some(controller),
            producer_key: Keypair::producer(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn is_shut_down(&self) -> bool {
        self.controller.is_none()
    }

    /// Replace the key this session signs blocks with.
    pub fn set_producer_key(&mut self, key: Keypair) {
        self.producer_key = key;
    }

    pub fn producer_key(&self) -> &Keypair {
        &self.producer_key
    }

    fn control(&mut self, handle: u32) -> Result<&mut Controller, HostError> {
        self.controller
            .as_mut()
            .ok_or(HostError::ChainShutDown(handle))
    }

    pub fn start_block(&mut self, handle: u32, skip_ms: i64) -> Result<(), HostError> {
        let ChainSession {
            controller,
            producer_key,
            ..
        } = self;
        let controller = controller.as_mut().ok_or(HostError::ChainShutDown(handle))?;
        controller.start_block(skip_ms, |digest: &Checksum256| {
            producer_key.sign_digest(digest)
        })?;
        Ok(())
    }

    pub fn finish_block(&mut self, handle: u32) -> Result<(), HostError> {
        let ChainSession {
            controller,
            producer_key,
            ..
        } = self;
        let controller = controller.as_mut().ok_or(HostError::ChainShutDown(handle))?;
        controller.finish_block(|digest: &Checksum256| producer_key.sign_digest(digest))?;
        Ok(())
    }

    pub fn head_block_info(&mut self, handle: u32) -> Result<BlockInfo, HostError> {
        Ok(self.control(handle)?.head_block_info())
    }
}

/// Owns every chain session and the query selection.
pub struct ChainManager {
    sessions: BTreeMap<u32, ChainSession>,
    next_handle: u32,
    selected: Option<u32>,
}

impl ChainManager {
    pub fn new() -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_handle: 0,
            selected: None,
        }
    }

    /// Create a chain, optionally seeded from a snapshot file. The very
    /// first chain becomes the query selection.
    pub fn create(&mut self, snapshot_path: Option<&Path>) -> Result<u32, HostError> {
        let session = match snapshot_path {
            Some(path) => ChainSession::from_snapshot(path)?,
            None => ChainSession::from_genesis()?,
        };
        let handle = self.next_handle;
        self.next_handle += 1;
        self.sessions.insert(handle, session);
        if self.sessions.len() == 1 && self.selected.is_none() {
            self.selected = Some(handle);
        }
        tracing::debug!(handle, "created chain");
        Ok(handle)
    }

    /// Drop the whole session. Its temp directory is removed and its handle
    /// is never reissued.
    pub fn destroy(&mut self, handle: u32) -> Result<(), HostError> {
        if self.sessions.remove(&handle).is_none() {
            return Err(HostError::ChainNotFound(handle));
        }
        if self.selected == Some(handle) {
            self.selected = None;
        }
        tracing::debug!(handle, "destroyed chain");
        Ok(())
    }

    /// Release the controller but keep the slot and directory inspectable.
    pub fn shutdown(&mut self, handle: u32) -> Result<(), HostError> {
        let session = self.get(handle)?;
        if session.is_shut_down() {
            return Err(HostError::ChainShutDown(handle));
        }
        session.controller = None;
        tracing::debug!(handle, "shut down chain");
        Ok(())
    }

    /// Point table queries at this chain. Requires a live controller.
    pub fn select_for_queries(&mut self, handle: u32) -> Result<(), HostError> {
        let session = self.get(handle)?;
        if session.is_shut_down() {
            return Err(HostError::ChainShutDown(handle));
        }
        self.selected = Some(handle);
        Ok(())
    }

    /// Look up a session without requiring a live controller.
    pub fn get(&mut self, handle: u32) -> Result<&mut ChainSession, HostError> {
        self.sessions
            .get_mut(&handle)
            .ok_or(HostError::ChainNotFound(handle))
    }

    /// Look up a session's controller, failing if it was shut down.
    pub fn controller(&mut self, handle: u32) -> Result<&mut Controller, HostError> {
        self.get(handle)?.control(handle)
    }

    /// The controller of the currently selected chain.
    pub fn selected_controller(&mut self) -> Result<&mut Controller, HostError> {
        let handle = self.selected.ok_or(HostError::NoChainSelected)?;
        let session = self
            .sessions
            .get_mut(&handle)
            .ok_or(HostError::NoChainSelected)?;
        session.control(handle)
    }

    pub fn selected(&self) -> Option<u32> {
        self.selected
    }
}

impl Default for ChainManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_chain_is_auto_selected() {
        let mut mgr = ChainManager::new();
        let h = mgr.create(None).unwrap();
        assert_eq!(mgr.selected(), Some(h));
    }

    #[test]
    fn test_destroyed_handle_stays_dead_and_is_never_reissued() {
        let mut mgr = ChainManager::new();
        let a = mgr.create(None).unwrap();
        let b = mgr.create(None).unwrap();
        assert_ne!(a, b);

        mgr.destroy(b).unwrap();
        assert!(matches!(mgr.get(b), Err(HostError::ChainNotFound(_))));
        assert!(matches!(mgr.destroy(b), Err(HostError::ChainNotFound(_))));

        let c = mgr.create(None).unwrap();
        assert_ne!(c, b, "destroyed handle must not be reissued");
    }

    #[test]
    fn test_destroying_selected_chain_clears_selection() {
        let mut mgr = ChainManager::new();
        let a = mgr.create(None).unwrap();
        mgr.destroy(a).unwrap();
        assert!(matches!(
            mgr.selected_controller(),
            Err(HostError::NoChainSelected)
        ));
    }

    #[test]
    fn test_shutdown_keeps_slot_but_blocks_control() {
        let mut mgr = ChainManager::new();
        let h = mgr.create(None).unwrap();
        mgr.shutdown(h).unwrap();

        // Slot and directory still inspectable.
        assert!(mgr.get(h).unwrap().path().exists());

        // Control operations fail, and so does re-shutdown.
        assert!(matches!(
            mgr.controller(h),
            Err(HostError::ChainShutDown(_))
        ));
        assert!(matches!(mgr.shutdown(h), Err(HostError::ChainShutDown(_))));
        assert!(matches!(
            mgr.select_for_queries(h),
            Err(HostError::ChainShutDown(_))
        ));
    }

    #[test]
    fn test_selected_controller_requires_selection() {
        let mut mgr = ChainManager::new();
        assert!(matches!(
            mgr.selected_controller(),
            Err(HostError::NoChainSelected)
        ));

        let h = mgr.create(None).unwrap();
        mgr.select_for_queries(h).unwrap();
        assert!(mgr.selected_controller().is_ok());
    }

    #[test]
    fn test_session_block_production() {
        let mut mgr = ChainManager::new();
        let h = mgr.create(None).unwrap();

        let before = mgr.get(h).unwrap().head_block_info(h).unwrap().block_num;
        mgr.get(h).unwrap().finish_block(h).unwrap();
        let after = mgr.get(h).unwrap().head_block_info(h).unwrap().block_num;
        assert_eq!(after, before + 1);
    }
}
