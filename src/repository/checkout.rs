//! Engine built inside a source checkout.

use super::ENGINE_BINARY;
use crate::git;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Version uid used when the checkout's revision cannot be determined.
pub const UNKNOWN_VERSION: &str = "unknown";

/// A launcher running from a source checkout.
#[derive(Debug)]
pub struct CheckoutRepository {
    root: PathBuf,
}

impl CheckoutRepository {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Revision of the checkout, with `-dirty` appended for local changes.
    pub fn version_uid(&self) -> String {
        let head = match git::head_commit(&self.root) {
            Ok(head) => head,
            Err(e) => {
                warn!("failed to determine checkout revision: {}", e);
                return UNKNOWN_VERSION.to_string();
            }
        };

        match git::is_dirty(&self.root) {
            Ok(true) => format!("{}-dirty", head),
            Ok(false) => head,
            Err(e) => {
                debug!("failed to check checkout for local changes: {}", e);
                head
            }
        }
    }

    pub fn engine_path(&self) -> PathBuf {
        self.root().join("bin").join(ENGINE_BINARY)
    }
}
