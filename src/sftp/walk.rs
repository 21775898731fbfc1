//! Depth-first remote directory walker
//!
//! Visits the root first, then each directory's children sorted by name, a
//! directory always before its contents. A failed step is reported once and
//! the walker keeps its stack, so callers decide whether to stop.

use tracing::debug;

use super::error::TransportError;
use super::path_utils::join_remote_path;
use super::remote::RemoteSession;
use super::types::RemoteFileEntry;

pub struct Walker<'a, S: RemoteSession> {
    session: &'a S,
    root: Option<String>,
    stack: Vec<RemoteFileEntry>,
    /// Directory whose children are read on the next step
    pending_dir: Option<String>,
}

impl<'a, S: RemoteSession> Walker<'a, S> {
    pub fn new(session: &'a S, root: &str) -> Self {
        Self {
            session,
            root: Some(root.to_string()),
            stack: Vec::new(),
            pending_dir: None,
        }
    }

    /// Advance to the next entry
    ///
    /// Returns `None` once the tree is exhausted.
    pub async fn step(&mut self) -> Option<Result<RemoteFileEntry, TransportError>> {
        if let Some(root) = self.root.take() {
            let stat = self.session.stat(&root).await;
            let entry = stat.map(|mut entry| {
                entry.path = root;
                entry
            });
            return Some(self.visit(entry));
        }

        if let Some(dir) = self.pending_dir.take() {
            match self.session.read_dir(&dir).await {
                Ok(mut children) => {
                    children.sort_by(|a, b| a.name.cmp(&b.name));
                    debug!("Walker descending into {} ({} entries)", dir, children.len());
                    for mut child in children.into_iter().rev() {
                        child.path = join_remote_path(&dir, &child.name);
                        self.stack.push(child);
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }

        let next = self.stack.pop()?;
        Some(self.visit(Ok(next)))
    }

    fn visit(
        &mut self,
        entry: Result<RemoteFileEntry, TransportError>,
    ) -> Result<RemoteFileEntry, TransportError> {
        if let Ok(ref e) = entry {
            if e.is_dir() {
                self.pending_dir = Some(e.path.clone());
            }
        }
        entry
    }

    /// Do not descend into the directory returned by the last step
    pub fn skip_dir(&mut self) {
        self.pending_dir = None;
    }
}
