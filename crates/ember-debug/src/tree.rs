//! Generic lazy tree cache.
//!
//! Backs the scopes/variables pane, the watch pane and the thread/frame pane.
//! Children are fetched on demand through a [`ChildSource`] and the cache
//! reconciles a fresh top-level fetch against the previous tree so the user's
//! drill-down state survives each stop.

use std::future::Future;

use async_recursion::async_recursion;

use crate::error::EngineResult;

/// One row of a lazily loaded tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// Adapter-assigned reference used to fetch children; 0 marks a leaf.
    pub reference: i64,
    pub label: String,
    pub value: String,
    /// Survives reconciliation even while `children` is discarded.
    pub expanded: bool,
    /// `None` means collapsed or not yet fetched; `Some` means loaded.
    pub children: Option<Vec<TreeNode>>,
}

impl TreeNode {
    pub fn leaf(label: impl Into<String>, value: impl Into<String>) -> Self {
        TreeNode::branch(0, label, value)
    }

    pub fn branch(reference: i64, label: impl Into<String>, value: impl Into<String>) -> Self {
        TreeNode {
            reference,
            label: label.into(),
            value: value.into(),
            expanded: false,
            children: None,
        }
    }

    pub fn is_expandable(&self) -> bool {
        self.reference != 0
    }
}

/// Fetches the children behind a node reference.
pub trait ChildSource: Sync {
    fn children(&self, reference: i64)
        -> impl Future<Output = EngineResult<Vec<TreeNode>>> + Send;
}

/// Expand a node, fetching its children if they are not already loaded.
/// A no-op for leaves.
pub async fn load<S: ChildSource>(node: &mut TreeNode, source: &S) -> EngineResult<()> {
    if !node.is_expandable() {
        return Ok(());
    }
    if node.children.is_none() {
        node.children = Some(source.children(node.reference).await?);
    }
    node.expanded = true;
    Ok(())
}

/// Copy expansion state from `previous` onto a freshly fetched `node` and
/// re-load the subtrees the user had open. Only previously expanded nodes are
/// descended into; nothing is fetched speculatively. Children that arrive
/// pre-populated (for example the stopped thread's frames) are kept as-is.
#[async_recursion]
pub async fn reconcile<S: ChildSource>(
    node: &mut TreeNode,
    previous: Option<&TreeNode>,
    source: &S,
) -> EngineResult<()> {
    let Some(previous) = previous else {
        return Ok(());
    };
    if !(previous.expanded && node.is_expandable()) {
        return Ok(());
    }
    load(node, source).await?;

    let old_children = previous.children.as_deref().unwrap_or(&[]);
    if let Some(children) = node.children.as_mut() {
        for (index, child) in children.iter_mut().enumerate() {
            // Positional match with a label check; anything that moved or was
            // renamed defaults back to collapsed.
            let old = old_children
                .get(index)
                .filter(|old| old.label == child.label);
            reconcile(child, old, source).await?;
        }
    }
    Ok(())
}

/// An ordered forest of lazily loaded roots.
#[derive(Debug, Default)]
pub struct TreeCache {
    roots: Vec<TreeNode>,
}

impl TreeCache {
    pub fn new() -> Self {
        TreeCache::default()
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn clear(&mut self) {
        self.roots.clear();
    }

    /// Install a freshly fetched root list, carrying over expansion state from
    /// the previous tree and re-loading everything the user had open.
    pub async fn replace_roots<S: ChildSource>(
        &mut self,
        new_roots: Vec<TreeNode>,
        source: &S,
    ) -> EngineResult<()> {
        let old_roots = std::mem::replace(&mut self.roots, new_roots);
        for (index, root) in self.roots.iter_mut().enumerate() {
            let old = old_roots.get(index).filter(|old| old.label == root.label);
            reconcile(root, old, source).await?;
        }
        Ok(())
    }

    /// Expand or collapse the node at an index path. Collapsing discards the
    /// loaded children without a request; expanding fetches them.
    pub async fn toggle_at<S: ChildSource>(
        &mut self,
        path: &[usize],
        source: &S,
    ) -> EngineResult<bool> {
        let Some(node) = node_at_mut(&mut self.roots, path) else {
            return Ok(false);
        };
        if node.expanded {
            node.expanded = false;
            node.children = None;
        } else {
            load(node, source).await?;
        }
        Ok(true)
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&TreeNode> {
        let (&first, rest) = path.split_first()?;
        let mut node = self.roots.get(first)?;
        for &index in rest {
            node = node.children.as_ref()?.get(index)?;
        }
        Some(node)
    }
}

fn node_at_mut<'a>(roots: &'a mut [TreeNode], path: &[usize]) -> Option<&'a mut TreeNode> {
    let (&first, rest) = path.split_first()?;
    let mut node = roots.get_mut(first)?;
    for &index in rest {
        node = node.children.as_mut()?.get_mut(index)?;
    }
    Some(node)
}
