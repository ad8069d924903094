//! Scopes/variables and watch panes over the generic tree cache.

use std::future::Future;

use ember_dap::types::{
    EvaluateArguments, EvaluateResponseBody, Scope, ScopesArguments, ScopesResponseBody, Variable,
    VariablesArguments, VariablesResponseBody,
};
use ember_dap::{DapClient, RequestError};

use crate::error::{decode_body, encode_args, EngineError, EngineResult};
use crate::tree::{ChildSource, TreeCache, TreeNode};

/// Child fetches backed by the adapter's `variables` request.
#[derive(Clone)]
pub struct AdapterVariables {
    client: DapClient,
}

impl AdapterVariables {
    pub fn new(client: DapClient) -> Self {
        AdapterVariables { client }
    }
}

impl ChildSource for AdapterVariables {
    fn children(
        &self,
        reference: i64,
    ) -> impl Future<Output = EngineResult<Vec<TreeNode>>> + Send {
        let client = self.client.clone();
        async move {
            let arguments = VariablesArguments {
                variables_reference: reference,
            };
            let body = client
                .request("variables", Some(encode_args("variables", &arguments)?))
                .await?;
            let body: VariablesResponseBody = decode_body("variables", body)?;
            Ok(body.variables.into_iter().map(variable_node).collect())
        }
    }
}

pub fn variable_node(variable: Variable) -> TreeNode {
    let mut value = variable.value;
    if let Some(type_) = variable.type_ {
        value = format!("{value}: {type_}");
    }
    TreeNode::branch(variable.variables_reference, variable.name, value)
}

fn scope_node(scope: Scope) -> TreeNode {
    TreeNode::branch(scope.variables_reference, scope.name, String::new())
}

/// The scopes pane for the current frame. Roots are the frame's scopes;
/// everything below is lazily fetched variables.
pub struct VariablesPane {
    source: AdapterVariables,
    cache: TreeCache,
}

impl VariablesPane {
    pub fn new(client: DapClient) -> Self {
        VariablesPane {
            source: AdapterVariables::new(client),
            cache: TreeCache::new(),
        }
    }

    pub fn roots(&self) -> &[TreeNode] {
        self.cache.roots()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Rebuild the pane for a newly selected frame, preserving which scopes
    /// and variables the user had open.
    pub async fn refresh(&mut self, frame_id: i64) -> EngineResult<()> {
        let arguments = ScopesArguments { frame_id };
        let body = self
            .source
            .client
            .request("scopes", Some(encode_args("scopes", &arguments)?))
            .await?;
        let body: ScopesResponseBody = decode_body("scopes", body)?;
        let roots = body.scopes.into_iter().map(scope_node).collect();
        self.cache.replace_roots(roots, &self.source).await
    }

    pub async fn toggle_at(&mut self, path: &[usize]) -> EngineResult<bool> {
        self.cache.toggle_at(path, &self.source).await
    }
}

/// User-authored watch expressions, re-evaluated against the current frame on
/// every stop. Root order is the user's, not the adapter's.
pub struct WatchPane {
    source: AdapterVariables,
    expressions: Vec<String>,
    cache: TreeCache,
}

impl WatchPane {
    pub fn new(client: DapClient) -> Self {
        WatchPane {
            source: AdapterVariables::new(client),
            expressions: Vec::new(),
            cache: TreeCache::new(),
        }
    }

    pub fn add(&mut self, expression: impl Into<String>) {
        self.expressions.push(expression.into());
    }

    pub fn remove(&mut self, index: usize) -> bool {
        if index < self.expressions.len() {
            self.expressions.remove(index);
            true
        } else {
            false
        }
    }

    pub fn expressions(&self) -> &[String] {
        &self.expressions
    }

    pub fn roots(&self) -> &[TreeNode] {
        self.cache.roots()
    }

    pub fn clear_results(&mut self) {
        self.cache.clear();
    }

    /// Re-evaluate every expression. An evaluation failure becomes the watch's
    /// displayed value rather than an error; only transport-level failures
    /// propagate.
    pub async fn refresh(&mut self, frame_id: Option<i64>) -> EngineResult<()> {
        let mut roots = Vec::with_capacity(self.expressions.len());
        for expression in &self.expressions {
            let arguments = EvaluateArguments {
                expression: expression.clone(),
                frame_id,
                context: Some("watch".to_string()),
            };
            let node = match self
                .source
                .client
                .request("evaluate", Some(encode_args("evaluate", &arguments)?))
                .await
            {
                Ok(body) => {
                    let body: EvaluateResponseBody = decode_body("evaluate", body)?;
                    TreeNode::branch(body.variables_reference, expression.clone(), body.result)
                }
                Err(RequestError::Failed(reason)) => {
                    TreeNode::leaf(expression.clone(), format!("<{reason}>"))
                }
                Err(err) => return Err(EngineError::Request(err)),
            };
            roots.push(node);
        }
        self.cache.replace_roots(roots, &self.source).await
    }

    pub async fn toggle_at(&mut self, path: &[usize]) -> EngineResult<bool> {
        self.cache.toggle_at(path, &self.source).await
    }
}
