//! Radix-tree route table.
//!
//! One tree per method. O(path-length) lookup. Registration errors are
//! returned, not panicked on, because routes come from host configuration.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::error::Error;
use crate::handler::BoxedNativeHandler;
use crate::method::Method;

#[derive(Default)]
pub(crate) struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedNativeHandler>>,
    len: usize,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Both `{id}` and `:id` segment syntax are accepted.
    pub(crate) fn add(&mut self, method: Method, path: &str, handler: BoxedNativeHandler) -> Result<(), Error> {
        let normalized = normalize(path);
        self.routes
            .entry(method)
            .or_default()
            .insert(normalized, handler)
            .map_err(|e| Error::InvalidRoute { path: path.to_owned(), reason: e.to_string() })?;
        self.len += 1;
        Ok(())
    }

    pub(crate) fn lookup(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(BoxedNativeHandler, Vec<(String, String)>)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

/// Rewrites `:name` segments to matchit's `{name}` form.
fn normalize(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => format!("{{{name}}}"),
            _ => segment.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("/")
}
