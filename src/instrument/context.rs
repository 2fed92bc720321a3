// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Parent-context tracking for nested instrumented calls.
//!
//! Synchronous scopes push their `layer:name` identity onto a thread-local
//! stack. Async instrumentation carries it in a tokio task-local instead,
//! since a task can resume on any worker thread. The parent is a label only;
//! nothing is ever dereferenced through it.

use std::cell::RefCell;
use std::future::Future;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
    static ASYNC_PARENT: String;
}

/// Identity of the innermost instrumented call enclosing the caller.
pub fn current_parent() -> Option<String> {
    CONTEXT_STACK
        .with(|stack| stack.borrow().last().cloned())
        .or_else(|| ASYNC_PARENT.try_with(|parent| parent.clone()).ok())
}

/// Depth of the synchronous stack on this thread.
pub fn depth() -> usize {
    CONTEXT_STACK.with(|stack| stack.borrow().len())
}

pub(crate) fn push(identity: &str) {
    CONTEXT_STACK.with(|stack| stack.borrow_mut().push(identity.to_string()));
}

/// Remove the innermost entry matching `identity`.
pub(crate) fn pop(identity: &str) {
    CONTEXT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(pos) = stack.iter().rposition(|entry| entry == identity) {
            stack.remove(pos);
        }
    });
}

/// Run `future` with `identity` as the parent of every call inside it.
pub(crate) async fn with_async_parent<F: Future>(identity: String, future: F) -> F::Output {
    ASYNC_PARENT.scope(identity, future).await
}
