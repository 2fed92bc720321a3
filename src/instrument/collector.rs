// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Instrumentation entry points.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;

use crate::record::bounded_payload;
use crate::store::RecordSink;

use super::context;
use super::sampler::ResourceSampler;
use super::scope::ExecutionScope;

/// Wraps callables so that every invocation produces one execution record.
///
/// Cheap to clone; clones share the sink and sampler. Instrumentation never
/// changes what the wrapped callable returns: a failed record write is
/// logged and swallowed, errors are returned unchanged, and panics resume
/// after being recorded.
#[derive(Clone)]
pub struct Collector {
    sink: Arc<dyn RecordSink>,
    sampler: Arc<ResourceSampler>,
}

impl Collector {
    /// Collector sampling the current process.
    pub fn new(sink: Arc<dyn RecordSink>) -> Self {
        Self {
            sink,
            sampler: Arc::new(ResourceSampler::new()),
        }
    }

    pub fn with_sampler(mut self, sampler: ResourceSampler) -> Self {
        self.sampler = Arc::new(sampler);
        self
    }

    /// Open a scope that is the parent of nested calls on this thread.
    ///
    /// Do not hold the returned scope across an `.await`; use
    /// [`begin_detached`](Self::begin_detached) or
    /// [`instrument_async`](Self::instrument_async) in async code.
    pub fn begin(&self, layer: &str, name: &str) -> ExecutionScope {
        ExecutionScope::start(self.sink.clone(), self.sampler.clone(), layer, name, true)
    }

    /// Open a scope that does not become the thread's current parent.
    pub fn begin_detached(&self, layer: &str, name: &str) -> ExecutionScope {
        ExecutionScope::start(self.sink.clone(), self.sampler.clone(), layer, name, false)
    }

    /// Invoke a fallible closure under instrumentation.
    pub fn call<A, T, E, F>(&self, layer: &str, name: &str, args: &A, f: F) -> Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Serialize,
        E: Display,
        F: FnOnce() -> Result<T, E>,
    {
        let scope = self.begin(layer, name).with_args(args);
        run_scoped(scope, f)
    }

    /// Invoke an infallible closure under instrumentation.
    pub fn measure<A, T, F>(&self, layer: &str, name: &str, args: &A, f: F) -> T
    where
        A: Serialize + ?Sized,
        T: Serialize,
        F: FnOnce() -> T,
    {
        let scope = self.begin(layer, name).with_args(args);
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => {
                let _ = scope.finish_ok(&value);
                value
            }
            Err(payload) => {
                let _ = scope.finish_err(panic_message(payload.as_ref()));
                panic::resume_unwind(payload)
            }
        }
    }

    /// Produce an instrumented callable with the same signature as `f`.
    pub fn wrap<A, T, E, F>(
        &self,
        layer: impl Into<String>,
        name: impl Into<String>,
        f: F,
    ) -> impl Fn(A) -> Result<T, E>
    where
        A: Serialize,
        T: Serialize,
        E: Display,
        F: Fn(A) -> Result<T, E>,
    {
        let collector = self.clone();
        let layer = layer.into();
        let name = name.into();
        move |args: A| {
            let request = bounded_payload("args", &args);
            let scope = collector.begin(&layer, &name).with_request(request);
            run_scoped(scope, || f(args))
        }
    }

    /// Await a fallible future under instrumentation.
    ///
    /// Calls made inside the future see this component as their parent. If
    /// the future is dropped before completing, an error record is written.
    pub async fn instrument_async<A, T, E, F>(
        &self,
        layer: &str,
        name: &str,
        args: &A,
        future: F,
    ) -> Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Serialize,
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        let scope = self.begin_detached(layer, name).with_args(args);
        let identity = scope.identity().to_string();
        let result = context::with_async_parent(identity, future).await;
        let _ = match &result {
            Ok(value) => scope.finish_ok(value),
            Err(e) => scope.finish_err(e.to_string()),
        };
        result
    }
}

fn run_scoped<T, E, F>(scope: ExecutionScope, f: F) -> Result<T, E>
where
    T: Serialize,
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => {
            let _ = match &result {
                Ok(value) => scope.finish_ok(value),
                Err(e) => scope.finish_err(e.to_string()),
            };
            result
        }
        Err(payload) => {
            let _ = scope.finish_err(panic_message(payload.as_ref()));
            panic::resume_unwind(payload)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("panicked: {}", detail),
        None => "panicked".to_string(),
    }
}
