//! Cooperative task spawning.
//!
//! Everything in this crate runs on one thread. Ports and target bindings
//! spawn short-lived tasks (message delivery, one task per incoming call)
//! through the [`Spawn`] trait; [`LocalRuntime`] wraps an
//! `edge_executor::LocalExecutor` and drives it with
//! `futures_lite::future::block_on`.
//!
//! ```text
//!  ┌─────────────────────────────────────────────────┐
//!  │  futures_lite::future::block_on                 │
//!  │  ┌───────────────────────────────────────────┐  │
//!  │  │  edge_executor::LocalExecutor             │  │
//!  │  │  ┌──────────┐ ┌──────────┐ ┌───────────┐  │  │
//!  │  │  │ delivery │ │ call #1  │ │ call #2   │  │  │
//!  │  │  └──────────┘ └──────────┘ └───────────┘  │  │
//!  │  └───────────────────────────────────────────┘  │
//!  └─────────────────────────────────────────────────┘
//! ```

use core::future::Future;
use std::rc::Rc;

use edge_executor::LocalExecutor;
use futures_lite::future::BoxedLocal;

/// Spawns `!Send` futures onto the current thread's executor.
pub trait Spawn {
    fn spawn_local(&self, future: BoxedLocal<()>);
}

/// Shared spawner handle.
pub type Spawner = Rc<dyn Spawn>;

impl<const C: usize> Spawn for LocalExecutor<'static, C> {
    fn spawn_local(&self, future: BoxedLocal<()>) {
        self.spawn(future).detach();
    }
}

/// Single-threaded executor plus a spawner handle onto it.
pub struct LocalRuntime {
    executor: Rc<LocalExecutor<'static>>,
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self {
            executor: Rc::new(LocalExecutor::new()),
        }
    }

    pub fn spawner(&self) -> Spawner {
        self.executor.clone()
    }

    /// Drive the executor until `future` completes.
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + 'static,
    {
        futures_lite::future::block_on(self.executor.run(future))
    }
}

impl Default for LocalRuntime {
    fn default() -> Self {
        Self::new()
    }
}
