// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience primitives: adapter-level retry and the per-call
//! cancellation/timeout guard used by the repository.

pub mod guard;
pub mod retry;

pub use guard::guard;
pub use retry::{retry, RetryConfig};
