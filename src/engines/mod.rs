// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod browser_session;
pub mod circuit_breaker;
pub mod download;
pub mod error_handler;
pub mod fetcher;
pub mod session_pool;
#[cfg(test)]
pub(crate) mod testing;
pub mod traits;
