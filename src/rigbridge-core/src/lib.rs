// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod rig;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use rig::adapter::RadioAdapter;
pub use rig::mode::{NativeMode, RigMode};
pub use rig::response::{RadioError, RadioResult};
pub use rig::state::RadioSnapshot;
pub use rig::{LinkEvent, LinkState, RadioLink, RigSelector, Vfo};
