// SPDX-License-Identifier: MIT

pub mod embedding;
pub mod error;
pub mod history;
pub mod model;
