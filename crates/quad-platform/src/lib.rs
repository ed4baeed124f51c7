// SPDX-License-Identifier: CEPL-1.0
//! Windowing lives behind this crate so every consumer agrees on one winit.
pub use winit;
