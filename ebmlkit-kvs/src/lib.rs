// ebmlkit
// Copyright (c) 2026 The ebmlkit Developers.
//
// This Source Code Form is subject to the terms of the MIT License. If a copy
// of the MIT License was not distributed with this file, you can obtain one at
// https://opensource.org/license/mit/.

pub mod consumer;
pub mod fragment;
pub mod wav;

pub use crate::consumer::{Fragment, FragmentConsumer, FragmentContext, FragmentSink, StopHandle};
pub use crate::fragment::TagValue;
pub use crate::wav::WavSpec;
