// SPDX-License-Identifier: MIT OR Apache-2.0

mod source;

pub use source::EntitySource;
