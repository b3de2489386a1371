// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # assembly-publicizer
//!
//! Makes every type, method and field of a .NET assembly public, and records what each
//! element was before as a `RuntimeVisibilityAttribute` custom attribute. The result can be
//! referenced from other projects as if all of its internals were part of the public API,
//! while the original visibility stays recoverable.
//!
//! Metadata parsing, editing and PE regeneration are done by [`dotscope`]. This crate adds the
//! traversal, the provenance marker, and the load/save boundary with stable exit codes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use assembly_publicizer::{boundary, layout::ModuleLayout, marker, publicize};
//! use std::path::Path;
//!
//! let input = Path::new("Assembly-CSharp.dll");
//! let mut assembly = boundary::load(input)?;
//!
//! // Snapshot first, so the injected marker type is never visited
//! let layout = ModuleLayout::from_view(assembly.view())?;
//! let ctor = marker::ensure_marker(&mut assembly, &layout)?;
//! let report = publicize::publicize(&layout, &ctor, &mut assembly)?;
//! println!("{} types, {} methods, {} fields", report.types, report.methods, report.fields);
//!
//! let output = boundary::resolve_output_path(input, boundary::DEFAULT_OUTPUT_DIR);
//! boundary::save(&mut assembly, &output)?;
//! # Ok::<(), assembly_publicizer::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`access`] - member accessibility and type visibility levels with their flag encodings
//! - [`layout`] - read-only snapshot of types and their member ranges
//! - [`marker`] - marker type injection (get-or-create), value blob codec, marker audit
//! - [`publicize`] - the widening traversal over the [`publicize::MetadataEditor`] seam
//! - [`boundary`] - load, save and output path resolution
//! - [`Error`] and [`Result`] - error handling and process exit codes
//!
//! ## Auditing a publicized assembly
//!
//! ```rust,no_run
//! use assembly_publicizer::marker::read_markers;
//! use dotscope::CilAssemblyView;
//! use std::path::Path;
//!
//! let view = CilAssemblyView::from_path(Path::new("publicized_assemblies/Game_publicized.dll"))?;
//! for record in read_markers(&view)? {
//!     println!("{:?} was {}", record.target, record.original);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod access;
pub mod boundary;
pub(crate) mod error;
pub mod layout;
pub mod marker;
pub mod publicize;

pub use error::{
    Error, EXIT_INPUT_NOT_FOUND, EXIT_INVALID_ASSEMBLY, EXIT_METADATA, EXIT_OUTPUT_UNWRITABLE,
};

/// `assembly_publicizer` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
