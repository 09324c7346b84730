// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: opening and validating documents, embedded image
// recompression, optimised serialisation and sample generation.

pub mod images;
pub mod optimize;
pub mod reader;
pub mod samples;

pub use optimize::SaveOptions;
pub use reader::PdfDocument;
pub use samples::SampleWriter;
