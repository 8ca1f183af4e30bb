//! Pipeline stages for document-to-table extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the model behind [`llm`] can be swapped for a stub.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ blocks ──▶ postprocess
//! (sniff)   (pages)    (base64)  (VLM)   (JSON)     (cleanup)
//!   │
//!   └─(spreadsheet)──▶ spreadsheet
//! ```
//!
//! 1. [`input`]:  path, URL or bytes to a [`input::Document`] of known kind
//! 2. [`render`]: one PNG per page; pdfium runs in `spawn_blocking`
//! 3. [`encode`]: base64-wrap each page for the multimodal request body
//! 4. [`llm`]:    the model call, with [`retry`] and a per-attempt timeout;
//!    the only stage with network I/O
//! 5. [`blocks`]: longest list-of-objects block in the reply, parsed
//! 6. [`postprocess`]: whitespace and invisible-character cleanup
//!
//! Workbooks skip steps 2–6 and are read by [`spreadsheet`].

pub mod blocks;
pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
pub mod retry;
pub mod spreadsheet;
