//! Stub implementations when the statement backend is not compiled

use super::StatementBackend;
use std::sync::Arc;

#[inline]
pub fn checkpoint(_file: &'static str, _line: u32) {}

pub fn default_backend() -> Option<Arc<dyn StatementBackend>> {
    None
}
