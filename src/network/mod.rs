//! Network operations module
//!
//! Handles locking and entering the container network namespace

pub mod namespace;

/// Network namespace representation
#[derive(Debug, Clone)]
pub struct NetworkNamespace {
    pub path: String,
}

impl NetworkNamespace {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}
