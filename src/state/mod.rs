/// State management module
///
/// This module handles all application state, including:
/// - The comic/page/library data model (data.rs)
/// - Saving and loading the library file (catalog.rs)
/// - The command surface driven by the UI (manager.rs)
/// - The background worker that serializes those commands (actor.rs)
/// - Pages decoded on demand (cache.rs)

pub mod actor;
pub mod cache;
pub mod catalog;
pub mod data;
pub mod error;
pub mod manager;
