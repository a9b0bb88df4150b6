//! Appshelf - library manager for Steam unlock tooling
//!
//! Builds one catalog out of three sources: SteamTools lua descriptors,
//! GreenLuma AppList slots and the games the Steam client has installed.
//! The catalog can be filtered, searched and sorted, enriched with icons in
//! the background, and grown or shrunk through install/uninstall workflows.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Library                                  │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │   Catalog   │  │    View     │  │   Icon enrichment       │  │
//! │  │   builder   │  │ projection  │  │ (bounded, background)   │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!         │                 │                 │
//!         ▼                 ▼                 ▼
//!   ┌────────────┐   ┌─────────────┐   ┌─────────────┐
//!   │  Services  │   │   AppList   │   │  Install /  │
//!   │ (lua, acf, │   │    slots    │   │  uninstall  │
//!   │  network)  │   │  (max 128)  │   │  workflows  │
//!   └────────────┘   └─────────────┘   └─────────────┘
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod downloads;
pub mod error;
pub mod keyvalues;
pub mod library;
pub mod services;
pub mod slots;
pub mod storage;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, CatalogItem, ItemKind};
pub use config::{Settings, ToolMode};
pub use error::{LibraryError, Result};
pub use library::{Library, LibraryCommand};
pub use services::Services;
pub use slots::{APPLIST_CAPACITY, AppList};
pub use storage::ShelfStorage;
pub use workflow::{InstallState, Installer};
