//! redb table definitions for the Forgeline state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Version keys zero-pad the version number so lexical key order
//! matches numeric version order.

use redb::TableDefinition;

/// Blueprint versions keyed by `{blueprint_id}:{version:010}`.
pub const VERSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("versions");

/// Factory bindings keyed by `{factory_id}`.
pub const BINDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("bindings");

/// Append-only audit log keyed by `{seq:020}`.
pub const AUDIT: TableDefinition<&str, &[u8]> = TableDefinition::new("audit");
