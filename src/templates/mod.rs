//! Embedded files synced into the sandbox during provisioning.

/// Codex CLI configuration template. `${GOOGLE_API_KEY}` is replaced
/// with the real key before the file is copied in.
pub(crate) const CODEX_CONFIG: &str = include_str!("config.toml");

/// Agent instructions copied to the workspace root.
pub(crate) const AGENTS_MD: &str = include_str!("agents.md");
