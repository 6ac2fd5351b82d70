//! Environment-driven configuration read once at [`crate::host::Host`]
//! construction (spec §6). The teacher's binary reads no environment
//! variables of its own; this is sourced directly from the spec's env-var
//! table and `original_source/src/host.c`'s `log_set_level_env()` call,
//! which performs the equivalent read at the start of `dvz_host`.

use crate::host::Backend;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_backend_override: Option<Backend>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let default_backend_override = match std::env::var("DVZ_DEFAULT_BACKEND") {
            Ok(value) if value.eq_ignore_ascii_case("offscreen") => Some(Backend::Offscreen),
            _ => None,
        };
        Self { default_backend_override }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_env_var_means_no_override() {
        std::env::remove_var("DVZ_DEFAULT_BACKEND");
        let cfg = EngineConfig::from_env();
        assert!(cfg.default_backend_override.is_none());
    }
}
