//! Data directory resolution shared by the engine binary and its tests

use crate::Result;
use std::path::PathBuf;

/// Resolve the engine's data directory.
///
/// Priority order:
/// 1. Command-line argument (`--data-dir`)
/// 2. Environment variable (`DATA_DIR`)
/// 3. Compiled default (`$HOME/.djprep`, falling back to `./djprep_data` if
///    the home directory cannot be determined)
pub fn resolve_data_dir(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    Ok(default_data_dir())
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|d| d.join(".djprep"))
        .unwrap_or_else(|| PathBuf::from("./djprep_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_arg_wins_over_everything() {
        std::env::remove_var("DJPREP_TEST_DATA_DIR");
        let resolved = resolve_data_dir(Some("/tmp/explicit"), "DJPREP_TEST_DATA_DIR").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/explicit"));
    }

    #[test]
    fn env_wins_when_no_cli_arg() {
        std::env::set_var("DJPREP_TEST_DATA_DIR_ENV", "/tmp/from-env");
        let resolved = resolve_data_dir(None, "DJPREP_TEST_DATA_DIR_ENV").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/from-env"));
        std::env::remove_var("DJPREP_TEST_DATA_DIR_ENV");
    }

    #[test]
    fn falls_back_to_default_when_nothing_set() {
        std::env::remove_var("DJPREP_TEST_DATA_DIR_NONE");
        let resolved = resolve_data_dir(None, "DJPREP_TEST_DATA_DIR_NONE").unwrap();
        assert!(resolved.ends_with(".djprep") || resolved.ends_with("djprep_data"));
    }
}
