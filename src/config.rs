//! Boot-argument switches.

use log::LevelFilter;

pub const BOOT_ARG_DISABLE: &str = "-nredoff";
pub const BOOT_ARG_DEBUG: &str = "-nreddbg";
pub const BOOT_ARG_NO_DYLD: &str = "-nrednodyld";

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Config {
    /// Leave every module untouched.
    pub disabled: bool,
    pub debug: bool,
    /// Patch userspace bundles as their pages are validated.
    pub dyld_patches: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            disabled: false,
            debug: false,
            dyld_patches: true,
        }
    }
}

impl Config {
    /// Parse a whitespace separated boot-args string. Arguments we do not own are ignored.
    pub fn from_boot_args(boot_args: &str) -> Self {
        let mut config = Self::default();
        for arg in boot_args.split_whitespace() {
            match arg {
                BOOT_ARG_DISABLE => config.disabled = true,
                BOOT_ARG_DEBUG => config.debug = true,
                BOOT_ARG_NO_DYLD => config.dyld_patches = false,
                _ => {}
            }
        }
        config
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }

    /// Raise or lower the global log filter to match `debug`.
    pub fn apply_log_level(&self) {
        log::set_max_level(self.log_level());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_boot_args_enable_everything() {
        let config = Config::from_boot_args("");
        assert_eq!(config, Config::default());
        assert!(!config.disabled);
        assert!(config.dyld_patches);
        assert_eq!(config.log_level(), LevelFilter::Info);
    }

    #[test]
    fn switches_are_picked_out_of_foreign_args() {
        let config = Config::from_boot_args("keepsyms=1 -v -nreddbg debug=0x100 -nrednodyld");
        assert!(config.debug);
        assert!(!config.dyld_patches);
        assert!(!config.disabled);
        assert_eq!(config.log_level(), LevelFilter::Debug);
    }

    #[test]
    fn disable_switch() {
        assert!(Config::from_boot_args("-nredoff").disabled);
        assert!(!Config::from_boot_args("-nredoffx").disabled);
    }
}
