pub const LOCALHOST: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

pub const DEFAULT_FORKS: u32 = 5;

/// Prefix used for environment variable overrides of config keys.
pub const ENV_PREFIX: &str = "CONVERGE_";

pub const CONFIG_FILE_NAME: &str = "converge.yaml";

/// Suffix of files staged next to their destination before being moved into place.
pub const STAGING_SUFFIX: &str = ".converge-tmp";

pub const DEFAULT_BECOME_USER: &str = "root";
