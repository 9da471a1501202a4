// src/constants.rs

/// The name of the harness configuration file looked up in the current directory.
pub const HARNESS_CONFIG_FILENAME: &str = "adderkit.toml";

/// The dependency manifest of a target project.
pub const MANIFEST_FILENAME: &str = "package.json";

/// Label used for an option set that only carries default values.
pub const DEFAULT_OPTIONS_LABEL: &str = "default";

/// Placeholder substituted with the scenario's port in dev-server arguments.
pub const PORT_PLACEHOLDER: &str = "{port}";

/// Entries never copied into a scenario project nor compared in snapshots.
pub const IGNORED_TREE_ENTRIES: &[&str] = &[
    "node_modules",
    ".svelte-kit",
    ".git",
    "pnpm-lock.yaml",
    "package-lock.json",
    "yarn.lock",
    "bun.lockb",
];

/// Environment variable that enables tests requiring network, docker and a package manager.
pub const E2E_ENV_FLAG: &str = "ADDERKIT_RUN_E2E";
