//! Shared fixtures for the integration tests: minimal project templates and
//! harness settings pointing at temporary directories.

#![allow(dead_code)]

use adderkit::models::HarnessSettings;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A typed kit application.
pub fn kit_template(root: &Path) {
    write(
        root,
        "package.json",
        r#"{
	"name": "kit-ts",
	"private": true,
	"type": "module",
	"scripts": {
		"dev": "vite dev",
		"build": "vite build"
	},
	"devDependencies": {
		"@sveltejs/adapter-auto": "^3.0.0",
		"@sveltejs/kit": "^2.0.0",
		"@sveltejs/vite-plugin-svelte": "^4.0.0",
		"svelte": "^5.0.0",
		"typescript": "^5.0.0",
		"vite": "^5.0.3"
	}
}
"#,
    );
    write(root, "tsconfig.json", "{\n\t\"extends\": \"./.svelte-kit/tsconfig.json\"\n}\n");
    write(
        root,
        "vite.config.ts",
        "import { sveltekit } from '@sveltejs/kit/vite';\nimport { defineConfig } from 'vite';\n\nexport default defineConfig({\n\tplugins: [sveltekit()]\n});\n",
    );
    write(root, "src/routes/+page.svelte", "<h1>Welcome to SvelteKit</h1>\n");
}

/// A typed component project without kit.
pub fn svelte_template(root: &Path) {
    write(
        root,
        "package.json",
        r#"{
  "name": "svelte-ts",
  "private": true,
  "type": "module",
  "devDependencies": {
    "@sveltejs/vite-plugin-svelte": "^4.0.0",
    "svelte": "^5.0.0",
    "typescript": "^5.0.0",
    "vite": "^5.0.3"
  }
}
"#,
    );
    write(root, "tsconfig.json", "{}\n");
    write(
        root,
        "vite.config.ts",
        "import { defineConfig } from 'vite'\nimport { svelte } from '@sveltejs/vite-plugin-svelte'\n\n// https://vite.dev/config/\nexport default defineConfig({\n  plugins: [svelte()],\n})\n",
    );
    write(root, "src/App.svelte", "<main>Hello</main>\n");
}

/// Settings for a harness rooted at `root`, with `templates/`, `_snapshots/`
/// and `services/` below it. Commands default to no-ops.
pub fn settings(root: &Path) -> HarnessSettings {
    HarnessSettings {
        templates_dir: root.join("templates"),
        snapshots_dir: root.join("_snapshots"),
        services_dir: root.join("services"),
        concurrency: 4,
        scenario_timeout: Duration::from_secs(30),
        hook_timeout: Duration::from_secs(30),
        ready_timeout: Duration::from_secs(5),
        install_command: vec!["true".to_string()],
        dev_command: vec!["true".to_string()],
    }
}
