//! The static asset list pre-cached on install.

use serde::{Deserialize, Serialize};

/// Icon resolutions shipped with the app.
const ICON_SIZES: [u32; 8] = [72, 96, 128, 144, 152, 192, 384, 512];

/// Ordered list of asset paths, relative to the worker scope.
///
/// Changing the list requires bumping the cache name, otherwise existing
/// installs never see the new assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    assets: Vec<String>,
}

impl Manifest {
    pub fn new(assets: Vec<String>) -> Self {
        Self { assets }
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Shell document, app descriptor, the worker script itself, then icons.
pub fn default_assets() -> Vec<String> {
    let mut assets = vec![
        "./index.html".to_string(),
        "./manifest.json".to_string(),
        "./service-worker.js".to_string(),
    ];
    assets.extend(ICON_SIZES.iter().map(|s| format!("./icons/icon-{s}x{s}.png")));
    assets
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(default_assets())
    }
}
