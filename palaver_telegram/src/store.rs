use std::path::{Path, PathBuf};

use anyhow::Context;
use palaver_conversation::{LabelStore, Labels};

/// Tenant labels kept in one JSON object, chat id to name.
#[derive(Debug, Clone)]
pub struct JsonFileLabelStore {
    path: PathBuf,
}

impl JsonFileLabelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LabelStore for JsonFileLabelStore {
    fn load(&self) -> anyhow::Result<Labels> {
        if !self.path.exists() {
            return Ok(Labels::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", self.path.display()))
    }

    fn save(&self, labels: &Labels) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(labels)?)
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
