use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::common::error::{FaceAuthError, Result};
use crate::core::types::{FaceTemplate, Identity, TEMPLATE_VERSION};
use crate::storage::atomic::write_atomically;

const TEMPLATE_EXTENSION: &str = "template";

/// Persistence for exactly one sealed template per identity.
pub trait TemplateStore: Send + Sync {
    /// Replace any template held for `template.identity`. The sealed triple
    /// changes together or not at all.
    fn upsert(&self, template: FaceTemplate) -> Result<()>;

    /// Every stored template, for the exhaustive login scan.
    fn all(&self) -> Result<Vec<FaceTemplate>>;

    fn get(&self, identity: &Identity) -> Result<Option<FaceTemplate>>;
}

/// One bincode file per identity under `data_dir`.
pub struct FileTemplateStore {
    data_dir: PathBuf,
}

impl FileTemplateStore {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;
        tracing::debug!("FileTemplateStore using {}", data_dir.display());
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn template_path(&self, identity: &Identity) -> PathBuf {
        self.data_dir.join(format!("{}.{}", identity, TEMPLATE_EXTENSION))
    }

    fn read_template(path: &Path) -> Result<FaceTemplate> {
        let data = fs::read(path)?;
        let template: FaceTemplate = bincode::deserialize(&data)
            .map_err(|e| FaceAuthError::Storage(format!("Failed to deserialize: {}", e)))?;

        if template.version > TEMPLATE_VERSION {
            return Err(FaceAuthError::Storage(format!(
                "unsupported template version {}", template.version
            )));
        }

        let expected = format!("{}.{}", template.identity, TEMPLATE_EXTENSION);
        if path.file_name().and_then(|n| n.to_str()) != Some(expected.as_str()) {
            return Err(FaceAuthError::Storage(format!(
                "template for {} stored under foreign file name", template.identity
            )));
        }

        Ok(template)
    }
}

impl TemplateStore for FileTemplateStore {
    fn upsert(&self, template: FaceTemplate) -> Result<()> {
        let path = self.template_path(&template.identity);
        let encoded = bincode::serialize(&template)
            .map_err(|e| FaceAuthError::Storage(format!("Failed to serialize: {}", e)))?;
        write_atomically(&path, &encoded)?;
        tracing::debug!("Stored template for {}", template.identity);
        Ok(())
    }

    fn all(&self) -> Result<Vec<FaceTemplate>> {
        let mut templates = Vec::new();

        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
                continue;
            }

            // One unreadable record must not take every login down with it.
            match Self::read_template(&path) {
                Ok(template) => templates.push(template),
                Err(e) => tracing::warn!("Skipping unreadable template {}: {}", path.display(), e),
            }
        }

        templates.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(templates)
    }

    fn get(&self, identity: &Identity) -> Result<Option<FaceTemplate>> {
        let path = self.template_path(identity);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_template(&path).map(Some)
    }
}

#[derive(Default)]
pub struct MemoryTemplateStore {
    templates: RwLock<BTreeMap<Identity, FaceTemplate>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        let templates = self
            .templates
            .read()
            .map_err(|_| FaceAuthError::Storage("template store lock poisoned".into()))?;
        Ok(templates.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn upsert(&self, template: FaceTemplate) -> Result<()> {
        let mut templates = self
            .templates
            .write()
            .map_err(|_| FaceAuthError::Storage("template store lock poisoned".into()))?;
        templates.insert(template.identity.clone(), template);
        Ok(())
    }

    fn all(&self) -> Result<Vec<FaceTemplate>> {
        let templates = self
            .templates
            .read()
            .map_err(|_| FaceAuthError::Storage("template store lock poisoned".into()))?;
        Ok(templates.values().cloned().collect())
    }

    fn get(&self, identity: &Identity) -> Result<Option<FaceTemplate>> {
        let templates = self
            .templates
            .read()
            .map_err(|_| FaceAuthError::Storage("template store lock poisoned".into()))?;
        Ok(templates.get(identity).cloned())
    }
}
