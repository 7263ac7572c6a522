//! Named agent instances the CLI can talk to

use serde::Deserialize;
use std::path::Path;

/// One agent server
#[derive(Debug, Clone, Deserialize)]
pub struct Instance {
    pub name: String,
    pub port: u16,
    pub model: String,
    #[serde(default)]
    pub description: String,
}

impl Instance {
    fn new(name: &str, port: u16, model: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            port,
            model: model.to_string(),
            description: description.to_string(),
        }
    }

    pub fn url(&self, host: &str) -> String {
        format!("http://{}:{}", host, self.port)
    }
}

/// Ordered set of instances
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceRegistry {
    #[serde(rename = "instance")]
    instances: Vec<Instance>,
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self {
            instances: vec![
                Instance::new("general", 5001, "Phi-3 Mini 4K", "Fast general tasks and questions"),
                Instance::new("coding", 5002, "Mistral-7B", "Programming and development tasks"),
                Instance::new("chat", 5003, "Llama-3 8B", "Conversations and creative writing"),
            ],
        }
    }
}

impl InstanceRegistry {
    /// Load `[[instance]]` tables from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read instances file: {}", path.display()))?;
        let registry: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse instances file: {}", path.display()))?;

        anyhow::ensure!(
            !registry.instances.is_empty(),
            "No instances defined in {}",
            path.display()
        );
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.name.as_str()).collect()
    }

    /// First instance, used as the interactive default
    pub fn first(&self) -> Option<&Instance> {
        self.instances.first()
    }
}
