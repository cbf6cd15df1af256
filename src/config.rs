use std::{net::SocketAddr, path::PathBuf};

pub const DEFAULT_MODEL_PATH: &str = "best_accident_severity_model.json";
pub const PORT: u16 = 8000;

/// Startup settings, read once from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub model_path: PathBuf,
    /// Sidecar meta for TorchScript modules.
    pub meta_path: Option<PathBuf>,
    pub bind_addr: SocketAddr,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            model_path: get("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            meta_path: get("META_PATH").map(PathBuf::from),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], PORT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let c = cfg(&[]);
        assert_eq!(c.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
        assert_eq!(c.meta_path, None);
        assert_eq!(c.bind_addr.to_string(), "0.0.0.0:8000");
    }

    #[test]
    fn model_path_from_env() {
        let c = cfg(&[("MODEL_PATH", "/srv/models/rf.json"), ("META_PATH", "/srv/m.json")]);
        assert_eq!(c.model_path, PathBuf::from("/srv/models/rf.json"));
        assert_eq!(c.meta_path, Some(PathBuf::from("/srv/m.json")));
    }

    #[test]
    fn empty_value_counts_as_unset() {
        let c = cfg(&[("MODEL_PATH", "  ")]);
        assert_eq!(c.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
    }
}
