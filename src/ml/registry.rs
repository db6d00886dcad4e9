//! Model Registry
//! Loads and serves handles to the five predictor artifacts. Every artifact
//! is optional; consumers get `None` and fall back deterministically.

use super::artifact::{
    ClassifierArtifact, ExplainerArtifact, ScalerArtifact, ScoreArtifact, SequenceArtifact,
};
use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorKind {
    Difficulty,
    Sequence,
    Health,
    Explainer,
    Scaler,
}

impl PredictorKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Difficulty => "difficulty.json",
            Self::Sequence => "sequence.json",
            Self::Health => "health.json",
            Self::Explainer => "explainer.json",
            Self::Scaler => "scaler.json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Difficulty => "difficulty",
            Self::Sequence => "sequence",
            Self::Health => "health",
            Self::Explainer => "explainer",
            Self::Scaler => "scaler",
        }
    }
}

#[derive(Default)]
struct Artifacts {
    difficulty: Option<Arc<ScoreArtifact>>,
    sequence: Option<Arc<SequenceArtifact>>,
    health: Option<Arc<ClassifierArtifact>>,
    explainer: Option<Arc<ExplainerArtifact>>,
    scaler: Option<Arc<ScalerArtifact>>,
}

/// Read-mostly after startup; mutated only by a controlled (re)load.
pub struct ModelRegistry {
    models_dir: PathBuf,
    artifacts: RwLock<Artifacts>,
    ready: AtomicBool,
    load_lock: tokio::sync::Mutex<()>,
}

fn load_file<T: DeserializeOwned>(path: &Path, kind: PredictorKind) -> Option<T> {
    if !path.exists() {
        warn!("⚠️  {} artifact not found: {}", kind.as_str(), path.display());
        return None;
    }
    let load = || -> Result<T> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    };
    match load() {
        Ok(artifact) => {
            info!("✅ Loaded {} artifact from {}", kind.as_str(), path.display());
            Some(artifact)
        }
        Err(e) => {
            warn!("⚠️  Failed to load {} artifact: {e:#}", kind.as_str());
            None
        }
    }
}

impl ModelRegistry {
    pub fn new(models_dir: PathBuf) -> Self {
        Self {
            models_dir,
            artifacts: RwLock::new(Artifacts::default()),
            ready: AtomicBool::new(false),
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load (or reload) every artifact. Serialized: concurrent callers queue
    /// behind the load lock. File reads run off the async threads.
    pub async fn load(&self) -> Result<()> {
        let _guard = self.load_lock.lock().await;

        let dir = self.models_dir.clone();
        let loaded = tokio::task::spawn_blocking(move || Artifacts {
            difficulty: load_file(&dir.join(PredictorKind::Difficulty.file_name()), PredictorKind::Difficulty)
                .map(Arc::new),
            sequence: load_file(&dir.join(PredictorKind::Sequence.file_name()), PredictorKind::Sequence)
                .map(Arc::new),
            health: load_file(&dir.join(PredictorKind::Health.file_name()), PredictorKind::Health)
                .map(Arc::new),
            explainer: load_file(&dir.join(PredictorKind::Explainer.file_name()), PredictorKind::Explainer)
                .map(Arc::new),
            scaler: load_file(&dir.join(PredictorKind::Scaler.file_name()), PredictorKind::Scaler)
                .map(Arc::new),
        })
        .await
        .context("artifact load task panicked")?;

        let count = [
            loaded.difficulty.is_some(),
            loaded.sequence.is_some(),
            loaded.health.is_some(),
            loaded.explainer.is_some(),
            loaded.scaler.is_some(),
        ]
        .iter()
        .filter(|l| **l)
        .count();

        *self.artifacts.write() = loaded;
        self.ready.store(true, Ordering::Release);

        if count == 5 {
            info!("✅ All ML artifacts loaded");
        } else {
            warn!("⚠️  {count}/5 ML artifacts loaded; consumers will use fallbacks");
        }
        Ok(())
    }

    /// True once the first load attempt completed (success or partial).
    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn is_loaded(&self, kind: PredictorKind) -> bool {
        let artifacts = self.artifacts.read();
        match kind {
            PredictorKind::Difficulty => artifacts.difficulty.is_some(),
            PredictorKind::Sequence => artifacts.sequence.is_some(),
            PredictorKind::Health => artifacts.health.is_some(),
            PredictorKind::Explainer => artifacts.explainer.is_some(),
            PredictorKind::Scaler => artifacts.scaler.is_some(),
        }
    }

    pub fn difficulty(&self) -> Option<Arc<ScoreArtifact>> {
        self.artifacts.read().difficulty.clone()
    }

    pub fn sequence(&self) -> Option<Arc<SequenceArtifact>> {
        self.artifacts.read().sequence.clone()
    }

    pub fn health(&self) -> Option<Arc<ClassifierArtifact>> {
        self.artifacts.read().health.clone()
    }

    pub fn explainer(&self) -> Option<Arc<ExplainerArtifact>> {
        self.artifacts.read().explainer.clone()
    }

    pub fn scaler(&self) -> Option<Arc<ScalerArtifact>> {
        self.artifacts.read().scaler.clone()
    }

    /// Registry with nothing loaded, for fallback-path tests.
    pub fn empty() -> Arc<Self> {
        let registry = Self::new(PathBuf::from("/nonexistent"));
        registry.ready.store(true, Ordering::Release);
        Arc::new(registry)
    }

    /// Registry with caller-supplied artifacts, for model-path tests.
    #[cfg(test)]
    pub(crate) fn with_artifacts(
        difficulty: Option<ScoreArtifact>,
        sequence: Option<SequenceArtifact>,
        health: Option<ClassifierArtifact>,
        explainer: Option<ExplainerArtifact>,
        scaler: Option<ScalerArtifact>,
    ) -> Arc<Self> {
        let registry = Self::new(PathBuf::from("/nonexistent"));
        *registry.artifacts.write() = Artifacts {
            difficulty: difficulty.map(Arc::new),
            sequence: sequence.map(Arc::new),
            health: health.map(Arc::new),
            explainer: explainer.map(Arc::new),
            scaler: scaler.map(Arc::new),
        };
        registry.ready.store(true, Ordering::Release);
        Arc::new(registry)
    }
}
