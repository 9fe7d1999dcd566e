//! Engine registry - builds backends by type and selects the first one that
//! can handle a source

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

use super::backends::{CommandGraphConfig, CommandGraphEngine, PcmToolkit};
use super::engine::{
    EngineAttempt, EngineCapabilities, EngineType, OutputFormat, ProgressSink,
    ReconstructionEngine, ReconstructionError,
};
use super::media::MediaSource;
use crate::config::EditorConfig;

/// Builds a fresh, uninitialized engine
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn ReconstructionEngine> + Send + Sync>;

pub struct EngineRegistry {
    factories: HashMap<EngineType, EngineFactory>,
}

impl EngineRegistry {
    /// Registry with no backends
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in backends
    pub fn new() -> Self {
        Self::with_config(&EditorConfig::default())
    }

    pub fn with_config(config: &EditorConfig) -> Self {
        let mut registry = Self::empty();

        let min_clip_duration = config.min_clip_duration;
        registry.register(
            EngineType::Split,
            Arc::new(move || {
                Box::new(PcmToolkit::engine().with_min_clip_duration(min_clip_duration))
                    as Box<dyn ReconstructionEngine>
            }),
        );

        let graph_config = CommandGraphConfig {
            ffmpeg_path: config.ffmpeg_path.clone(),
            work_root: Some(config.work_dir.clone()),
            extra_args: Vec::new(),
        };
        registry.register(
            EngineType::CommandGraph,
            Arc::new(move || {
                Box::new(CommandGraphEngine::new(graph_config.clone())) as Box<dyn ReconstructionEngine>
            }),
        );

        registry
    }

    /// Add or replace a backend
    pub fn register(&mut self, engine_type: EngineType, factory: EngineFactory) {
        debug!("Registering reconstruction engine: {}", engine_type);
        self.factories.insert(engine_type, factory);
    }

    pub fn is_registered(&self, engine_type: &EngineType) -> bool {
        self.factories.contains_key(engine_type)
    }

    /// Registered types, built-ins first
    pub fn supported_engines(&self) -> Vec<EngineType> {
        let mut types: Vec<EngineType> = self.factories.keys().cloned().collect();
        types.sort_by_key(|t| match t {
            EngineType::Split => (0, String::new()),
            EngineType::CommandGraph => (1, String::new()),
            EngineType::Custom(name) => (2, name.clone()),
        });
        types
    }

    pub fn create(&self, engine_type: &EngineType) -> Result<Box<dyn ReconstructionEngine>, ReconstructionError> {
        self.factories
            .get(engine_type)
            .map(|factory| factory())
            .ok_or_else(|| ReconstructionError::UnknownEngine(engine_type.to_string()))
    }

    /// Probe every registered backend
    pub async fn check_all(&self) -> Vec<(EngineType, EngineCapabilities)> {
        let mut results = Vec::new();
        for engine_type in self.supported_engines() {
            if let Ok(engine) = self.create(&engine_type) {
                let capabilities = engine.check_capabilities().await;
                results.push((engine_type, capabilities));
            }
        }
        results
    }

    /// Return the first backend in `order` that is supported and initializes
    /// against `source`.
    ///
    /// A backend whose capability check fails is never initialized. A backend
    /// that fails to initialize is cleaned up before moving on.
    pub async fn select(
        &self,
        order: &[EngineType],
        source: &MediaSource,
        progress: Option<ProgressSink>,
    ) -> Result<Box<dyn ReconstructionEngine>, ReconstructionError> {
        self.select_for_format(order, source, progress, None).await
    }

    /// `select`, additionally skipping backends that cannot write `format`
    pub async fn select_for_format(
        &self,
        order: &[EngineType],
        source: &MediaSource,
        progress: Option<ProgressSink>,
        format: Option<OutputFormat>,
    ) -> Result<Box<dyn ReconstructionEngine>, ReconstructionError> {
        let mut attempts = Vec::new();

        for engine_type in order {
            let mut engine = match self.create(engine_type) {
                Ok(engine) => engine,
                Err(e) => {
                    attempts.push(EngineAttempt {
                        engine: engine_type.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let capabilities = engine.check_capabilities().await;
            if !capabilities.supported {
                let reason = capabilities
                    .reason
                    .unwrap_or_else(|| "not supported".to_string());
                debug!("Skipping {}: {}", engine.name(), reason);
                attempts.push(EngineAttempt {
                    engine: engine_type.clone(),
                    reason,
                });
                continue;
            }
            if let Some(format) = format.filter(|f| !capabilities.supports_format(*f)) {
                debug!("Skipping {}: cannot write {}", engine.name(), format.extension());
                attempts.push(EngineAttempt {
                    engine: engine_type.clone(),
                    reason: format!("cannot write {}", format.extension()),
                });
                continue;
            }

            match engine.initialize(source, progress.clone()).await {
                Ok(()) => {
                    info!("Selected reconstruction engine {} for {}", engine.name(), source.name);
                    return Ok(engine);
                }
                Err(e) => {
                    warn!("Engine {} failed to initialize: {}", engine.name(), e);
                    attempts.push(EngineAttempt {
                        engine: engine_type.clone(),
                        reason: e.to_string(),
                    });
                    engine.cleanup().await;
                }
            }
        }

        warn!("No reconstruction engine available for {}", source.name);
        Err(ReconstructionError::NoEngineAvailable(attempts))
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::reconstruction::engine::{EngineState, ProcessingOptions};
    use crate::timeline::segments::VideoSegment;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scriptable engine counting lifecycle calls
    pub(crate) struct FakeEngine {
        pub name: &'static str,
        pub supported: bool,
        pub init_ok: bool,
        pub initialized: Arc<AtomicUsize>,
        pub cleaned: Arc<AtomicUsize>,
        pub formats: Vec<String>,
        pub state: EngineState,
    }

    impl FakeEngine {
        pub fn new(name: &'static str, supported: bool, init_ok: bool) -> Self {
            Self {
                name,
                supported,
                init_ok,
                initialized: Arc::new(AtomicUsize::new(0)),
                cleaned: Arc::new(AtomicUsize::new(0)),
                formats: Vec::new(),
                state: EngineState::Uninitialized,
            }
        }
    }

    #[async_trait]
    impl ReconstructionEngine for FakeEngine {
        fn name(&self) -> &'static str {
            self.name
        }

        fn engine_type(&self) -> EngineType {
            EngineType::Custom(self.name.to_string())
        }

        fn state(&self) -> EngineState {
            self.state
        }

        async fn check_capabilities(&self) -> EngineCapabilities {
            if self.supported {
                EngineCapabilities {
                    supported: true,
                    formats: self.formats.clone(),
                    ..Default::default()
                }
            } else {
                EngineCapabilities::unsupported(format!("{} is unavailable", self.name))
            }
        }

        async fn initialize(
            &mut self,
            _source: &MediaSource,
            _progress: Option<ProgressSink>,
        ) -> Result<(), ReconstructionError> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            if self.init_ok {
                self.state = EngineState::Ready;
                Ok(())
            } else {
                self.state = EngineState::Failed;
                Err(ReconstructionError::InitializationFailed(format!("{} blew up", self.name)))
            }
        }

        async fn process(
            &mut self,
            segments: &[VideoSegment],
            _options: &ProcessingOptions,
        ) -> Result<Bytes, ReconstructionError> {
            crate::reconstruction::engine::ensure_ready(self.state)?;
            let kept = crate::reconstruction::engine::kept_only(segments)?;
            Ok(Bytes::from(format!("{}:{}", self.name, kept.len())))
        }

        async fn cleanup(&mut self) {
            self.cleaned.fetch_add(1, Ordering::SeqCst);
            self.state = EngineState::Uninitialized;
        }
    }

    pub(crate) fn source() -> MediaSource {
        MediaSource {
            path: "talk.wav".into(),
            name: "talk.wav".to_string(),
            duration: 6.0,
            width: None,
            height: None,
            size: 0,
        }
    }

    /// Registers a fake under `Custom(name)`, returning its initialize counter
    pub(crate) fn register_fake(
        registry: &mut EngineRegistry,
        name: &'static str,
        supported: bool,
        init_ok: bool,
    ) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let initialized = Arc::new(AtomicUsize::new(0));
        let cleaned = Arc::new(AtomicUsize::new(0));
        let (i, c) = (initialized.clone(), cleaned.clone());
        registry.register(
            EngineType::Custom(name.to_string()),
            Arc::new(move || {
                let mut engine = FakeEngine::new(name, supported, init_ok);
                engine.initialized = i.clone();
                engine.cleaned = c.clone();
                Box::new(engine) as Box<dyn ReconstructionEngine>
            }),
        );
        (initialized, cleaned)
    }

    /// Registers a supported fake limited to `formats`, returning its cleanup counter
    pub(crate) fn register_fake_writing(
        registry: &mut EngineRegistry,
        name: &'static str,
        formats: &'static [&'static str],
    ) -> Arc<AtomicUsize> {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let c = cleaned.clone();
        registry.register(
            EngineType::Custom(name.to_string()),
            Arc::new(move || {
                let mut engine = FakeEngine::new(name, true, true);
                engine.formats = formats.iter().map(|f| f.to_string()).collect();
                engine.cleaned = c.clone();
                Box::new(engine) as Box<dyn ReconstructionEngine>
            }),
        );
        cleaned
    }

    fn custom(name: &str) -> EngineType {
        EngineType::Custom(name.to_string())
    }

    #[tokio::test]
    async fn test_selects_first_working_engine() {
        let mut registry = EngineRegistry::empty();
        let (a_init, _) = register_fake(&mut registry, "a", false, true);
        let (b_init, b_clean) = register_fake(&mut registry, "b", true, false);
        let (c_init, _) = register_fake(&mut registry, "c", true, true);

        let engine = registry
            .select(&[custom("a"), custom("b"), custom("c")], &source(), None)
            .await
            .unwrap();

        assert_eq!(engine.name(), "c");
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(a_init.load(Ordering::SeqCst), 0);
        assert_eq!(b_init.load(Ordering::SeqCst), 1);
        assert_eq!(b_clean.load(Ordering::SeqCst), 1);
        assert_eq!(c_init.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_unsupported_aggregates_reasons() {
        let mut registry = EngineRegistry::empty();
        let (a_init, _) = register_fake(&mut registry, "a", false, true);
        let (b_init, _) = register_fake(&mut registry, "b", false, true);

        let err = registry
            .select(&[custom("a"), custom("b"), custom("ghost")], &source(), None)
            .await
            .err()
            .unwrap();

        match &err {
            ReconstructionError::NoEngineAvailable(attempts) => {
                let engines: Vec<EngineType> = attempts.iter().map(|a| a.engine.clone()).collect();
                assert_eq!(engines, vec![custom("a"), custom("b"), custom("ghost")]);
                assert_eq!(attempts[0].reason, "a is unavailable");
            }
            other => panic!("unexpected error: {}", other),
        }
        let message = err.to_string();
        assert!(message.contains("a is unavailable"));
        assert!(message.contains("b is unavailable"));
        assert_eq!(a_init.load(Ordering::SeqCst), 0);
        assert_eq!(b_init.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_initialization_failures_are_preserved() {
        let mut registry = EngineRegistry::empty();
        register_fake(&mut registry, "flaky", true, false);

        let err = registry
            .select(&[custom("flaky")], &source(), None)
            .await
            .err()
            .unwrap();

        assert!(err.to_string().contains("flaky blew up"));
    }

    #[test]
    fn test_builtins_registered() {
        let registry = EngineRegistry::new();
        assert_eq!(
            registry.supported_engines(),
            vec![EngineType::Split, EngineType::CommandGraph]
        );
        assert!(matches!(
            registry.create(&custom("nope")),
            Err(ReconstructionError::UnknownEngine(_))
        ));

        let split = registry.create(&EngineType::Split).unwrap();
        assert_eq!(split.engine_type(), EngineType::Split);
        assert_eq!(split.state(), EngineState::Uninitialized);
    }

    #[tokio::test]
    async fn test_check_all_reports_every_engine() {
        let mut registry = EngineRegistry::new();
        register_fake(&mut registry, "extra", false, true);

        let results = registry.check_all().await;
        let types: Vec<EngineType> = results.iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(types, vec![EngineType::Split, EngineType::CommandGraph, custom("extra")]);

        let (_, split) = &results[0];
        assert!(split.supported);
        assert_eq!(split.formats, vec!["wav"]);
        assert!(!results[2].1.supported);
    }

    #[tokio::test]
    async fn test_select_for_format_skips_without_initializing() {
        let mut registry = EngineRegistry::empty();
        let (plain_init, _) = register_fake(&mut registry, "plain", true, true);
        registry.register(
            custom("wav-only"),
            Arc::new(|| {
                let mut engine = FakeEngine::new("wav-only", true, true);
                engine.formats = vec!["wav".to_string()];
                Box::new(engine) as Box<dyn ReconstructionEngine>
            }),
        );

        let err = registry
            .select_for_format(&[custom("wav-only")], &source(), None, Some(OutputFormat::Mp4))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("cannot write mp4"));

        let engine = registry
            .select_for_format(
                &[custom("wav-only"), custom("plain")],
                &source(),
                None,
                Some(OutputFormat::Mp4),
            )
            .await
            .unwrap();
        assert_eq!(engine.name(), "plain");
        assert_eq!(plain_init.load(Ordering::SeqCst), 1);
    }
}
