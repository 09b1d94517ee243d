// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mnemo serve` command implementation.
//!
//! Validates configuration, binds the embedding adapter, opens the
//! fragment store (refusing a dimension mismatch), loads identity stores
//! and roles, wires the orchestrator and extraction workers, and serves
//! the gateway until a shutdown signal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mnemo_chat::{ChatOrchestrator, ExtractionScheduler, OrchestratorConfig};
use mnemo_config::{diagnostic::render_errors, validate_config, MnemoConfig};
use mnemo_core::traits::EmbeddingAdapter;
use mnemo_core::types::EmbeddingKind;
use mnemo_core::MnemoError;
use mnemo_gateway::{AuthConfig, GatewayState, HealthState, ServerConfig};
use mnemo_glm::{GlmChatAdapter, GlmClient, GlmEmbedder};
use mnemo_identity::{RoleRegistry, SessionStore, UserStore};
use mnemo_memory::{HybridRetriever, MemoryExtractor, MemoryStore, RetrievalConfig, SimpleEmbedder};
use tracing::{info, warn};

/// Runs the `mnemo serve` command.
pub async fn run_serve(config: MnemoConfig) -> Result<(), MnemoError> {
    init_tracing(&config.service.log_level);

    if let Err(errors) = validate_config(&config) {
        let rendered = render_errors(&errors);
        eprintln!("error: invalid configuration:\n{rendered}");
        return Err(MnemoError::Config(format!(
            "{} configuration error(s)",
            errors.len()
        )));
    }

    info!(
        environment = %config.service.environment,
        embedding = %config.embedding.provider,
        "starting mnemo serve"
    );

    let data_dir = PathBuf::from(&config.service.data_dir);
    tokio::fs::create_dir_all(&data_dir).await.map_err(|e| {
        MnemoError::Config(format!(
            "data directory {} is not writable: {e}",
            data_dir.display()
        ))
    })?;

    // Bind the embedding adapter for the lifetime of the store.
    let embedder = build_embedder(&config, &data_dir).await?;
    info!(
        kind = %embedder.kind(),
        dimension = embedder.dimension(),
        "embedding adapter bound"
    );

    // Open the store; a dimension mismatch against existing collections is
    // a startup refusal (switch back, or start a fresh store).
    let store = Arc::new(
        MemoryStore::open(&data_dir.join("memory.db"), embedder.clone()).await?,
    );
    store.verify_dimension().await?;

    // Identity collaborators.
    let users = Arc::new(UserStore::open(data_dir.join("users")).await?);
    let sessions = Arc::new(SessionStore::open(data_dir.join("sessions")).await?);
    let roles = Arc::new(
        RoleRegistry::load(
            std::path::Path::new(&config.roles.config_dir),
            &config.roles.default_role_id,
        )
        .await?,
    );
    info!(roles = roles.role_ids().len(), "role registry loaded");

    // Reply/scoring LLM.
    let llm_key = config
        .llm
        .api_key
        .as_deref()
        .ok_or_else(|| MnemoError::Config("llm.api_key is required".to_string()))?;
    let glm = GlmClient::new(
        llm_key,
        &config.llm.base_url,
        Duration::from_secs(config.llm.timeout_secs),
    )?;
    let chat_adapter = Arc::new(GlmChatAdapter::new(glm, config.llm.model.clone()));

    // Background extraction worker pool.
    let extractor = Arc::new(MemoryExtractor::new(
        chat_adapter.clone(),
        None,
        config.memory.scoring_temperature,
    ));
    let scheduler = ExtractionScheduler::spawn(
        extractor,
        store.clone(),
        config.memory.extraction_workers,
    );
    info!(
        workers = config.memory.extraction_workers,
        threshold = config.memory.extract_threshold,
        "extraction workers started"
    );

    // Orchestrator.
    let retriever = Arc::new(HybridRetriever::new(store.clone()));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        users.clone(),
        sessions.clone(),
        roles,
        retriever,
        chat_adapter,
        scheduler,
        OrchestratorConfig {
            extract_threshold: config.memory.extract_threshold,
            max_context_memories: config.memory.max_context_memories,
            buffer_cap: config.memory.buffer_cap,
            reply_temperature: config.llm.reply_temperature,
            reply_max_tokens: config.llm.max_tokens,
            retrieval: RetrievalConfig {
                top_k: config.retrieval.top_k,
                min_importance: config.retrieval.min_importance,
                score_threshold: config.retrieval.score_threshold,
                boost_recent: config.retrieval.boost_recent,
                boost_importance: config.retrieval.boost_importance,
                diversity_penalty: config.retrieval.diversity_penalty,
            },
        },
    ));

    // Gateway.
    let state = GatewayState {
        orchestrator,
        users,
        sessions,
        store,
        auth: AuthConfig {
            api_key: config.service.api_key.clone(),
            environment: config.service.environment,
        },
        health: HealthState {
            embedding: config.embedding.provider,
            environment: config.service.environment,
            start_time: std::time::Instant::now(),
        },
    };
    let server_config = ServerConfig {
        host: config.service.host.clone(),
        port: config.service.port,
    };

    tokio::select! {
        result = mnemo_gateway::start_server(&server_config, state) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    info!("mnemo serve shutdown complete");
    Ok(())
}

/// Select and construct the configured embedding adapter.
#[cfg_attr(not(feature = "onnx"), allow(unused_variables))]
async fn build_embedder(
    config: &MnemoConfig,
    data_dir: &std::path::Path,
) -> Result<Arc<dyn EmbeddingAdapter>, MnemoError> {
    match config.embedding.provider {
        EmbeddingKind::Simple => {
            // Validation already rejected this in production.
            warn!("using the deterministic `simple` embedder; development only");
            Ok(Arc::new(SimpleEmbedder::new()))
        }
        EmbeddingKind::RemoteLlm => {
            let api_key = config
                .embedding
                .api_key
                .as_deref()
                .or(config.llm.api_key.as_deref())
                .ok_or_else(|| {
                    MnemoError::Config(
                        "embedding.provider `remote-llm` requires EMBEDDING_API_KEY or REPLY_LLM_API_KEY"
                            .to_string(),
                    )
                })?;
            let client = GlmClient::new(
                api_key,
                &config.embedding.base_url,
                Duration::from_secs(config.embedding.timeout_secs),
            )?;
            Ok(Arc::new(GlmEmbedder::new(
                client,
                config.embedding.model.clone(),
            )))
        }
        #[cfg(feature = "onnx")]
        EmbeddingKind::LocalTransformer => {
            let manager = mnemo_memory::ModelManager::new(data_dir.to_path_buf());
            let model_path = manager.ensure_model().await?;
            Ok(Arc::new(mnemo_memory::OnnxEmbedder::new(&model_path)?))
        }
        #[cfg(not(feature = "onnx"))]
        EmbeddingKind::LocalTransformer => Err(MnemoError::Config(
            "embedding.provider `local-transformer` requires the `onnx` build feature".to_string(),
        )),
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // Ignore the error if a subscriber is already installed (tests).
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
