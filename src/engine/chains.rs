//! Chain definitions and their execution history

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::registry::ScenarioRegistry;
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::models::{Chain, ChainExecution, CreateChainRequest};

#[derive(Default)]
struct ExecutionLog {
    by_id: HashMap<String, ChainExecution>,
    /// Execution ids per chain, newest first
    by_chain: HashMap<String, VecDeque<String>>,
}

pub struct ChainStore {
    registry: Arc<ScenarioRegistry>,
    clock: Arc<dyn Clock>,
    history_limit: usize,
    chains: RwLock<BTreeMap<String, Chain>>,
    executions: RwLock<ExecutionLog>,
}

impl ChainStore {
    /// Create a store holding `seed` (the predefined chains)
    pub fn new(
        registry: Arc<ScenarioRegistry>,
        clock: Arc<dyn Clock>,
        history_limit: usize,
        seed: impl IntoIterator<Item = Chain>,
    ) -> Self {
        Self {
            registry,
            clock,
            history_limit: history_limit.max(1),
            chains: RwLock::new(seed.into_iter().map(|c| (c.id.clone(), c)).collect()),
            executions: RwLock::new(ExecutionLog::default()),
        }
    }

    pub async fn create(&self, req: CreateChainRequest) -> AppResult<Chain> {
        if req.name.trim().is_empty() {
            return Err(AppError::validation("Chain name is required"));
        }
        if req.steps.is_empty() {
            return Err(AppError::validation("Chain must have at least one step"));
        }
        for (i, step) in req.steps.iter().enumerate() {
            if !self.registry.contains(&step.scenario_type) {
                return Err(AppError::Validation(format!(
                    "Step {} references unknown scenario type: {}",
                    i, step.scenario_type
                )));
            }
        }

        let steps = req
            .steps
            .into_iter()
            .map(|mut step| {
                if step.name.is_empty() {
                    step.name = step.scenario_type.clone();
                }
                step
            })
            .collect();

        let chain = Chain {
            id: Uuid::new_v4().to_string(),
            name: req.name,
            description: req.description,
            defaults: req.defaults,
            steps,
            predefined: false,
            created_at: self.clock.now(),
        };

        self.chains
            .write()
            .await
            .insert(chain.id.clone(), chain.clone());
        info!(chain_id = %chain.id, name = %chain.name, steps = chain.steps.len(), "Chain created");
        Ok(chain)
    }

    pub async fn get(&self, id: &str) -> AppResult<Chain> {
        self.chains
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Chain {} not found", id)))
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.chains.read().await.contains_key(id)
    }

    /// All chains, oldest first
    pub async fn list(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.chains.read().await.values().cloned().collect();
        chains.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        chains
    }

    pub async fn predefined(&self) -> BTreeMap<String, Chain> {
        self.chains
            .read()
            .await
            .values()
            .filter(|c| c.predefined)
            .map(|c| (c.id.clone(), c.clone()))
            .collect()
    }

    /// Remove a chain and its execution history. The caller is responsible
    /// for refusing while an execution is in flight.
    pub(crate) async fn remove(&self, id: &str) -> AppResult<Chain> {
        let chain = self
            .chains
            .write()
            .await
            .remove(id)
            .ok_or_else(|| AppError::NotFound(format!("Chain {} not found", id)))?;

        let mut log = self.executions.write().await;
        if let Some(ids) = log.by_chain.remove(id) {
            for execution_id in ids {
                log.by_id.remove(&execution_id);
            }
        }
        info!(chain_id = %id, "Chain deleted");
        Ok(chain)
    }

    pub(crate) async fn insert_execution(&self, execution: ChainExecution) {
        let mut log = self.executions.write().await;
        let ids = log.by_chain.entry(execution.chain_id.clone()).or_default();
        ids.push_front(execution.id.clone());

        let evicted: Vec<String> = if ids.len() > self.history_limit {
            ids.drain(self.history_limit..).collect()
        } else {
            Vec::new()
        };
        for id in evicted {
            log.by_id.remove(&id);
        }
        log.by_id.insert(execution.id.clone(), execution);
    }

    /// Apply `f` to a stored execution and return the updated copy
    pub(crate) async fn update_execution<F>(&self, id: &str, f: F) -> Option<ChainExecution>
    where
        F: FnOnce(&mut ChainExecution),
    {
        let mut log = self.executions.write().await;
        let execution = log.by_id.get_mut(id)?;
        f(execution);
        Some(execution.clone())
    }

    pub async fn execution(&self, id: &str) -> AppResult<ChainExecution> {
        self.executions
            .read()
            .await
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Execution {} not found", id)))
    }

    /// Recent executions of a chain, newest first
    pub async fn executions(&self, chain_id: &str, limit: usize) -> AppResult<Vec<ChainExecution>> {
        if !self.exists(chain_id).await {
            return Err(AppError::NotFound(format!("Chain {} not found", chain_id)));
        }
        let log = self.executions.read().await;
        Ok(log
            .by_chain
            .get(chain_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| log.by_id.get(id).cloned())
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default())
    }
}
